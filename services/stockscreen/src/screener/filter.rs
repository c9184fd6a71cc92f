//! Ordered predicate filter over one instrument's latest indicators.
//!
//! Checks run cheapest first and stop at the first failure:
//! 1. Price floor
//! 2. Average volume floor
//! 3. Price change over the lookback
//! 4. Average volume change between adjacent windows
//! 5. Close at or above each required moving average

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::indicators::{IndicatorSet, MaWindow};

use super::criteria::ScreenCriteria;

// ============================================================================
// Criterion
// ============================================================================

/// A single screening predicate, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    MinPrice,
    MinAvgVolume,
    PriceChange,
    VolumeChange,
    AboveMa(MaWindow),
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MinPrice => write!(f, "最低股價"),
            Self::MinAvgVolume => write!(f, "最低日均成交量"),
            Self::PriceChange => write!(f, "股價漲幅"),
            Self::VolumeChange => write!(f, "成交量變化"),
            Self::AboveMa(window) => write!(f, "高於{window}"),
        }
    }
}

/// Result of filtering one instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOutcome {
    Pass,
    /// The first predicate that did not hold
    Fail(Criterion),
}

impl FilterOutcome {
    pub fn passed(&self) -> bool {
        matches!(self, Self::Pass)
    }
}

// ============================================================================
// Screening Filter
// ============================================================================

/// Applies [`ScreenCriteria`] to an [`IndicatorSet`].
#[derive(Debug, Clone)]
pub struct ScreeningFilter {
    criteria: ScreenCriteria,
}

/// `value >= threshold`, false when undefined.
fn at_least(value: Option<f64>, threshold: f64) -> bool {
    matches!(value, Some(v) if v >= threshold)
}

impl ScreeningFilter {
    pub fn new(criteria: ScreenCriteria) -> Self {
        Self { criteria }
    }

    pub fn criteria(&self) -> &ScreenCriteria {
        &self.criteria
    }

    pub fn evaluate(&self, indicators: &IndicatorSet) -> FilterOutcome {
        let c = &self.criteria;

        if !at_least(Some(indicators.close), c.min_price) {
            return FilterOutcome::Fail(Criterion::MinPrice);
        }
        if !at_least(indicators.avg_volume_lots, c.min_avg_volume) {
            return FilterOutcome::Fail(Criterion::MinAvgVolume);
        }
        if !at_least(indicators.price_change_pct, c.price_change_threshold) {
            return FilterOutcome::Fail(Criterion::PriceChange);
        }
        if !at_least(indicators.volume_change_pct, c.volume_change_threshold) {
            return FilterOutcome::Fail(Criterion::VolumeChange);
        }
        for &window in &c.ma_requirements {
            let holds = matches!(indicators.ma(window), Some(ma) if indicators.close >= ma);
            if !holds {
                return FilterOutcome::Fail(Criterion::AboveMa(window));
            }
        }

        FilterOutcome::Pass
    }
}

// ============================================================================
// Tests
// ============================================================================
