//! Screening criteria.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use stockscreen_common::config::CriteriaConfig;

use crate::indicators::{MaWindow, AVG_VOLUME_WINDOW};

use super::engine::ScreenError;

// ============================================================================
// Lookback Presets
// ============================================================================

/// Calendar-style lookback presets, in trading days (about 20 per month).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookbackPeriod {
    OneMonth,
    ThreeMonths,
    SixMonths,
}

impl LookbackPeriod {
    pub fn trading_days(self) -> usize {
        match self {
            Self::OneMonth => 20,
            Self::ThreeMonths => 60,
            Self::SixMonths => 120,
        }
    }
}

impl fmt::Display for LookbackPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OneMonth => write!(f, "1個月"),
            Self::ThreeMonths => write!(f, "3個月"),
            Self::SixMonths => write!(f, "6個月"),
        }
    }
}

// ============================================================================
// Screen Criteria
// ============================================================================

/// Composite rule set an instrument must satisfy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenCriteria {
    /// Minimum latest close
    pub min_price: f64,
    /// Minimum trailing 20-period average volume, in lots
    pub min_avg_volume: f64,
    /// Price change lookback, in periods
    pub price_change_window: usize,
    /// Minimum price change (%)
    pub price_change_threshold: f64,
    /// Length of each of the two compared volume windows
    pub volume_change_window: usize,
    /// Minimum average-volume change (%)
    pub volume_change_threshold: f64,
    /// Moving averages the close must be at or above
    pub ma_requirements: BTreeSet<MaWindow>,
}

impl Default for ScreenCriteria {
    fn default() -> Self {
        Self {
            min_price: 20.0,
            min_avg_volume: 1000.0,
            price_change_window: LookbackPeriod::ThreeMonths.trading_days(),
            price_change_threshold: 10.0,
            volume_change_window: LookbackPeriod::OneMonth.trading_days(),
            volume_change_threshold: 0.0,
            ma_requirements: [MaWindow::Ma20, MaWindow::Ma60].into_iter().collect(),
        }
    }
}

impl ScreenCriteria {
    /// Build and validate criteria from the config file section.
    pub fn from_config(config: &CriteriaConfig) -> Result<Self, ScreenError> {
        let ma_requirements = config
            .ma_requirements
            .iter()
            .map(|&period| MaWindow::try_from(period))
            .collect::<Result<BTreeSet<_>, _>>()
            .map_err(ScreenError::InvalidCriteria)?;

        let criteria = Self {
            min_price: config.min_price,
            min_avg_volume: config.min_avg_volume,
            price_change_window: config.price_change_window,
            price_change_threshold: config.price_change_threshold,
            volume_change_window: config.volume_change_window,
            volume_change_threshold: config.volume_change_threshold,
            ma_requirements,
        };
        criteria.validate()?;
        Ok(criteria)
    }

    /// Set the price change lookback from a preset.
    pub fn with_price_period(mut self, period: LookbackPeriod) -> Self {
        self.price_change_window = period.trading_days();
        self
    }

    /// Set the volume change window from a preset.
    pub fn with_volume_period(mut self, period: LookbackPeriod) -> Self {
        self.volume_change_window = period.trading_days();
        self
    }

    /// Reject criteria no instrument could be evaluated against.
    pub fn validate(&self) -> Result<(), ScreenError> {
        if self.price_change_window == 0 {
            return Err(ScreenError::InvalidCriteria(
                "price_change_window must be positive".into(),
            ));
        }
        if self.volume_change_window == 0 {
            return Err(ScreenError::InvalidCriteria(
                "volume_change_window must be positive".into(),
            ));
        }
        let thresholds = [
            ("min_price", self.min_price),
            ("min_avg_volume", self.min_avg_volume),
            ("price_change_threshold", self.price_change_threshold),
            ("volume_change_threshold", self.volume_change_threshold),
        ];
        for (name, value) in thresholds {
            if !value.is_finite() {
                return Err(ScreenError::InvalidCriteria(format!("{name} must be finite")));
            }
        }
        Ok(())
    }

    /// Observations an instrument needs before it is evaluated at all.
    pub fn required_history(&self) -> usize {
        let ma = self
            .ma_requirements
            .iter()
            .map(|w| w.period())
            .max()
            .unwrap_or(0);

        [
            AVG_VOLUME_WINDOW,
            self.price_change_window + 1,
            2 * self.volume_change_window + 1,
            ma,
        ]
        .into_iter()
        .max()
        .unwrap_or(AVG_VOLUME_WINDOW)
    }

    /// One-line description for reports and logs.
    pub fn summary(&self) -> String {
        let mas = if self.ma_requirements.is_empty() {
            "none".to_string()
        } else {
            self.ma_requirements
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("/")
        };
        format!(
            "close>={} avg_vol>={} lots chg({})>={}% vol_chg({})>={}% above {}",
            self.min_price,
            self.min_avg_volume,
            self.price_change_window,
            self.price_change_threshold,
            self.volume_change_window,
            self.volume_change_threshold,
            mas
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
