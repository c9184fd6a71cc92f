//! Regression-based trend classification.
//!
//! Fits an ordinary-least-squares line through the trailing window of closes
//! and labels the instrument by normalized slope ("strength"), goodness of
//! fit (R²) and where the last close sits relative to the window mean.

use serde::{Deserialize, Serialize};
use stockscreen_common::config::TrendScanConfig;

use crate::data::Series;
use crate::indicators::mean;

// ============================================================================
// Linear Fit
// ============================================================================

/// OLS fit of `y = slope * x + intercept` with `x` the 0-based index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    /// Coefficient of determination, in `[0, 1]`; 0 for a flat series
    pub r2: f64,
}

impl LinearFit {
    /// Fit a line through `ys`. Needs at least two points.
    pub fn fit(ys: &[f64]) -> Option<Self> {
        let n = ys.len();
        if n < 2 {
            return None;
        }

        let n_f = n as f64;
        let x_mean = (n_f - 1.0) / 2.0;
        let y_mean = mean(ys)?;

        let mut sxx = 0.0;
        let mut sxy = 0.0;
        for (i, &y) in ys.iter().enumerate() {
            let dx = i as f64 - x_mean;
            sxx += dx * dx;
            sxy += dx * (y - y_mean);
        }

        let slope = sxy / sxx;
        let intercept = y_mean - slope * x_mean;

        let mut ss_res = 0.0;
        let mut ss_tot = 0.0;
        for (i, &y) in ys.iter().enumerate() {
            let predicted = slope * i as f64 + intercept;
            ss_res += (y - predicted).powi(2);
            ss_tot += (y - y_mean).powi(2);
        }

        let r2 = if ss_tot == 0.0 {
            0.0
        } else {
            (1.0 - ss_res / ss_tot).clamp(0.0, 1.0)
        };

        Some(Self {
            slope,
            intercept,
            r2,
        })
    }

    pub fn predict(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

// ============================================================================
// Trend Direction
// ============================================================================

/// Classified direction of a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    /// Too few observations to classify
    Insufficient,
    /// No convincing trend
    Ranging,
    Up,
    Down,
}

impl std::fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Insufficient => write!(f, "資料不足"),
            Self::Ranging => write!(f, "震盪"),
            Self::Up => write!(f, "上漲"),
            Self::Down => write!(f, "下跌"),
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Trend classifier parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendConfig {
    /// Trailing observations fitted
    pub window: usize,
    /// Minimum |strength| for Up/Down
    pub strength_threshold: f64,
    /// Minimum R² for Up/Down
    pub r2_threshold: f64,
    /// Closes kept in the preview
    pub preview_len: usize,
    /// Absolute floor on observations
    pub min_observations: usize,
    /// Fraction of `window` that must be present
    pub min_fraction: f64,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            window: 300,
            strength_threshold: 0.01,
            r2_threshold: 0.3,
            preview_len: 50,
            min_observations: 60,
            min_fraction: 0.6,
        }
    }
}

impl TrendConfig {
    pub fn from_config(config: &TrendScanConfig) -> Self {
        Self {
            window: config.window,
            strength_threshold: config.strength_threshold,
            r2_threshold: config.r2_threshold,
            preview_len: config.preview_len,
            ..Self::default()
        }
    }

    /// Observations needed before a direction other than Insufficient.
    pub fn min_required(&self) -> usize {
        let fraction = (self.min_fraction * self.window as f64).ceil() as usize;
        self.min_observations.max(fraction)
    }
}

// ============================================================================
// Trend Result
// ============================================================================

/// Classification of one series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendResult {
    pub direction: TrendDirection,
    pub last_price: f64,
    pub window_mean: f64,
    pub slope: f64,
    /// Fractional change implied by the fit across the window
    pub strength: f64,
    pub r2: f64,
    /// Observations in the fitted window
    pub observations: usize,
    /// Tail of the window's closes, for sparklines
    pub preview: Vec<f64>,
}

// ============================================================================
// Classifier
// ============================================================================

/// Labels a series as Up, Down, Ranging or Insufficient.
#[derive(Debug, Clone, Default)]
pub struct TrendClassifier {
    config: TrendConfig,
}

impl TrendClassifier {
    pub fn new(config: TrendConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrendConfig {
        &self.config
    }

    pub fn classify(&self, series: &Series) -> TrendResult {
        self.classify_closes(&series.closes())
    }

    /// Classify a close sequence in time order.
    pub fn classify_closes(&self, closes: &[f64]) -> TrendResult {
        let cfg = &self.config;
        let window = &closes[closes.len().saturating_sub(cfg.window)..];
        let n = window.len();

        let preview = window[n.saturating_sub(cfg.preview_len)..].to_vec();
        let last_price = window.last().copied().unwrap_or(0.0);
        let window_mean = mean(window).unwrap_or(0.0);
        let fit = LinearFit::fit(window);
        let slope = fit.map_or(0.0, |f| f.slope);
        let r2 = fit.map_or(0.0, |f| f.r2);
        let strength = if window_mean == 0.0 {
            0.0
        } else {
            slope * n as f64 / window_mean
        };

        let direction = if n < cfg.min_required() {
            TrendDirection::Insufficient
        } else if strength >= cfg.strength_threshold
            && last_price > window_mean
            && r2 >= cfg.r2_threshold
        {
            TrendDirection::Up
        } else if strength <= -cfg.strength_threshold
            && last_price < window_mean
            && r2 >= cfg.r2_threshold
        {
            TrendDirection::Down
        } else {
            TrendDirection::Ranging
        };

        TrendResult {
            direction,
            last_price,
            window_mean,
            slope,
            strength,
            r2,
            observations: n,
            preview,
        }
    }
}

/// Classify `series` with `config`.
pub fn classify_trend(series: &Series, config: &TrendConfig) -> TrendResult {
    TrendClassifier::new(config.clone()).classify(series)
}

// ============================================================================
// Tests
// ============================================================================
