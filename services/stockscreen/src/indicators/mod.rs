//! Technical indicators over a candle series.
//!
//! Every derived value is an `Option<f64>`: `None` means the series does not
//! yet hold enough observations for that window. Callers must check for
//! `None` before comparing against a threshold; an undefined value never
//! counts as zero.

use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, Distribution};
use std::fmt;

use crate::data::Series;

/// Shares per trading lot.
pub const LOT_SIZE: f64 = 1000.0;

/// Trailing window for the average-volume floor.
pub const AVG_VOLUME_WINDOW: usize = 20;

// ============================================================================
// Moving Average Windows
// ============================================================================

/// Moving-average windows the screener knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub enum MaWindow {
    Ma20,
    Ma60,
    Ma120,
}

impl MaWindow {
    pub const ALL: [MaWindow; 3] = [MaWindow::Ma20, MaWindow::Ma60, MaWindow::Ma120];

    /// Window length in trading periods.
    pub fn period(self) -> usize {
        match self {
            Self::Ma20 => 20,
            Self::Ma60 => 60,
            Self::Ma120 => 120,
        }
    }
}

impl TryFrom<usize> for MaWindow {
    type Error = String;

    fn try_from(period: usize) -> Result<Self, Self::Error> {
        match period {
            20 => Ok(Self::Ma20),
            60 => Ok(Self::Ma60),
            120 => Ok(Self::Ma120),
            other => Err(format!("unsupported moving average window {other}")),
        }
    }
}

impl From<MaWindow> for usize {
    fn from(window: MaWindow) -> usize {
        window.period()
    }
}

impl fmt::Display for MaWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MA{}", self.period())
    }
}

// ============================================================================
// Primitive Computations
// ============================================================================

/// Arithmetic mean; `None` when empty.
pub(crate) fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Data::new(values.to_vec()).mean()
}

/// Rolling mean with the same length as `values`.
///
/// Position `i` is `Some` only when `window` observations exist at or before `i`.
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if window == 0 || values.len() < window {
        return out;
    }

    let w = window as f64;
    let mut sum: f64 = values[..window].iter().sum();
    out[window - 1] = Some(sum / w);
    for (i, (entering, leaving)) in values[window..].iter().zip(values).enumerate() {
        sum += entering - leaving;
        out[i + window] = Some(sum / w);
    }
    out
}

/// Mean of the last `window` values.
pub fn trailing_mean(values: &[f64], window: usize) -> Option<f64> {
    if window == 0 || values.len() < window {
        return None;
    }
    mean(&values[values.len() - window..])
}

/// Percent change from `reference` to `current`; 0 when `reference` is 0.
pub fn percent_change(current: f64, reference: f64) -> f64 {
    if reference == 0.0 {
        return 0.0;
    }
    (current - reference) / reference * 100.0
}

/// Close-to-close percent change over `k` periods. Needs `k + 1` closes.
pub fn price_change_pct(closes: &[f64], k: usize) -> Option<f64> {
    let n = closes.len();
    if k == 0 || n < k + 1 {
        return None;
    }
    Some(percent_change(closes[n - 1], closes[n - 1 - k]))
}

/// Mean volume of the last `k` periods against the `k` periods before them.
///
/// Needs `2k + 1` observations. A zero previous mean yields 0.
pub fn volume_change_pct(volumes: &[f64], k: usize) -> Option<f64> {
    let n = volumes.len();
    if k == 0 || n < 2 * k + 1 {
        return None;
    }
    let recent = mean(&volumes[n - k..])?;
    let previous = mean(&volumes[n - 2 * k..n - k])?;
    Some(percent_change(recent, previous))
}

/// Trailing 20-period average volume in lots.
pub fn avg_volume_lots(volumes: &[f64]) -> Option<f64> {
    trailing_mean(volumes, AVG_VOLUME_WINDOW).map(|v| v / LOT_SIZE)
}

// ============================================================================
// Annotated Series
// ============================================================================

/// Derived sequences that sit alongside a [`Series`], one entry per candle.
///
/// The raw candles are never touched; this value only holds what was
/// computed from them.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotatedSeries {
    pub symbol: String,
    pub closes: Vec<f64>,
    pub volumes: Vec<f64>,
    pub ma20: Vec<Option<f64>>,
    pub ma60: Vec<Option<f64>>,
    pub ma120: Vec<Option<f64>>,
    /// Trailing average volume, in lots
    pub avg_volume_lots: Vec<Option<f64>>,
}

impl AnnotatedSeries {
    pub fn len(&self) -> usize {
        self.closes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.closes.is_empty()
    }

    /// The full moving-average sequence for a window.
    pub fn ma(&self, window: MaWindow) -> &[Option<f64>] {
        match window {
            MaWindow::Ma20 => &self.ma20,
            MaWindow::Ma60 => &self.ma60,
            MaWindow::Ma120 => &self.ma120,
        }
    }

    fn last_of(values: &[Option<f64>]) -> Option<f64> {
        values.last().copied().flatten()
    }

    /// Indicator values at the latest candle.
    pub fn snapshot(&self, price_window: usize, volume_window: usize) -> Option<IndicatorSet> {
        let close = *self.closes.last()?;

        Some(IndicatorSet {
            close,
            ma20: Self::last_of(&self.ma20),
            ma60: Self::last_of(&self.ma60),
            ma120: Self::last_of(&self.ma120),
            avg_volume_lots: Self::last_of(&self.avg_volume_lots),
            price_change_window: price_window,
            price_change_pct: price_change_pct(&self.closes, price_window),
            volume_change_window: volume_window,
            volume_change_pct: volume_change_pct(&self.volumes, volume_window),
            observations: self.len(),
        })
    }
}

// ============================================================================
// Indicator Set
// ============================================================================

/// Indicator values at the latest candle of a series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSet {
    /// Latest close
    pub close: f64,
    pub ma20: Option<f64>,
    pub ma60: Option<f64>,
    pub ma120: Option<f64>,
    /// Trailing 20-period average volume, in lots
    pub avg_volume_lots: Option<f64>,
    /// Lookback used for `price_change_pct`
    pub price_change_window: usize,
    pub price_change_pct: Option<f64>,
    /// Window length used for `volume_change_pct`
    pub volume_change_window: usize,
    pub volume_change_pct: Option<f64>,
    /// Candles the values were computed from
    pub observations: usize,
}

impl IndicatorSet {
    pub fn ma(&self, window: MaWindow) -> Option<f64> {
        match window {
            MaWindow::Ma20 => self.ma20,
            MaWindow::Ma60 => self.ma60,
            MaWindow::Ma120 => self.ma120,
        }
    }
}

// ============================================================================
// Indicator Engine
// ============================================================================

/// Computes moving averages and windowed change statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndicatorEngine {
    price_change_window: usize,
    volume_change_window: usize,
}

impl Default for IndicatorEngine {
    fn default() -> Self {
        Self::new(60, 20)
    }
}

impl IndicatorEngine {
    pub fn new(price_change_window: usize, volume_change_window: usize) -> Self {
        Self {
            price_change_window,
            volume_change_window,
        }
    }

    pub fn price_change_window(&self) -> usize {
        self.price_change_window
    }

    pub fn volume_change_window(&self) -> usize {
        self.volume_change_window
    }

    /// Derive every indicator sequence for `series`.
    pub fn annotate(&self, series: &Series) -> AnnotatedSeries {
        let closes = series.closes();
        let volumes = series.volumes();
        let avg_volume_lots = rolling_mean(&volumes, AVG_VOLUME_WINDOW)
            .into_iter()
            .map(|v| v.map(|v| v / LOT_SIZE))
            .collect();

        AnnotatedSeries {
            symbol: series.symbol().to_string(),
            ma20: rolling_mean(&closes, MaWindow::Ma20.period()),
            ma60: rolling_mean(&closes, MaWindow::Ma60.period()),
            ma120: rolling_mean(&closes, MaWindow::Ma120.period()),
            avg_volume_lots,
            closes,
            volumes,
        }
    }

    /// Indicator values at the latest candle; `None` for an empty series.
    pub fn compute(&self, series: &Series) -> Option<IndicatorSet> {
        self.annotate(series)
            .snapshot(self.price_change_window, self.volume_change_window)
    }
}

// ============================================================================
// Tests
// ============================================================================
