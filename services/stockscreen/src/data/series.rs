//! Validated, ordered candle series for a single instrument.

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::{Candle, Timeframe};

/// Why a batch of candles cannot form a [`Series`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SeriesError {
    #[error("candle {index} belongs to '{found}', expected '{expected}'")]
    SymbolMismatch {
        index: usize,
        expected: String,
        found: String,
    },

    #[error("timestamps not strictly increasing at index {index}")]
    NotIncreasing { index: usize },

    #[error("invalid volume {volume} at index {index}")]
    InvalidVolume { index: usize, volume: f64 },
}

/// Ordered OHLCV sequence for one instrument.
///
/// Invariants: every candle carries the series symbol, timestamps are
/// strictly increasing, volume is finite and non-negative. A `Series` is
/// never mutated after construction; derived indicators live alongside it.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    symbol: String,
    timeframe: Timeframe,
    candles: Vec<Candle>,
}

impl Series {
    /// Build a series from candles already in ascending order.
    pub fn new(
        symbol: impl Into<String>,
        timeframe: Timeframe,
        candles: Vec<Candle>,
    ) -> Result<Self, SeriesError> {
        let symbol = symbol.into();

        for (index, candle) in candles.iter().enumerate() {
            if candle.symbol != symbol {
                return Err(SeriesError::SymbolMismatch {
                    index,
                    expected: symbol,
                    found: candle.symbol.clone(),
                });
            }
            if !candle.volume.is_finite() || candle.volume < 0.0 {
                return Err(SeriesError::InvalidVolume {
                    index,
                    volume: candle.volume,
                });
            }
            if index > 0 && candle.timestamp <= candles[index - 1].timestamp {
                return Err(SeriesError::NotIncreasing { index });
            }
        }

        Ok(Self {
            symbol,
            timeframe,
            candles,
        })
    }

    /// Build a series from candles in any order.
    ///
    /// Candles are sorted by timestamp; for duplicate timestamps the one that
    /// appears last in the input wins.
    pub fn from_unordered(
        symbol: impl Into<String>,
        timeframe: Timeframe,
        mut candles: Vec<Candle>,
    ) -> Result<Self, SeriesError> {
        // stable sort keeps input order among equal timestamps
        candles.sort_by_key(|c| c.timestamp);

        let mut deduped: Vec<Candle> = Vec::with_capacity(candles.len());
        for candle in candles {
            match deduped.last_mut() {
                Some(last) if last.timestamp == candle.timestamp => *last = candle,
                _ => deduped.push(candle),
            }
        }

        Self::new(symbol, timeframe, deduped)
    }

    /// An empty series.
    pub fn empty(symbol: impl Into<String>, timeframe: Timeframe) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
            candles: Vec::new(),
        }
    }

    /// Wrap candles the caller already knows to be valid.
    pub(crate) fn from_validated(symbol: String, timeframe: Timeframe, candles: Vec<Candle>) -> Self {
        Self {
            symbol,
            timeframe,
            candles,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    /// Most recent candle.
    pub fn latest(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn first_timestamp(&self) -> Option<DateTime<Utc>> {
        self.candles.first().map(|c| c.timestamp)
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.candles.last().map(|c| c.timestamp)
    }

    /// Close prices in time order.
    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }

    /// Volumes in time order.
    pub fn volumes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.volume).collect()
    }

    /// The last `n` candles (all of them if fewer exist).
    pub fn tail(&self, n: usize) -> &[Candle] {
        let start = self.candles.len().saturating_sub(n);
        &self.candles[start..]
    }

    /// Sub-series with timestamps in `[start, end]`.
    pub fn between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Series {
        let candles = self
            .candles
            .iter()
            .filter(|c| c.timestamp >= start && c.timestamp <= end)
            .cloned()
            .collect();
        Self::from_validated(self.symbol.clone(), self.timeframe, candles)
    }
}

// ============================================================================
// Tests
// ============================================================================
