//! Market data module.
//!
//! Holds the OHLCV types, the in-memory time-series store and the data
//! provider seam the screening core fetches through.
//!
//! # Data Sources
//! - **MemoryProvider**: backed by [`TimeSeriesStore`], used by tests and demos
//! - **JsonDirProvider**: reads candle files from a local directory
//! - **CachedProvider**: TTL cache in front of any provider
//!
//! The core never talks to a provider directly; it goes through the
//! [`fetch`](fetch_daily_series) helpers, which bound every call with a
//! timeout and turn failures and empty responses into
//! [`FetchOutcome::Unavailable`].

mod cache;
mod fetch;
mod json_dir;
mod memory;
mod provider;
mod series;
mod store;

pub use cache::{CacheStats, CachedProvider, DataCache};
pub use fetch::{
    fetch_daily_series, fetch_intraday_series, fetch_net_buyers, FetchOutcome, FetchPolicy,
};
pub use json_dir::JsonDirProvider;
pub use memory::MemoryProvider;
pub use provider::{DataProvider, ProviderError, RankedCandidate};
pub use series::{Series, SeriesError};
pub use store::TimeSeriesStore;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Core Data Types
// ============================================================================

/// Timeframe for K-line data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    /// 1-minute candles
    M1,
    /// 5-minute candles
    M5,
    /// 15-minute candles
    M15,
    /// 30-minute candles
    M30,
    /// 1-hour candles
    H1,
    /// Daily candles
    Daily,
}

impl Timeframe {
    /// Whether this is an intraday timeframe
    pub fn is_intraday(&self) -> bool {
        !matches!(self, Self::Daily)
    }
}

impl FromStr for Timeframe {
    type Err = String;

    /// Parse from string (e.g., "1m", "M5", "1H", "D")
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "1M" | "M1" => Ok(Self::M1),
            "5M" | "M5" => Ok(Self::M5),
            "15M" | "M15" => Ok(Self::M15),
            "30M" | "M30" => Ok(Self::M30),
            "1H" | "H1" | "60M" => Ok(Self::H1),
            "D" | "DAILY" | "1D" => Ok(Self::Daily),
            other => Err(format!("unknown timeframe '{other}'")),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::M1 => write!(f, "1m"),
            Self::M5 => write!(f, "5m"),
            Self::M15 => write!(f, "15m"),
            Self::M30 => write!(f, "30m"),
            Self::H1 => write!(f, "1h"),
            Self::Daily => write!(f, "D"),
        }
    }
}

/// A single candlestick (OHLCV)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Symbol/ticker
    pub symbol: String,
    /// Timeframe
    pub timeframe: Timeframe,
    /// Candle open time
    pub timestamp: DateTime<Utc>,
    /// Open price
    pub open: f64,
    /// High price
    pub high: f64,
    /// Low price
    pub low: f64,
    /// Close price
    pub close: f64,
    /// Volume in shares
    pub volume: f64,
    /// Amount (turnover in currency)
    #[serde(default)]
    pub amount: f64,
}

/// Inclusive calendar date range for daily data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// The `days` calendar days ending at `end`.
    pub fn last_days(end: NaiveDate, days: u32) -> Self {
        Self {
            start: end - Duration::days(i64::from(days)),
            end,
        }
    }

    /// Whether start <= end.
    pub fn is_valid(&self) -> bool {
        self.start <= self.end
    }

    /// First instant of the range (UTC midnight of `start`).
    pub fn start_time(&self) -> DateTime<Utc> {
        self.start.and_time(NaiveTime::MIN).and_utc()
    }

    /// Last instant of the range (end of day of `end`).
    pub fn end_time(&self) -> DateTime<Utc> {
        (self.end + Duration::days(1)).and_time(NaiveTime::MIN).and_utc() - Duration::nanoseconds(1)
    }

    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        let date = timestamp.date_naive();
        date >= self.start && date <= self.end
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeframe_parse() {
        assert_eq!("1m".parse::<Timeframe>(), Ok(Timeframe::M1));
        assert_eq!("M15".parse::<Timeframe>(), Ok(Timeframe::M15));
        assert_eq!("60m".parse::<Timeframe>(), Ok(Timeframe::H1));
        assert_eq!("daily".parse::<Timeframe>(), Ok(Timeframe::Daily));
        assert!("2w".parse::<Timeframe>().is_err());
    }

    #[test]
    fn test_timeframe_display_round_trip() {
        for tf in [Timeframe::M1, Timeframe::M5, Timeframe::H1, Timeframe::Daily] {
            assert_eq!(tf.to_string().parse::<Timeframe>(), Ok(tf));
        }
        assert!(Timeframe::M30.is_intraday());
        assert!(!Timeframe::Daily.is_intraday());
    }

    #[test]
    fn test_date_range() {
        let end = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let range = DateRange::last_days(end, 730);
        assert_eq!(range.start, NaiveDate::from_ymd_opt(2022, 3, 2).unwrap());
        assert!(range.is_valid());
        assert!(range.contains(range.end_time()));
        assert!(range.contains(range.start_time()));
        assert!(!range.contains(range.end_time() + Duration::nanoseconds(1)));
        assert!(!DateRange::new(end, range.start).is_valid());
    }
}
