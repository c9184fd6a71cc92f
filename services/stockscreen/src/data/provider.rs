//! Data provider abstraction.
//!
//! Defines the `DataProvider` trait every market data source implements.
//! Providers report failures as [`ProviderError`]; the fetch helpers decide
//! whether to retry and convert the final outcome into a skip.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{Candle, Timeframe};

// ============================================================================
// Provider Error
// ============================================================================

/// Errors specific to data providers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    /// Network error (connection failed, reset)
    #[error("Network error: {0}")]
    Network(String),

    /// Rate limit exceeded
    #[error("Rate limited{}", .retry_after_secs.map(|s| format!(", retry after {s} seconds")).unwrap_or_default())]
    RateLimited { retry_after_secs: Option<u64> },

    /// Data not available for the requested symbol/date
    #[error("Data not available: {0}")]
    DataNotAvailable(String),

    /// Provider is temporarily unavailable
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    /// Invalid request parameters
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Request exceeded its time budget
    #[error("Timed out after {secs}s")]
    Timeout { secs: u64 },

    /// Internal provider error (e.g. unreadable payload)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProviderError {
    /// Check if the error is recoverable (worth retrying)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::RateLimited { .. } | Self::Unavailable(_) | Self::Timeout { .. }
        )
    }
}

// ============================================================================
// Ranked Candidates
// ============================================================================

/// One row of the institutional net-buy ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    /// Instrument symbol (e.g., "2330.TW")
    pub symbol: String,
    /// Display name
    pub name: String,
    /// Net buy volume in lots
    pub net_volume: f64,
}

// ============================================================================
// Data Provider Trait
// ============================================================================

/// Trait for market data providers.
#[async_trait]
pub trait DataProvider: Send + Sync {
    /// Get the provider name (e.g., "memory", "json_dir")
    fn name(&self) -> &'static str;

    /// Fetch daily candles for `symbol` with dates in `[start, end]`.
    async fn get_daily_candles(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Candle>, ProviderError>;

    /// Fetch intraday candles covering the last `lookback_days` days.
    async fn get_intraday_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        lookback_days: u32,
    ) -> Result<Vec<Candle>, ProviderError>;

    /// Fetch the net-buyer ranking for a trading date, best first.
    ///
    /// Holidays and missing dates are `DataNotAvailable`.
    async fn get_top_net_buyers(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<RankedCandidate>, ProviderError> {
        Err(ProviderError::DataNotAvailable(format!(
            "{} has no net-buyer ranking for {date}",
            self.name()
        )))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    struct DailyOnly;

    #[async_trait]
    impl DataProvider for DailyOnly {
        fn name(&self) -> &'static str {
            "daily_only"
        }

        async fn get_daily_candles(
            &self,
            _symbol: &str,
            _start: NaiveDate,
            _end: NaiveDate,
        ) -> Result<Vec<Candle>, ProviderError> {
            Ok(Vec::new())
        }

        async fn get_intraday_candles(
            &self,
            _symbol: &str,
            _timeframe: Timeframe,
            _lookback_days: u32,
        ) -> Result<Vec<Candle>, ProviderError> {
            Err(ProviderError::InvalidRequest("intraday unsupported".into()))
        }
    }

    #[test]
    fn test_provider_error_recoverable() {
        assert!(ProviderError::Network("reset".into()).is_recoverable());
        assert!(ProviderError::RateLimited { retry_after_secs: Some(60) }.is_recoverable());
        assert!(ProviderError::Unavailable("maintenance".into()).is_recoverable());
        assert!(ProviderError::Timeout { secs: 5 }.is_recoverable());
        assert!(!ProviderError::DataNotAvailable("no data".into()).is_recoverable());
        assert!(!ProviderError::Internal("bad json".into()).is_recoverable());
    }

    #[test]
    fn test_provider_error_display() {
        let err = ProviderError::RateLimited {
            retry_after_secs: Some(30),
        };
        assert_eq!(err.to_string(), "Rate limited, retry after 30 seconds");
        assert_eq!(
            ProviderError::RateLimited { retry_after_secs: None }.to_string(),
            "Rate limited"
        );
        assert!(ProviderError::Timeout { secs: 3 }.to_string().contains("3s"));
    }

    #[tokio::test]
    async fn test_default_net_buyers_unavailable() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 10).unwrap();
        let err = DailyOnly.get_top_net_buyers(date).await.unwrap_err();
        assert!(matches!(err, ProviderError::DataNotAvailable(_)));
        assert!(err.to_string().contains("daily_only"));
    }
}
