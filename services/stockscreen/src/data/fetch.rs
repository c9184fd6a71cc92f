//! Bounded fetch helpers.
//!
//! Every provider call made by the screening core goes through here. A call
//! is bounded by [`FetchPolicy::timeout`], recoverable errors are retried up
//! to [`FetchPolicy::max_retries`] times, and whatever is left over becomes
//! [`FetchOutcome::Unavailable`] so one bad instrument never aborts a run.

use std::future::Future;
use std::time::Duration;

use chrono::NaiveDate;
use stockscreen_common::config::DataConfig;
use tracing::{debug, warn};

use super::provider::{DataProvider, ProviderError, RankedCandidate};
use super::series::Series;
use super::{DateRange, Timeframe};

/// Timeout and retry settings for provider calls.
#[derive(Debug, Clone)]
pub struct FetchPolicy {
    /// Upper bound on a single provider call
    pub timeout: Duration,
    /// Retries after the first attempt, recoverable errors only
    pub max_retries: u32,
    /// Pause between attempts
    pub retry_backoff: Duration,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            max_retries: 1,
            retry_backoff: Duration::from_millis(200),
        }
    }
}

impl FetchPolicy {
    pub fn from_config(config: &DataConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.fetch_timeout_secs.max(1)),
            max_retries: config.max_retries,
            ..Self::default()
        }
    }

    /// Policy with a custom timeout and no backoff, handy for tests.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            max_retries: 0,
            retry_backoff: Duration::ZERO,
        }
    }
}

/// Result of fetching one instrument's series.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// A non-empty, validated series
    Available(Series),
    /// Nothing usable came back; the reason is for logs and skip records
    Unavailable(String),
}

impl FetchOutcome {
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }

    pub fn series(self) -> Option<Series> {
        match self {
            Self::Available(series) => Some(series),
            Self::Unavailable(_) => None,
        }
    }
}

/// Run `request_fn` under the policy's timeout with bounded retries.
async fn call_with_retry<T, F, Fut>(
    policy: &FetchPolicy,
    provider: &str,
    symbol: &str,
    request_fn: F,
) -> Result<T, ProviderError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempt = 0;
    loop {
        if attempt > 0 {
            debug!(provider, symbol, attempt, "Retrying request");
        }

        let result = match tokio::time::timeout(policy.timeout, request_fn()).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout {
                secs: policy.timeout.as_secs(),
            }),
        };

        match result {
            Ok(value) => return Ok(value),
            Err(e) if e.is_recoverable() && attempt < policy.max_retries => {
                let wait = match &e {
                    ProviderError::RateLimited {
                        retry_after_secs: Some(secs),
                    } => Duration::from_secs(*secs).min(policy.timeout),
                    _ => policy.retry_backoff,
                };
                debug!(provider, symbol, error = %e, wait_ms = wait.as_millis() as u64, "Recoverable error, waiting");
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

fn to_outcome(
    provider: &str,
    symbol: &str,
    timeframe: Timeframe,
    result: Result<Vec<super::Candle>, ProviderError>,
) -> FetchOutcome {
    let candles = match result {
        Ok(candles) => candles,
        Err(e) => {
            warn!(provider, symbol, timeframe = %timeframe, error = %e, "Fetch failed");
            return FetchOutcome::Unavailable(e.to_string());
        }
    };

    if candles.is_empty() {
        warn!(provider, symbol, timeframe = %timeframe, "Provider returned no candles");
        return FetchOutcome::Unavailable("no data returned".to_string());
    }

    match Series::from_unordered(symbol, timeframe, candles) {
        Ok(series) => FetchOutcome::Available(series),
        Err(e) => {
            warn!(provider, symbol, timeframe = %timeframe, error = %e, "Malformed series");
            FetchOutcome::Unavailable(format!("malformed data: {e}"))
        }
    }
}

/// Fetch daily candles for `symbol` over `range`.
pub async fn fetch_daily_series<P>(
    provider: &P,
    symbol: &str,
    range: DateRange,
    policy: &FetchPolicy,
) -> FetchOutcome
where
    P: DataProvider + ?Sized,
{
    let result = call_with_retry(policy, provider.name(), symbol, || {
        provider.get_daily_candles(symbol, range.start, range.end)
    })
    .await;

    to_outcome(provider.name(), symbol, Timeframe::Daily, result)
}

/// Fetch intraday candles for `symbol` covering the last `lookback_days` days.
pub async fn fetch_intraday_series<P>(
    provider: &P,
    symbol: &str,
    timeframe: Timeframe,
    lookback_days: u32,
    policy: &FetchPolicy,
) -> FetchOutcome
where
    P: DataProvider + ?Sized,
{
    let result = call_with_retry(policy, provider.name(), symbol, || {
        provider.get_intraday_candles(symbol, timeframe, lookback_days)
    })
    .await;

    to_outcome(provider.name(), symbol, timeframe, result)
}

/// Fetch the net-buyer ranking for `date`.
///
/// Failures yield an empty ranking.
pub async fn fetch_net_buyers<P>(
    provider: &P,
    date: NaiveDate,
    policy: &FetchPolicy,
) -> Vec<RankedCandidate>
where
    P: DataProvider + ?Sized,
{
    let label = date.to_string();
    match call_with_retry(policy, provider.name(), &label, || provider.get_top_net_buyers(date)).await
    {
        Ok(ranking) => ranking,
        Err(e) => {
            warn!(provider = provider.name(), date = %date, error = %e, "Net-buyer ranking unavailable");
            Vec::new()
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Candle;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn candle(symbol: &str, day: u32) -> Candle {
        Candle {
            symbol: symbol.to_string(),
            timeframe: Timeframe::Daily,
            timestamp: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
            open: 10.0,
            high: 10.0,
            low: 10.0,
            close: 10.0,
            volume: 100.0,
            amount: 0.0,
        }
    }

    /// Fails with `error` for the first `failures` calls, then succeeds.
    struct ScriptedProvider {
        failures: u32,
        error: ProviderError,
        calls: AtomicU32,
        delay: Duration,
    }

    impl ScriptedProvider {
        fn new(failures: u32, error: ProviderError) -> Self {
            Self {
                failures,
                error,
                calls: AtomicU32::new(0),
                delay: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl DataProvider for ScriptedProvider {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn get_daily_candles(
            &self,
            symbol: &str,
            _start: NaiveDate,
            _end: NaiveDate,
        ) -> Result<Vec<Candle>, ProviderError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if n < self.failures {
                return Err(self.error.clone());
            }
            Ok(vec![candle(symbol, 3), candle(symbol, 2)])
        }

        async fn get_intraday_candles(
            &self,
            _symbol: &str,
            _timeframe: Timeframe,
            _lookback_days: u32,
        ) -> Result<Vec<Candle>, ProviderError> {
            Ok(Vec::new())
        }
    }

    fn range() -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        )
    }

    fn fast_policy(max_retries: u32) -> FetchPolicy {
        FetchPolicy {
            timeout: Duration::from_secs(1),
            max_retries,
            retry_backoff: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn test_available_series_is_sorted() {
        let provider = ScriptedProvider::new(0, ProviderError::Internal("unused".into()));
        let outcome = fetch_daily_series(&provider, "2330.TW", range(), &fast_policy(0)).await;

        let series = outcome.series().unwrap();
        assert_eq!(series.len(), 2);
        assert!(series.candles()[0].timestamp < series.candles()[1].timestamp);
    }

    #[tokio::test]
    async fn test_recoverable_error_retried() {
        let provider = ScriptedProvider::new(1, ProviderError::Network("reset".into()));
        let outcome = fetch_daily_series(&provider, "2330.TW", range(), &fast_policy(1)).await;

        assert!(outcome.is_available());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let provider = ScriptedProvider::new(5, ProviderError::Unavailable("down".into()));
        let outcome = fetch_daily_series(&provider, "2330.TW", range(), &fast_policy(2)).await;

        assert!(matches!(outcome, FetchOutcome::Unavailable(_)));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let provider = ScriptedProvider::new(1, ProviderError::DataNotAvailable("delisted".into()));
        let outcome = fetch_daily_series(&provider, "2330.TW", range(), &fast_policy(3)).await;

        match outcome {
            FetchOutcome::Unavailable(reason) => assert!(reason.contains("delisted")),
            other => panic!("expected unavailable, got {other:?}"),
        }
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_becomes_unavailable() {
        let mut provider = ScriptedProvider::new(0, ProviderError::Internal("unused".into()));
        provider.delay = Duration::from_millis(500);

        let policy = FetchPolicy::with_timeout(Duration::from_millis(20));
        let outcome = fetch_daily_series(&provider, "2330.TW", range(), &policy).await;

        match outcome {
            FetchOutcome::Unavailable(reason) => assert!(reason.contains("Timed out")),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_intraday_is_unavailable() {
        let provider = ScriptedProvider::new(0, ProviderError::Internal("unused".into()));
        let outcome =
            fetch_intraday_series(&provider, "2330.TW", Timeframe::M1, 5, &fast_policy(0)).await;
        assert_eq!(outcome, FetchOutcome::Unavailable("no data returned".to_string()));
    }

    #[tokio::test]
    async fn test_net_buyers_default_is_empty() {
        let provider = ScriptedProvider::new(0, ProviderError::Internal("unused".into()));
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        assert!(fetch_net_buyers(&provider, date, &fast_policy(0)).await.is_empty());
    }

    #[test]
    fn test_policy_from_config() {
        let config = DataConfig {
            fetch_timeout_secs: 0,
            max_retries: 3,
            ..DataConfig::default()
        };
        let policy = FetchPolicy::from_config(&config);
        assert_eq!(policy.timeout, Duration::from_secs(1));
        assert_eq!(policy.max_retries, 3);
    }
}
