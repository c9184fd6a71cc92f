//! Integration tests for the daily screening run.
//!
//! Covers partial failures, timeouts, retries, ordering under concurrency,
//! cancellation and the conjunctive moving-average rule end to end.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate, TimeZone, Utc};

use stockscreen::data::{
    CachedProvider, Candle, DataProvider, DateRange, FetchPolicy, ProviderError, Timeframe,
};
use stockscreen::indicators::MaWindow;
use stockscreen::screener::{
    CancelHandle, Criterion, ScreenCriteria, ScreenerEngine, SkipReason,
};

// ============================================================================
// Fixtures
// ============================================================================

fn daily(symbol: &str, days: usize, close: impl Fn(usize) -> f64) -> Vec<Candle> {
    let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    (0..days)
        .map(|i| Candle {
            symbol: symbol.to_string(),
            timeframe: Timeframe::Daily,
            timestamp: base + ChronoDuration::days(i as i64),
            open: close(i),
            high: close(i),
            low: close(i),
            close: close(i),
            volume: 3_000_000.0,
            amount: 0.0,
        })
        .collect()
}

/// 130 sessions climbing from 50 to 114.5; passes the default criteria.
fn strong(symbol: &str) -> Vec<Candle> {
    daily(symbol, 130, |i| 50.0 + i as f64 * 0.5)
}

fn range() -> DateRange {
    DateRange::new(
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
    )
}

fn universe(symbols: &[&str]) -> Vec<String> {
    symbols.iter().map(|s| s.to_string()).collect()
}

fn fast_policy() -> FetchPolicy {
    FetchPolicy {
        timeout: Duration::from_millis(200),
        max_retries: 1,
        retry_backoff: Duration::from_millis(1),
    }
}

// ============================================================================
// Mock Providers
// ============================================================================

/// Serves fixed candles with optional per-symbol failures and delays.
#[derive(Default)]
struct MockProvider {
    candles: HashMap<String, Vec<Candle>>,
    failing: HashSet<String>,
    delays: HashMap<String, Duration>,
    calls: AtomicU32,
    cancel_on_first_call: Mutex<Option<CancelHandle>>,
}

impl MockProvider {
    fn with(mut self, symbol: &str, candles: Vec<Candle>) -> Self {
        self.candles.insert(symbol.to_string(), candles);
        self
    }

    fn failing(mut self, symbol: &str) -> Self {
        self.failing.insert(symbol.to_string());
        self
    }

    fn delayed(mut self, symbol: &str, delay: Duration) -> Self {
        self.delays.insert(symbol.to_string(), delay);
        self
    }

    fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn get_daily_candles(
        &self,
        symbol: &str,
        _start: NaiveDate,
        _end: NaiveDate,
    ) -> Result<Vec<Candle>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = self.cancel_on_first_call.lock().unwrap().take() {
            handle.cancel();
        }
        if let Some(delay) = self.delays.get(symbol) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing.contains(symbol) {
            return Err(ProviderError::DataNotAvailable(format!("{symbol} delisted")));
        }
        self.candles
            .get(symbol)
            .cloned()
            .ok_or_else(|| ProviderError::DataNotAvailable(symbol.to_string()))
    }

    async fn get_intraday_candles(
        &self,
        _symbol: &str,
        _timeframe: Timeframe,
        _lookback_days: u32,
    ) -> Result<Vec<Candle>, ProviderError> {
        Err(ProviderError::DataNotAvailable("daily only".into()))
    }
}

/// Fails with a network error a set number of times, then serves a strong series.
struct FlakeyProvider {
    failures_remaining: AtomicU32,
    total_calls: AtomicU32,
}

impl FlakeyProvider {
    fn new(initial_failures: u32) -> Self {
        Self {
            failures_remaining: AtomicU32::new(initial_failures),
            total_calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl DataProvider for FlakeyProvider {
    fn name(&self) -> &'static str {
        "flakey"
    }

    async fn get_daily_candles(
        &self,
        symbol: &str,
        _start: NaiveDate,
        _end: NaiveDate,
    ) -> Result<Vec<Candle>, ProviderError> {
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.fetch_sub(1, Ordering::SeqCst);
            return Err(ProviderError::Network("connection reset".into()));
        }
        Ok(strong(symbol))
    }

    async fn get_intraday_candles(
        &self,
        _symbol: &str,
        _timeframe: Timeframe,
        _lookback_days: u32,
    ) -> Result<Vec<Candle>, ProviderError> {
        Err(ProviderError::DataNotAvailable("daily only".into()))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_one_failed_fetch_does_not_abort_run() {
    let provider = MockProvider::default()
        .with("2330.TW", strong("2330.TW"))
        .with("2454.TW", strong("2454.TW"))
        .with("2303.TW", strong("2303.TW"))
        .failing("2454.TW");
    let engine = ScreenerEngine::new(Arc::new(provider)).with_policy(fast_policy());

    let rows = engine
        .screen(
            &universe(&["2330.TW", "2454.TW", "2303.TW"]),
            range(),
            &ScreenCriteria::default(),
        )
        .await
        .unwrap();

    let symbols: Vec<&str> = rows.iter().map(|r| r.symbol.as_str()).collect();
    assert_eq!(symbols, vec!["2330.TW", "2303.TW"]);
}

#[tokio::test]
async fn test_results_keep_input_order_under_concurrency() {
    // earlier symbols finish last
    let provider = MockProvider::default()
        .with("A.TW", strong("A.TW"))
        .with("B.TW", strong("B.TW"))
        .with("C.TW", strong("C.TW"))
        .delayed("A.TW", Duration::from_millis(60))
        .delayed("B.TW", Duration::from_millis(30));
    let engine = ScreenerEngine::new(Arc::new(provider))
        .with_policy(fast_policy())
        .with_concurrency(3);

    let report = engine
        .run(&universe(&["A.TW", "B.TW", "C.TW"]), range(), &ScreenCriteria::default())
        .await
        .unwrap();

    assert_eq!(report.symbols(), vec!["A.TW", "B.TW", "C.TW"]);
}

#[tokio::test]
async fn test_hanging_fetch_times_out_and_is_skipped() {
    let provider = MockProvider::default()
        .with("SLOW.TW", strong("SLOW.TW"))
        .with("FAST.TW", strong("FAST.TW"))
        .delayed("SLOW.TW", Duration::from_secs(30));
    let policy = FetchPolicy::with_timeout(Duration::from_millis(50));
    let engine = ScreenerEngine::new(Arc::new(provider)).with_policy(policy);

    let started = std::time::Instant::now();
    let report = engine
        .run(&universe(&["SLOW.TW", "FAST.TW"]), range(), &ScreenCriteria::default())
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(report.symbols(), vec!["FAST.TW"]);
    assert_eq!(report.skipped[0].symbol, "SLOW.TW");
    match &report.skipped[0].reason {
        SkipReason::DataUnavailable { reason } => assert!(reason.contains("Timed out")),
        other => panic!("expected timeout skip, got {other:?}"),
    }
}

#[tokio::test]
async fn test_flakey_provider_recovers_with_retry() {
    let provider = Arc::new(FlakeyProvider::new(1));
    let engine = ScreenerEngine::new(Arc::clone(&provider)).with_policy(fast_policy());

    let report = engine
        .run(&universe(&["2330.TW"]), range(), &ScreenCriteria::default())
        .await
        .unwrap();

    assert_eq!(report.symbols(), vec!["2330.TW"]);
    assert_eq!(provider.total_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_single_failing_ma_rejects_instrument() {
    // 100 sessions at 200, then 30 sessions near 100: above MA20, below MA60
    let provider = MockProvider::default().with(
        "DROP.TW",
        daily("DROP.TW", 130, |i| if i < 100 { 200.0 } else { 100.0 + (i - 100) as f64 * 0.1 }),
    );
    let engine = ScreenerEngine::new(Arc::new(provider)).with_policy(fast_policy());
    let criteria = ScreenCriteria {
        price_change_threshold: -100.0,
        ..ScreenCriteria::default()
    };

    let report = engine
        .run(&universe(&["DROP.TW"]), range(), &criteria)
        .await
        .unwrap();

    assert!(report.results.is_empty());
    assert_eq!(report.rejected_by(Criterion::AboveMa(MaWindow::Ma60)), 1);
    assert_eq!(report.rejected_by(Criterion::AboveMa(MaWindow::Ma20)), 0);
}

#[tokio::test]
async fn test_short_series_skipped_for_ma120() {
    let provider = MockProvider::default().with("NEW.TW", strong("NEW.TW")[..100].to_vec());
    let engine = ScreenerEngine::new(Arc::new(provider)).with_policy(fast_policy());
    let criteria = ScreenCriteria {
        ma_requirements: MaWindow::ALL.into_iter().collect(),
        ..ScreenCriteria::default()
    };

    let report = engine
        .run(&universe(&["NEW.TW"]), range(), &criteria)
        .await
        .unwrap();

    assert_eq!(
        report.skipped[0].reason,
        SkipReason::InsufficientHistory {
            required: 120,
            actual: 100
        }
    );
    assert!(report.rejections.is_empty());
}

#[tokio::test]
async fn test_cancel_stops_remaining_instruments() {
    let provider = Arc::new(
        MockProvider::default()
            .with("A.TW", strong("A.TW"))
            .with("B.TW", strong("B.TW"))
            .with("C.TW", strong("C.TW")),
    );
    let engine = ScreenerEngine::new(Arc::clone(&provider))
        .with_policy(fast_policy())
        .with_concurrency(1);
    *provider.cancel_on_first_call.lock().unwrap() = Some(engine.cancel_handle());

    let report = engine
        .run(&universe(&["A.TW", "B.TW", "C.TW"]), range(), &ScreenCriteria::default())
        .await
        .unwrap();

    assert_eq!(report.symbols(), vec!["A.TW"]);
    assert_eq!(provider.call_count(), 1);
    assert!(report
        .skipped
        .iter()
        .all(|s| s.reason == SkipReason::Cancelled));
    assert_eq!(report.skipped.len(), 2);
}

#[tokio::test]
async fn test_next_run_after_cancel_starts_fresh() {
    let provider = Arc::new(
        MockProvider::default()
            .with("A.TW", strong("A.TW"))
            .with("B.TW", strong("B.TW"))
            .with("C.TW", strong("C.TW")),
    );
    let engine = ScreenerEngine::new(Arc::clone(&provider))
        .with_policy(fast_policy())
        .with_concurrency(1);
    *provider.cancel_on_first_call.lock().unwrap() = Some(engine.cancel_handle());
    let symbols = universe(&["A.TW", "B.TW", "C.TW"]);

    let cancelled = engine.run(&symbols, range(), &ScreenCriteria::default()).await.unwrap();
    assert_eq!(cancelled.skipped.len(), 2);
    assert!(engine.cancel_handle().is_cancelled());

    let report = engine.run(&symbols, range(), &ScreenCriteria::default()).await.unwrap();
    assert_eq!(report.symbols(), vec!["A.TW", "B.TW", "C.TW"]);
    assert!(report.skipped.is_empty());
    assert_eq!(provider.call_count(), 4);
}

#[tokio::test]
async fn test_cached_provider_reuses_series_across_runs() {
    let inner = MockProvider::default()
        .with("2330.TW", strong("2330.TW"))
        .with("2454.TW", strong("2454.TW"));
    let provider = Arc::new(CachedProvider::new(inner, 600));
    let engine = ScreenerEngine::new(Arc::clone(&provider)).with_policy(fast_policy());
    let symbols = universe(&["2330.TW", "2454.TW"]);

    let first = engine.screen(&symbols, range(), &ScreenCriteria::default()).await.unwrap();
    let second = engine.screen(&symbols, range(), &ScreenCriteria::default()).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(provider.inner().call_count(), 2);
    assert_eq!(provider.cache().stats().active_entries, 2);
}
