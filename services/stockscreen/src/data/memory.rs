//! In-memory data provider backed by [`TimeSeriesStore`].

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use super::provider::{DataProvider, ProviderError, RankedCandidate};
use super::series::SeriesError;
use super::store::TimeSeriesStore;
use super::{Candle, DateRange, Timeframe};

fn poisoned() -> ProviderError {
    ProviderError::Internal("lock poisoned".into())
}

/// Provider serving candles held in memory.
///
/// Intraday lookbacks are anchored at the latest stored candle, so fixtures
/// recorded on any date stay usable.
#[derive(Default)]
pub struct MemoryProvider {
    store: RwLock<TimeSeriesStore>,
    net_buyers: RwLock<HashMap<NaiveDate, Vec<RankedCandidate>>>,
    failing: RwLock<HashSet<String>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a provider from an existing store.
    pub fn from_store(store: TimeSeriesStore) -> Self {
        Self {
            store: RwLock::new(store),
            ..Self::default()
        }
    }

    /// Add candles; returns how many were stored.
    pub fn insert_candles(&self, candles: Vec<Candle>) -> Result<usize, ProviderError> {
        let mut store = self.store.write().map_err(|_| poisoned())?;
        store
            .extend(candles)
            .map_err(|e: SeriesError| ProviderError::InvalidRequest(e.to_string()))
    }

    /// Set the net-buyer ranking for a date.
    pub fn set_net_buyers(
        &self,
        date: NaiveDate,
        ranking: Vec<RankedCandidate>,
    ) -> Result<(), ProviderError> {
        self.net_buyers
            .write()
            .map_err(|_| poisoned())?
            .insert(date, ranking);
        Ok(())
    }

    /// Make every request for `symbol` fail with `Unavailable`.
    pub fn fail_symbol(&self, symbol: &str) -> Result<(), ProviderError> {
        self.failing
            .write()
            .map_err(|_| poisoned())?
            .insert(symbol.to_string());
        Ok(())
    }

    fn check_failing(&self, symbol: &str) -> Result<(), ProviderError> {
        let failing = self
            .failing
            .read()
            .map_err(|_| poisoned())?;
        if failing.contains(symbol) {
            return Err(ProviderError::Unavailable(format!("{symbol} marked as failing")));
        }
        Ok(())
    }

    fn read_store(&self) -> Result<std::sync::RwLockReadGuard<'_, TimeSeriesStore>, ProviderError> {
        self.store
            .read()
            .map_err(|_| poisoned())
    }
}

#[async_trait]
impl DataProvider for MemoryProvider {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get_daily_candles(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Candle>, ProviderError> {
        self.check_failing(symbol)?;
        let range = DateRange::new(start, end);
        let store = self.read_store()?;

        store
            .range(symbol, Timeframe::Daily, range.start_time(), range.end_time())
            .map(|series| series.candles().to_vec())
            .ok_or_else(|| ProviderError::DataNotAvailable(format!("no daily data for {symbol}")))
    }

    async fn get_intraday_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        lookback_days: u32,
    ) -> Result<Vec<Candle>, ProviderError> {
        if !timeframe.is_intraday() {
            return Err(ProviderError::InvalidRequest(format!(
                "{timeframe} is not an intraday timeframe"
            )));
        }
        self.check_failing(symbol)?;
        let store = self.read_store()?;

        let last = store.last_timestamp(symbol, timeframe).ok_or_else(|| {
            ProviderError::DataNotAvailable(format!("no {timeframe} data for {symbol}"))
        })?;
        let start = last - Duration::days(i64::from(lookback_days));

        Ok(store
            .range(symbol, timeframe, start, last)
            .map(|series| series.candles().to_vec())
            .unwrap_or_default())
    }

    async fn get_top_net_buyers(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<RankedCandidate>, ProviderError> {
        let map = self
            .net_buyers
            .read()
            .map_err(|_| poisoned())?;
        map.get(&date)
            .cloned()
            .ok_or_else(|| ProviderError::DataNotAvailable(format!("no ranking for {date}")))
    }
}

// ============================================================================
// Tests
// ============================================================================
