//! Data cache for market data.
//!
//! In-memory caching with TTL so repeated runs within a session do not hit
//! the data source again. [`CachedProvider`] puts a [`DataCache`] in front of
//! any [`DataProvider`].

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

use super::provider::{DataProvider, ProviderError, RankedCandidate};
use super::{Candle, Timeframe};

/// Cache entry with TTL
#[derive(Debug, Clone)]
struct CacheEntry<T> {
    data: T,
    expires_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    fn new(data: T, ttl_secs: i64) -> Self {
        Self {
            data,
            expires_at: expiry_after(Utc::now(), ttl_secs),
        }
    }

    fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

/// `now + ttl_secs`, saturating at the representable bounds.
fn expiry_after(now: DateTime<Utc>, ttl_secs: i64) -> DateTime<Utc> {
    let saturated = if ttl_secs < 0 {
        DateTime::<Utc>::MIN_UTC
    } else {
        DateTime::<Utc>::MAX_UTC
    };
    TimeDelta::try_seconds(ttl_secs)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(saturated)
}

/// Market data cache
pub struct DataCache {
    /// Candle cache: key = "symbol:timeframe:request"
    candles: RwLock<HashMap<String, CacheEntry<Vec<Candle>>>>,
    /// Net-buyer rankings by date
    rankings: RwLock<HashMap<NaiveDate, CacheEntry<Vec<RankedCandidate>>>>,
    /// TTL in seconds
    ttl: i64,
}

impl DataCache {
    /// Create a cache with a one-hour TTL
    pub fn new() -> Self {
        Self::with_ttl(3600)
    }

    /// Create with custom TTL
    pub fn with_ttl(ttl_secs: i64) -> Self {
        Self {
            candles: RwLock::new(HashMap::new()),
            rankings: RwLock::new(HashMap::new()),
            ttl: ttl_secs,
        }
    }

    fn candle_key(symbol: &str, timeframe: Timeframe, request: &str) -> String {
        format!("{symbol}:{timeframe}:{request}")
    }

    fn daily_request(start: NaiveDate, end: NaiveDate) -> String {
        format!("{start}..{end}")
    }

    fn intraday_request(lookback_days: u32) -> String {
        format!("last{lookback_days}d")
    }

    fn get(&self, key: &str) -> Option<Vec<Candle>> {
        let cache = self.candles.read().ok()?;
        cache
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.data.clone())
    }

    fn set(&self, key: String, candles: Vec<Candle>) {
        if let Ok(mut cache) = self.candles.write() {
            cache.insert(key, CacheEntry::new(candles, self.ttl));
        }
    }

    /// Cached daily candles for an exact date range
    pub fn get_daily(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Option<Vec<Candle>> {
        self.get(&Self::candle_key(symbol, Timeframe::Daily, &Self::daily_request(start, end)))
    }

    pub fn set_daily(&self, symbol: &str, start: NaiveDate, end: NaiveDate, candles: Vec<Candle>) {
        self.set(
            Self::candle_key(symbol, Timeframe::Daily, &Self::daily_request(start, end)),
            candles,
        );
    }

    /// Cached intraday candles for a timeframe and lookback
    pub fn get_intraday(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        lookback_days: u32,
    ) -> Option<Vec<Candle>> {
        self.get(&Self::candle_key(symbol, timeframe, &Self::intraday_request(lookback_days)))
    }

    pub fn set_intraday(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        lookback_days: u32,
        candles: Vec<Candle>,
    ) {
        self.set(
            Self::candle_key(symbol, timeframe, &Self::intraday_request(lookback_days)),
            candles,
        );
    }

    /// Cached net-buyer ranking
    pub fn get_ranking(&self, date: NaiveDate) -> Option<Vec<RankedCandidate>> {
        let cache = self.rankings.read().ok()?;
        cache
            .get(&date)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.data.clone())
    }

    pub fn set_ranking(&self, date: NaiveDate, ranking: Vec<RankedCandidate>) {
        if let Ok(mut cache) = self.rankings.write() {
            cache.insert(date, CacheEntry::new(ranking, self.ttl));
        }
    }

    /// Invalidate cached candles for a symbol
    pub fn invalidate(&self, symbol: &str, timeframe: Option<Timeframe>) {
        if let Ok(mut cache) = self.candles.write() {
            let prefix = match timeframe {
                Some(tf) => format!("{symbol}:{tf}:"),
                None => format!("{symbol}:"),
            };
            cache.retain(|k, _| !k.starts_with(&prefix));
        }
    }

    /// Clear all expired entries
    pub fn clear_expired(&self) {
        if let Ok(mut cache) = self.candles.write() {
            cache.retain(|_, entry| !entry.is_expired());
        }
        if let Ok(mut cache) = self.rankings.write() {
            cache.retain(|_, entry| !entry.is_expired());
        }
    }

    /// Clear all cache
    pub fn clear_all(&self) {
        if let Ok(mut cache) = self.candles.write() {
            cache.clear();
        }
        if let Ok(mut cache) = self.rankings.write() {
            cache.clear();
        }
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let (mut total, mut expired) = self
            .candles
            .read()
            .map(|c| (c.len(), c.values().filter(|e| e.is_expired()).count()))
            .unwrap_or((0, 0));

        if let Ok(r) = self.rankings.read() {
            total += r.len();
            expired += r.values().filter(|e| e.is_expired()).count();
        }

        CacheStats {
            total_entries: total,
            expired_entries: expired,
            active_entries: total - expired,
        }
    }
}

impl Default for DataCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub total_entries: usize,
    pub expired_entries: usize,
    pub active_entries: usize,
}

// ============================================================================
// Cached Provider
// ============================================================================

/// A provider wrapped with a [`DataCache`].
///
/// Only non-empty successful responses are cached; errors always go back to
/// the inner provider on the next call.
pub struct CachedProvider<P> {
    inner: P,
    cache: DataCache,
}

impl<P: DataProvider> CachedProvider<P> {
    pub fn new(inner: P, ttl_secs: i64) -> Self {
        Self {
            inner,
            cache: DataCache::with_ttl(ttl_secs),
        }
    }

    pub fn cache(&self) -> &DataCache {
        &self.cache
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

#[async_trait]
impl<P: DataProvider> DataProvider for CachedProvider<P> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn get_daily_candles(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Candle>, ProviderError> {
        if let Some(candles) = self.cache.get_daily(symbol, start, end) {
            debug!(symbol, "Daily candles served from cache");
            return Ok(candles);
        }

        let candles = self.inner.get_daily_candles(symbol, start, end).await?;
        if !candles.is_empty() {
            self.cache.set_daily(symbol, start, end, candles.clone());
        }
        Ok(candles)
    }

    async fn get_intraday_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        lookback_days: u32,
    ) -> Result<Vec<Candle>, ProviderError> {
        if let Some(candles) = self.cache.get_intraday(symbol, timeframe, lookback_days) {
            debug!(symbol, timeframe = %timeframe, "Intraday candles served from cache");
            return Ok(candles);
        }

        let candles = self
            .inner
            .get_intraday_candles(symbol, timeframe, lookback_days)
            .await?;
        if !candles.is_empty() {
            self.cache
                .set_intraday(symbol, timeframe, lookback_days, candles.clone());
        }
        Ok(candles)
    }

    async fn get_top_net_buyers(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<RankedCandidate>, ProviderError> {
        if let Some(ranking) = self.cache.get_ranking(date) {
            return Ok(ranking);
        }

        let ranking = self.inner.get_top_net_buyers(date).await?;
        if !ranking.is_empty() {
            self.cache.set_ranking(date, ranking.clone());
        }
        Ok(ranking)
    }
}

// ============================================================================
// Tests
// ============================================================================
