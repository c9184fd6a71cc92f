//! In-memory OHLCV store keyed by instrument, timeframe and timestamp.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::series::{Series, SeriesError};
use super::{Candle, Timeframe};

type SeriesKey = (String, Timeframe);

/// In-memory time-series store.
///
/// Candles for each (symbol, timeframe) are kept in a `BTreeMap` keyed by
/// timestamp, so reads always come back in ascending order and re-inserting
/// a timestamp replaces the earlier candle.
#[derive(Debug, Default, Clone)]
pub struct TimeSeriesStore {
    series: HashMap<SeriesKey, BTreeMap<DateTime<Utc>, Candle>>,
}

impl TimeSeriesStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a single candle.
    pub fn upsert(&mut self, candle: Candle) -> Result<(), SeriesError> {
        if !candle.volume.is_finite() || candle.volume < 0.0 {
            return Err(SeriesError::InvalidVolume {
                index: 0,
                volume: candle.volume,
            });
        }

        self.series
            .entry((candle.symbol.clone(), candle.timeframe))
            .or_default()
            .insert(candle.timestamp, candle);
        Ok(())
    }

    /// Insert many candles, stopping at the first invalid one.
    ///
    /// Returns the number of candles stored.
    pub fn extend<I>(&mut self, candles: I) -> Result<usize, SeriesError>
    where
        I: IntoIterator<Item = Candle>,
    {
        let mut count = 0;
        for (index, candle) in candles.into_iter().enumerate() {
            self.upsert(candle).map_err(|e| match e {
                SeriesError::InvalidVolume { volume, .. } => {
                    SeriesError::InvalidVolume { index, volume }
                }
                other => other,
            })?;
            count += 1;
        }
        Ok(count)
    }

    /// Full series for an instrument.
    pub fn series(&self, symbol: &str, timeframe: Timeframe) -> Option<Series> {
        let candles = self.series.get(&(symbol.to_string(), timeframe))?;
        Some(Series::from_validated(
            symbol.to_string(),
            timeframe,
            candles.values().cloned().collect(),
        ))
    }

    /// Candles with timestamps in `[start, end]`.
    pub fn range(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Option<Series> {
        if start > end {
            return Some(Series::empty(symbol, timeframe));
        }
        let candles = self.series.get(&(symbol.to_string(), timeframe))?;
        Some(Series::from_validated(
            symbol.to_string(),
            timeframe,
            candles.range(start..=end).map(|(_, c)| c.clone()).collect(),
        ))
    }

    /// Latest stored timestamp for an instrument.
    pub fn last_timestamp(&self, symbol: &str, timeframe: Timeframe) -> Option<DateTime<Utc>> {
        self.series
            .get(&(symbol.to_string(), timeframe))?
            .keys()
            .next_back()
            .copied()
    }

    /// Distinct symbols, sorted.
    pub fn symbols(&self) -> Vec<String> {
        self.series
            .keys()
            .map(|(symbol, _)| symbol.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Number of (symbol, timeframe) series held.
    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Total candles across all series.
    pub fn candle_count(&self) -> usize {
        self.series.values().map(BTreeMap::len).sum()
    }

    /// Drop every timeframe of an instrument.
    pub fn remove(&mut self, symbol: &str) {
        self.series.retain(|(s, _), _| s != symbol);
    }

    pub fn clear(&mut self) {
        self.series.clear();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn candle(symbol: &str, timeframe: Timeframe, minute: i64, close: f64) -> Candle {
        Candle {
            symbol: symbol.to_string(),
            timeframe,
            timestamp: Utc.with_ymd_and_hms(2024, 6, 3, 1, 0, 0).unwrap() + Duration::minutes(minute),
            open: close,
            high: close,
            low: close,
            close,
            volume: 10.0,
            amount: 0.0,
        }
    }

    #[test]
    fn test_out_of_order_inserts_read_ascending() {
        let mut store = TimeSeriesStore::new();
        store
            .extend(vec![
                candle("2330.TW", Timeframe::M1, 2, 3.0),
                candle("2330.TW", Timeframe::M1, 0, 1.0),
                candle("2330.TW", Timeframe::M1, 1, 2.0),
            ])
            .unwrap();

        let series = store.series("2330.TW", Timeframe::M1).unwrap();
        assert_eq!(series.closes(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_upsert_replaces_same_timestamp() {
        let mut store = TimeSeriesStore::new();
        store.upsert(candle("2330.TW", Timeframe::M1, 0, 1.0)).unwrap();
        store.upsert(candle("2330.TW", Timeframe::M1, 0, 9.0)).unwrap();

        assert_eq!(store.candle_count(), 1);
        assert_eq!(store.series("2330.TW", Timeframe::M1).unwrap().closes(), vec![9.0]);
    }

    #[test]
    fn test_timeframes_kept_apart() {
        let mut store = TimeSeriesStore::new();
        store.upsert(candle("2330.TW", Timeframe::M1, 0, 1.0)).unwrap();
        store.upsert(candle("2330.TW", Timeframe::Daily, 0, 2.0)).unwrap();
        store.upsert(candle("2454.TW", Timeframe::M1, 0, 3.0)).unwrap();

        assert_eq!(store.len(), 3);
        assert_eq!(store.symbols(), vec!["2330.TW", "2454.TW"]);
        assert!(store.series("2454.TW", Timeframe::Daily).is_none());

        store.remove("2330.TW");
        assert_eq!(store.symbols(), vec!["2454.TW"]);
    }

    #[test]
    fn test_range_inclusive() {
        let mut store = TimeSeriesStore::new();
        store
            .extend((0..10).map(|m| candle("2330.TW", Timeframe::M5, m, m as f64)))
            .unwrap();

        let start = Utc.with_ymd_and_hms(2024, 6, 3, 1, 3, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 6, 3, 1, 5, 0).unwrap();
        let series = store.range("2330.TW", Timeframe::M5, start, end).unwrap();
        assert_eq!(series.closes(), vec![3.0, 4.0, 5.0]);

        assert!(store.range("2330.TW", Timeframe::M5, end, start).unwrap().is_empty());
        assert_eq!(
            store.last_timestamp("2330.TW", Timeframe::M5),
            Some(Utc.with_ymd_and_hms(2024, 6, 3, 1, 9, 0).unwrap())
        );
    }

    #[test]
    fn test_extend_reports_bad_index() {
        let mut store = TimeSeriesStore::new();
        let mut bad = candle("2330.TW", Timeframe::M1, 1, 1.0);
        bad.volume = f64::NAN;

        let err = store
            .extend(vec![candle("2330.TW", Timeframe::M1, 0, 1.0), bad])
            .unwrap_err();
        assert!(matches!(err, SeriesError::InvalidVolume { index: 1, .. }));
        assert_eq!(store.candle_count(), 1);
    }
}
