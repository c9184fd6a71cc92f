//! Local JSON directory provider.
//!
//! Layout under the data directory:
//!
//! ```text
//! <dir>/<symbol>.json                    daily candles
//! <dir>/intraday/<symbol>.json           intraday candles
//! <dir>/net_buyers/<YYYY-MM-DD>.json     net-buyer ranking, best first
//! ```
//!
//! Candle files hold a JSON array of records with `timestamp` (RFC 3339 or
//! `YYYY-MM-DD`), `open`, `high`, `low`, `close`, `volume` and an optional
//! `amount`.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::Deserialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::provider::{DataProvider, ProviderError, RankedCandidate};
use super::{Candle, DateRange, Timeframe};

#[derive(Debug, Deserialize)]
struct CandleRecord {
    #[serde(alias = "date")]
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
    #[serde(default)]
    amount: f64,
}

impl CandleRecord {
    fn into_candle(self, symbol: &str, timeframe: Timeframe) -> Result<Candle, ProviderError> {
        Ok(Candle {
            symbol: symbol.to_string(),
            timeframe,
            timestamp: parse_timestamp(&self.timestamp)?,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
            amount: self.amount,
        })
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ProviderError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(|d| d.and_time(NaiveTime::MIN).and_utc())
        .map_err(|e| ProviderError::Internal(format!("bad timestamp '{raw}': {e}")))
}

/// Provider reading candle and ranking files from a directory.
#[derive(Debug, Clone)]
pub struct JsonDirProvider {
    root: PathBuf,
}

impl JsonDirProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file_for(&self, subdir: Option<&str>, name: &str) -> Result<PathBuf, ProviderError> {
        if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
            return Err(ProviderError::InvalidRequest(format!("invalid name '{name}'")));
        }
        let dir = match subdir {
            Some(sub) => self.root.join(sub),
            None => self.root.clone(),
        };
        Ok(dir.join(format!("{name}.json")))
    }

    async fn read_json<T>(&self, path: &Path) -> Result<T, ProviderError>
    where
        T: serde::de::DeserializeOwned,
    {
        debug!(path = %path.display(), "Reading data file");
        let content = tokio::fs::read_to_string(path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => {
                ProviderError::DataNotAvailable(format!("{} not found", path.display()))
            }
            _ => ProviderError::Internal(format!("failed to read {}: {e}", path.display())),
        })?;

        serde_json::from_str(&content)
            .map_err(|e| ProviderError::Internal(format!("failed to parse {}: {e}", path.display())))
    }

    async fn read_candles(
        &self,
        subdir: Option<&str>,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<Vec<Candle>, ProviderError> {
        let path = self.file_for(subdir, symbol)?;
        let records: Vec<CandleRecord> = self.read_json(&path).await?;
        records
            .into_iter()
            .map(|r| r.into_candle(symbol, timeframe))
            .collect()
    }
}

#[async_trait]
impl DataProvider for JsonDirProvider {
    fn name(&self) -> &'static str {
        "json_dir"
    }

    async fn get_daily_candles(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Candle>, ProviderError> {
        let range = DateRange::new(start, end);
        let mut candles = self.read_candles(None, symbol, Timeframe::Daily).await?;
        candles.retain(|c| range.contains(c.timestamp));
        Ok(candles)
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

        let mut candles = self.read_candles(Some("intraday"), symbol, timeframe).await?;
        let Some(last) = candles.iter().map(|c| c.timestamp).max() else {
            return Ok(candles);
        };
        let start = last - Duration::days(i64::from(lookback_days));
        candles.retain(|c| c.timestamp >= start);
        Ok(candles)
    }

    async fn get_top_net_buyers(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<RankedCandidate>, ProviderError> {
        let path = self.file_for(Some("net_buyers"), &date.format("%Y-%m-%d").to_string())?;
        self.read_json(&path).await
    }
}

// ============================================================================
// Tests
// ============================================================================
