//! Stockscreen Library
//!
//! Screens a universe of equities for strong stocks and labels intraday
//! trends of the day's top institutional net buyers.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────┐   ┌─────────────────┐   ┌──────────────┐
//! │ DataProvider │──▶│ IndicatorEngine  │──▶│ ScreeningFilter │──▶│ ScreenReport │
//! │  (+ cache)   │   │ TrendClassifier  │   │                 │   │ TrendReport  │
//! └──────────────┘   └──────────────────┘   └─────────────────┘   └──────────────┘
//! ```
//!
//! # Key Concepts
//!
//! ## Undefined indicators
//! - A moving average or change statistic without enough history is `None`
//! - Every filter predicate fails on `None`
//!
//! ## Trend strength
//! - OLS slope across the window, scaled by window length over mean price
//! - Up/Down also need R² above a threshold and the last close on the
//!   matching side of the mean

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod data;
pub mod indicators;
pub mod screener;
pub mod trend;

use anyhow::{Context, Result};
use chrono::Local;
use std::sync::Arc;
use stockscreen_common::config::Config;

use crate::data::{CachedProvider, DataProvider, DateRange, FetchPolicy, JsonDirProvider, Timeframe};
use crate::screener::{ScreenCriteria, ScreenReport, ScreenerEngine, TrendScanReport, TrendScanner};
use crate::trend::{TrendClassifier, TrendConfig};

/// Wires configuration, data source and the two screening passes.
pub struct ScreenerService {
    config: Config,
    provider: Arc<dyn DataProvider>,
}

impl ScreenerService {
    /// Create a service reading from the configured data directory.
    pub fn new(config: Config) -> Self {
        let root = config.data.resolved_data_dir();
        let json = JsonDirProvider::new(root);
        let ttl = i64::try_from(config.data.cache_ttl_secs).unwrap_or(i64::MAX);

        let provider: Arc<dyn DataProvider> = if ttl > 0 {
            Arc::new(CachedProvider::new(json, ttl))
        } else {
            Arc::new(json)
        };

        Self { config, provider }
    }

    /// Create a service over an explicit provider.
    pub fn with_provider(config: Config, provider: Arc<dyn DataProvider>) -> Self {
        Self { config, provider }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn policy(&self) -> FetchPolicy {
        FetchPolicy::from_config(&self.config.data)
    }

    /// Run the daily screen over the configured universe, ending today.
    pub async fn run_screen(&self) -> Result<ScreenReport> {
        let today = Local::now().date_naive();
        let range = DateRange::last_days(today, self.config.screener.lookback_days);
        self.run_screen_over(range).await
    }

    /// Run the daily screen over an explicit date range.
    pub async fn run_screen_over(&self, range: DateRange) -> Result<ScreenReport> {
        let criteria = ScreenCriteria::from_config(&self.config.screener.criteria)
            .context("Invalid screening criteria")?;

        let engine = ScreenerEngine::new(Arc::clone(&self.provider))
            .with_policy(self.policy())
            .with_concurrency(self.config.data.concurrency);

        engine
            .run(&self.config.screener.universe, range, &criteria)
            .await
            .context("Screening run failed")
    }

    /// Run the intraday trend scan if enabled.
    pub async fn run_trend_scan(&self) -> Result<Option<TrendScanReport>> {
        let trend = &self.config.trend;
        if !trend.enabled {
            return Ok(None);
        }

        let timeframe: Timeframe = trend
            .timeframe
            .parse()
            .map_err(anyhow::Error::msg)
            .context("Invalid trend timeframe")?;
        let date = trend.date.unwrap_or_else(|| Local::now().date_naive());

        let scanner = TrendScanner::new(
            Arc::clone(&self.provider),
            TrendClassifier::new(TrendConfig::from_config(trend)),
        )
        .with_policy(self.policy())
        .with_concurrency(self.config.data.concurrency)
        .with_top_n(trend.top_n);

        Ok(Some(scanner.scan(date, trend.lookback_days, timeframe).await))
    }
}
