//! Configuration management for the screener.
//!
//! The screener reads a single configuration file at `~/.stockscreen/config.json`.
//! Every field has a default, so a missing file is equivalent to `{}`.
//!
//! # Configuration Priority
//!
//! 1. Environment variables (STOCKSCREEN_* prefix)
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `STOCKSCREEN_LOG_LEVEL` → observability.log_level
//! - `STOCKSCREEN_LOG_FORMAT` → observability.log_format
//! - `STOCKSCREEN_DATA_DIR` → data.data_dir
//! - `STOCKSCREEN_UNIVERSE` → screener.universe (comma or newline separated)

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::util::{expand_home, split_symbols};

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".stockscreen"),
        |dirs| dirs.home_dir().join(".stockscreen"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Market data source configuration
    #[serde(default)]
    pub data: DataConfig,

    /// Daily screening configuration
    #[serde(default)]
    pub screener: ScreenerConfig,

    /// Intraday trend scan configuration
    #[serde(default)]
    pub trend: TrendScanConfig,
}

/// Where a loaded configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    Defaults,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<(Self, ConfigSource)> {
        Self::load_or_default(&config_path())
    }

    /// Load `path` if it exists, defaults otherwise.
    ///
    /// Runs before logging is initialized, so the source is returned for the
    /// caller to report.
    pub fn load_or_default(path: &Path) -> Result<(Self, ConfigSource)> {
        if !path.exists() {
            return Ok((Self::default(), ConfigSource::Defaults));
        }
        let config = Self::load_from(path)?;
        Ok((config, ConfigSource::File(path.to_path_buf())))
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides.
    pub fn load_with_env() -> Result<(Self, ConfigSource)> {
        let (mut config, source) = Self::load()?;
        config.apply_env_overrides();
        Ok((config, source))
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup (environment in production).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("STOCKSCREEN_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(format) = lookup("STOCKSCREEN_LOG_FORMAT") {
            self.observability.log_format = format;
        }
        if let Some(dir) = lookup("STOCKSCREEN_DATA_DIR") {
            self.data.data_dir = dir;
        }
        if let Some(universe) = lookup("STOCKSCREEN_UNIVERSE") {
            let symbols = split_symbols(&universe);
            if !symbols.is_empty() {
                self.screener.universe = symbols;
            }
        }
    }
}

// ============================================================================
// Observability
// ============================================================================

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,

    /// Additional module targets to hold at `warn`.
    #[serde(default)]
    pub excluded_targets: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            excluded_targets: Vec::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

// ============================================================================
// Data Source
// ============================================================================

/// Market data source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Directory holding local market data files
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Time-to-live of cached series (seconds, 0 disables caching)
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Per-request timeout (seconds)
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Retries for recoverable fetch errors
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Instruments evaluated concurrently
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl DataConfig {
    /// Data directory with `~/` expanded.
    pub fn resolved_data_dir(&self) -> PathBuf {
        expand_home(&self.data_dir)
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            cache_ttl_secs: default_cache_ttl_secs(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            max_retries: default_max_retries(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_data_dir() -> String {
    "~/.stockscreen/data".to_string()
}

fn default_cache_ttl_secs() -> u64 {
    3600 // 1 hour
}

fn default_fetch_timeout_secs() -> u64 {
    15
}

fn default_max_retries() -> u32 {
    1
}

fn default_concurrency() -> usize {
    4
}

// ============================================================================
// Daily Screener
// ============================================================================

/// Daily screening configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenerConfig {
    /// Instruments to screen
    #[serde(default = "default_universe")]
    pub universe: Vec<String>,

    /// Calendar days of history to fetch, ending today
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,

    /// Screening criteria
    #[serde(default)]
    pub criteria: CriteriaConfig,
}

impl Default for ScreenerConfig {
    fn default() -> Self {
        Self {
            universe: default_universe(),
            lookback_days: default_lookback_days(),
            criteria: CriteriaConfig::default(),
        }
    }
}

fn default_universe() -> Vec<String> {
    [
        "2330.TW", "2454.TW", "2303.TW", "2317.TW", "2603.TW", "2609.TW", "2881.TW", "2882.TW",
        "2884.TW", "1101.TW",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_lookback_days() -> u32 {
    365 * 2 // enough history for MA120 and a six-month change
}

/// Screening thresholds as written in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriteriaConfig {
    /// Minimum latest close
    #[serde(default = "default_min_price")]
    pub min_price: f64,

    /// Minimum 20-period average volume, in lots
    #[serde(default = "default_min_avg_volume")]
    pub min_avg_volume: f64,

    /// Price change lookback (trading periods)
    #[serde(default = "default_price_change_window")]
    pub price_change_window: usize,

    /// Minimum price change (%)
    #[serde(default = "default_price_change_threshold")]
    pub price_change_threshold: f64,

    /// Volume change window length (trading periods)
    #[serde(default = "default_volume_change_window")]
    pub volume_change_window: usize,

    /// Minimum average volume change (%)
    #[serde(default)]
    pub volume_change_threshold: f64,

    /// Moving averages the close must sit on or above (20, 60, 120)
    #[serde(default = "default_ma_requirements")]
    pub ma_requirements: Vec<usize>,
}

impl Default for CriteriaConfig {
    fn default() -> Self {
        Self {
            min_price: default_min_price(),
            min_avg_volume: default_min_avg_volume(),
            price_change_window: default_price_change_window(),
            price_change_threshold: default_price_change_threshold(),
            volume_change_window: default_volume_change_window(),
            volume_change_threshold: 0.0,
            ma_requirements: default_ma_requirements(),
        }
    }
}

fn default_min_price() -> f64 {
    20.0
}

fn default_min_avg_volume() -> f64 {
    1000.0
}

fn default_price_change_window() -> usize {
    60 // three months
}

fn default_price_change_threshold() -> f64 {
    10.0
}

fn default_volume_change_window() -> usize {
    20 // one month
}

fn default_ma_requirements() -> Vec<usize> {
    vec![20, 60]
}

// ============================================================================
// Intraday Trend Scan
// ============================================================================

/// Intraday trend scan configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendScanConfig {
    /// Whether the trend scan runs after the daily screen
    #[serde(default)]
    pub enabled: bool,

    /// Ranking date (defaults to today)
    #[serde(default)]
    pub date: Option<NaiveDate>,

    /// Number of top net buyers to classify
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    /// Days of intraday history to fetch
    #[serde(default = "default_trend_lookback_days")]
    pub lookback_days: u32,

    /// Candle timeframe (1m, 5m, 15m, 30m, 1h)
    #[serde(default = "default_timeframe")]
    pub timeframe: String,

    /// Regression window (observations)
    #[serde(default = "default_window")]
    pub window: usize,

    /// Minimum |strength| for a directional label
    #[serde(default = "default_strength_threshold")]
    pub strength_threshold: f64,

    /// Minimum R² for a directional label
    #[serde(default = "default_r2_threshold")]
    pub r2_threshold: f64,

    /// Closes kept for sparkline previews
    #[serde(default = "default_preview_len")]
    pub preview_len: usize,
}

impl Default for TrendScanConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            date: None,
            top_n: default_top_n(),
            lookback_days: default_trend_lookback_days(),
            timeframe: default_timeframe(),
            window: default_window(),
            strength_threshold: default_strength_threshold(),
            r2_threshold: default_r2_threshold(),
            preview_len: default_preview_len(),
        }
    }
}

fn default_top_n() -> usize {
    20
}

fn default_trend_lookback_days() -> u32 {
    5
}

fn default_timeframe() -> String {
    "1m".to_string()
}

fn default_window() -> usize {
    300
}

fn default_strength_threshold() -> f64 {
    0.01
}

fn default_r2_threshold() -> f64 {
    0.3
}

fn default_preview_len() -> usize {
    50
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.observability.log_level, "info");
        assert_eq!(config.screener.universe.len(), 10);
        assert_eq!(config.screener.universe[0], "2330.TW");
        assert_eq!(config.screener.lookback_days, 730);
        assert!((config.screener.criteria.min_price - 20.0).abs() < 1e-9);
        assert_eq!(config.screener.criteria.price_change_window, 60);
        assert_eq!(config.screener.criteria.volume_change_window, 20);
        assert_eq!(config.screener.criteria.ma_requirements, vec![20, 60]);
        assert!(!config.trend.enabled);
        assert_eq!(config.trend.window, 300);
    }

    #[test]
    fn test_empty_json_uses_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.data.concurrency, 4);
        assert_eq!(config.data.cache_ttl_secs, 3600);
        assert_eq!(config.trend.preview_len, 50);
    }

    #[test]
    fn test_partial_criteria_override() {
        let json = r#"{
            "screener": {
                "universe": ["2330.TW"],
                "criteria": { "min_price": 50.0, "ma_requirements": [120] }
            },
            "observability": { "level": "debug" }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.screener.universe, vec!["2330.TW"]);
        assert!((config.screener.criteria.min_price - 50.0).abs() < 1e-9);
        assert_eq!(config.screener.criteria.ma_requirements, vec![120]);
        assert_eq!(config.screener.criteria.price_change_window, 60);
        assert_eq!(config.observability.log_level, "debug");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{ "trend": {{ "enabled": true, "date": "2024-05-02", "top_n": 5 }} }}"#
        )
        .unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert!(config.trend.enabled);
        assert_eq!(config.trend.date, NaiveDate::from_ymd_opt(2024, 5, 2));
        assert_eq!(config.trend.top_n, 5);
    }

    #[test]
    fn test_load_or_default_reports_source() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("config.json");

        let (config, source) = Config::load_or_default(&missing).unwrap();
        assert_eq!(source, ConfigSource::Defaults);
        assert_eq!(config.data.cache_ttl_secs, 3600);

        std::fs::write(&missing, r#"{"data": {"cache_ttl_secs": 5}}"#).unwrap();
        let (config, source) = Config::load_or_default(&missing).unwrap();
        assert_eq!(source, ConfigSource::File(missing.clone()));
        assert_eq!(config.data.cache_ttl_secs, 5);
    }

    #[test]
    fn test_load_from_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not json").unwrap();
        let err = Config::load_from(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }

    #[test]
    fn test_apply_overrides() {
        let vars: HashMap<&str, &str> = [
            ("STOCKSCREEN_LOG_LEVEL", "warn"),
            ("STOCKSCREEN_DATA_DIR", "/tmp/market"),
            ("STOCKSCREEN_UNIVERSE", "2603.tw,\n2609.TW"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.observability.log_level, "warn");
        assert_eq!(config.data.resolved_data_dir(), PathBuf::from("/tmp/market"));
        assert_eq!(config.screener.universe, vec!["2603.TW", "2609.TW"]);
    }

    #[test]
    fn test_blank_universe_override_ignored() {
        let mut config = Config::default();
        config.apply_overrides(|key| (key == "STOCKSCREEN_UNIVERSE").then(|| " , ".to_string()));
        assert_eq!(config.screener.universe.len(), 10);
    }
}
