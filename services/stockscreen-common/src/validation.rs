//! Configuration validation.
//!
//! Catches bad values before a run starts, so a screening pass never aborts
//! halfway on something the config file could have told us.

use thiserror::Error;

use crate::config::{
    Config, CriteriaConfig, DataConfig, ObservabilityConfig, ScreenerConfig, TrendScanConfig,
};

/// Moving-average windows the screener knows how to compute.
pub const SUPPORTED_MA_WINDOWS: &[usize] = &[20, 60, 120];

/// Intraday timeframes accepted by the trend scan.
pub const SUPPORTED_TIMEFRAMES: &[&str] = &["1m", "5m", "15m", "30m", "1h"];

/// Longest cache TTL accepted from configuration (30 days).
pub const MAX_CACHE_TTL_SECS: u64 = 30 * 24 * 3600;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
const LOG_FORMATS: &[&str] = &["json", "pretty"];

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

impl ValidationError {
    fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

/// Fold a list of errors into a single result.
fn collect(mut errors: Vec<ValidationError>) -> ValidationResult<()> {
    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(ValidationError::Multiple(errors)),
    }
}

fn check_finite(errors: &mut Vec<ValidationError>, field: &str, value: f64) {
    if !value.is_finite() {
        errors.push(ValidationError::invalid(field, "must be a finite number"));
    }
}

fn check_positive(errors: &mut Vec<ValidationError>, field: &str, value: usize) {
    if value == 0 {
        errors.push(ValidationError::invalid(field, "must be greater than 0"));
    }
}

impl Config {
    /// Validate the entire configuration.
    pub fn validate(&self) -> ValidationResult<()> {
        let sections: [&dyn Validate; 4] =
            [&self.observability, &self.data, &self.screener, &self.trend];

        let mut errors = Vec::new();
        for section in sections {
            match section.validate() {
                Ok(()) => {}
                Err(ValidationError::Multiple(inner)) => errors.extend(inner),
                Err(e) => errors.push(e),
            }
        }
        collect(errors)
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();
        if !LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            errors.push(ValidationError::invalid(
                "observability.log_level",
                format!("expected one of {LOG_LEVELS:?}, got '{}'", self.log_level),
            ));
        }
        if !LOG_FORMATS.contains(&self.log_format.as_str()) {
            errors.push(ValidationError::invalid(
                "observability.log_format",
                format!("expected one of {LOG_FORMATS:?}, got '{}'", self.log_format),
            ));
        }
        collect(errors)
    }
}

impl Validate for DataConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();
        if self.data_dir.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: "data.data_dir".to_string(),
            });
        }
        if self.fetch_timeout_secs == 0 {
            errors.push(ValidationError::invalid(
                "data.fetch_timeout_secs",
                "must be greater than 0",
            ));
        }
        if self.cache_ttl_secs > MAX_CACHE_TTL_SECS {
            errors.push(ValidationError::invalid(
                "data.cache_ttl_secs",
                format!("must be at most {MAX_CACHE_TTL_SECS}"),
            ));
        }
        check_positive(&mut errors, "data.concurrency", self.concurrency);
        collect(errors)
    }
}

impl Validate for CriteriaConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();
        check_finite(&mut errors, "screener.criteria.min_price", self.min_price);
        check_finite(&mut errors, "screener.criteria.min_avg_volume", self.min_avg_volume);
        check_finite(
            &mut errors,
            "screener.criteria.price_change_threshold",
            self.price_change_threshold,
        );
        check_finite(
            &mut errors,
            "screener.criteria.volume_change_threshold",
            self.volume_change_threshold,
        );
        check_positive(
            &mut errors,
            "screener.criteria.price_change_window",
            self.price_change_window,
        );
        check_positive(
            &mut errors,
            "screener.criteria.volume_change_window",
            self.volume_change_window,
        );
        for window in &self.ma_requirements {
            if !SUPPORTED_MA_WINDOWS.contains(window) {
                errors.push(ValidationError::invalid(
                    "screener.criteria.ma_requirements",
                    format!("unsupported window {window}, expected one of {SUPPORTED_MA_WINDOWS:?}"),
                ));
            }
        }
        collect(errors)
    }
}

impl Validate for ScreenerConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();
        if self.lookback_days == 0 {
            errors.push(ValidationError::invalid(
                "screener.lookback_days",
                "must be greater than 0",
            ));
        }
        if let Err(e) = self.criteria.validate() {
            match e {
                ValidationError::Multiple(inner) => errors.extend(inner),
                other => errors.push(other),
            }
        }
        collect(errors)
    }
}

impl Validate for TrendScanConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();
        if self.window < 2 {
            errors.push(ValidationError::invalid("trend.window", "must be at least 2"));
        }
        check_positive(&mut errors, "trend.top_n", self.top_n);
        if self.lookback_days == 0 {
            errors.push(ValidationError::invalid(
                "trend.lookback_days",
                "must be greater than 0",
            ));
        }
        if !self.strength_threshold.is_finite() || self.strength_threshold < 0.0 {
            errors.push(ValidationError::invalid(
                "trend.strength_threshold",
                "must be a non-negative finite number",
            ));
        }
        if !(0.0..=1.0).contains(&self.r2_threshold) {
            errors.push(ValidationError::invalid(
                "trend.r2_threshold",
                "must lie in [0, 1]",
            ));
        }
        if !SUPPORTED_TIMEFRAMES.contains(&self.timeframe.to_lowercase().as_str()) {
            errors.push(ValidationError::invalid(
                "trend.timeframe",
                format!("expected one of {SUPPORTED_TIMEFRAMES:?}, got '{}'", self.timeframe),
            ));
        }
        collect(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test_case("verbose", "pretty" ; "unknown level")]
    #[test_case("info", "xml" ; "unknown format")]
    fn test_invalid_observability(level: &str, format: &str) {
        let config = ObservabilityConfig {
            log_level: level.to_string(),
            log_format: format.to_string(),
            excluded_targets: Vec::new(),
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_cache_ttl_ceiling() {
        let mut data = DataConfig {
            cache_ttl_secs: MAX_CACHE_TTL_SECS,
            ..Default::default()
        };
        assert!(data.validate().is_ok());

        data.cache_ttl_secs = u64::MAX;
        let err = data.validate().unwrap_err();
        assert!(err.to_string().contains("data.cache_ttl_secs"));
    }

    #[test]
    fn test_unsupported_ma_window() {
        let criteria = CriteriaConfig {
            ma_requirements: vec![20, 50],
            ..Default::default()
        };
        let err = criteria.validate().unwrap_err();
        assert!(err.to_string().contains("unsupported window 50"));
    }

    #[test]
    fn test_zero_windows_collected() {
        let criteria = CriteriaConfig {
            price_change_window: 0,
            volume_change_window: 0,
            min_price: f64::NAN,
            ..Default::default()
        };
        match criteria.validate() {
            Err(ValidationError::Multiple(errors)) => assert_eq!(errors.len(), 3),
            other => panic!("expected multiple errors, got {other:?}"),
        }
    }

    #[test]
    fn test_trend_thresholds() {
        let mut trend = TrendScanConfig::default();
        trend.r2_threshold = 1.5;
        assert!(trend.validate().is_err());

        trend.r2_threshold = 0.3;
        trend.timeframe = "1d".to_string();
        assert!(trend.validate().is_err());

        trend.timeframe = "5M".to_string();
        assert!(trend.validate().is_ok());
    }

    #[test]
    fn test_config_aggregates_sections() {
        let mut config = Config::default();
        config.data.concurrency = 0;
        config.trend.window = 1;
        match config.validate() {
            Err(ValidationError::Multiple(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected multiple errors, got {other:?}"),
        }
    }
}
