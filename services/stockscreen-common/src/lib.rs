//! Stockscreen Common - Shared configuration, errors and logging for the screener.
//!
//! This crate provides:
//! - Configuration types and loading (`~/.stockscreen/config.json`)
//! - Configuration validation
//! - The unified error type
//! - Logging setup
//! - Symbol list parsing shared by the config layer and the screener

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod util;
pub mod validation;

pub use config::{
    Config, ConfigSource, CriteriaConfig, DataConfig, ObservabilityConfig, ScreenerConfig, TrendScanConfig,
};
pub use error::{Error, Result};
pub use validation::{Validate, ValidationError, ValidationResult};

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::config::{Config, CriteriaConfig, DataConfig, ScreenerConfig, TrendScanConfig};
    pub use crate::error::{Error, Result};
    pub use crate::logging::init_logging;
    pub use crate::validation::{Validate, ValidationError};
}
