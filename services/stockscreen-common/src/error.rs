//! Error types for the screener services.

use thiserror::Error;

use crate::validation::ValidationError;

/// Result type alias using the screener error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the screener binary.
///
/// Per-instrument failures never surface here: the screening core reports
/// them as skips. This type covers run-level problems only.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration could not be read or parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration was parsed but holds invalid values
    #[error("Invalid configuration: {0}")]
    Validation(#[from] ValidationError),

    /// Invalid input from the caller (e.g. empty universe)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Market data source failure
    #[error("Data source error: {0}")]
    DataSource(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Process exit code for the command-line entry point.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Validation(_) => 78,
            Self::InvalidInput(_) => 64,
            Self::DataSource(_) | Self::Json(_) => 1,
        }
    }
}
