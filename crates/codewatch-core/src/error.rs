//! Error types for the codewatch engine
//!
//! Only startup and API-misuse failures are represented here. A failed fetch is
//! not an `Error`: it travels as a [`FetchResult`](crate::traits::FetchResult)
//! and reaches subscribers as an [`ErrorNotification`](crate::propagator::ErrorNotification).

use thiserror::Error;

/// Result type alias for codewatch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the codewatch engine
#[derive(Error, Debug)]
pub enum Error {
    /// One or more configured sources are invalid. Fatal at startup.
    #[error("Invalid configuration: {}", .0.join("; "))]
    ConfigInvalid(Vec<String>),

    /// The requested source identifier is not configured
    #[error("Source not configured: {0}")]
    ConfigNotFound(String),

    /// Other configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Clipboard or keystroke sink failure
    #[error("Sink error: {0}")]
    Sink(String),

    /// HTTP client construction errors
    #[error("HTTP error: {0}")]
    Http(String),

    /// Invalid input to a runtime operation
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an aggregated configuration error
    pub fn config_invalid(violations: Vec<String>) -> Self {
        Self::ConfigInvalid(violations)
    }

    /// Create a "source not configured" error
    pub fn not_found(source_id: impl Into<String>) -> Self {
        Self::ConfigNotFound(source_id.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a sink error
    pub fn sink(msg: impl Into<String>) -> Self {
        Self::Sink(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// The individual violations of a `ConfigInvalid` error, empty otherwise
    pub fn violations(&self) -> &[String] {
        match self {
            Self::ConfigInvalid(violations) => violations,
            _ => &[],
        }
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
