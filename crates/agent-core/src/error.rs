//! Error types for agent-core

use thiserror::Error;

/// Result type alias for agent-core
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for analyzer operations
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// Generic error message
    #[error("{0}")]
    Generic(String),

    /// The payload handed to an analyzer does not match its input schema
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Analyzer processing failed
    #[error("Analyzer processing failed: {0}")]
    ProcessingFailed(String),

    /// The analyzer observed its cancellation signal and stopped early
    #[error("Analyzer cancelled")]
    Cancelled,
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidInput(err.to_string())
    }
}
