//! Error types for the analysis pipeline

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::engine::RunId;

/// Pipeline errors surfaced to callers of the engine
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The analysis request is malformed
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// No run is registered under the given id
    #[error("Run not found: {0}")]
    RunNotFound(RunId),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Base data could not be collected, so the run was aborted
    #[error("Data collection failed: {0}")]
    FatalData(String),

    /// The run was cancelled by the caller or by its deadline
    #[error("Run cancelled: {0}")]
    Cancelled(String),

    /// Result assembly hit an internal invariant violation
    #[error("Aggregation error: {0}")]
    Aggregation(String),

    /// An analyzer fault propagated outside of task execution
    #[error("Analyzer error: {0}")]
    Analyzer(#[from] agent_core::Error),
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

impl From<agent_utils::ConfigError> for PipelineError {
    fn from(err: agent_utils::ConfigError) -> Self {
        PipelineError::Config(err.to_string())
    }
}

/// Why a run ended in `Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// `data_collection` failed
    FatalDataError,
    /// Caller cancellation, or the deadline expired with nothing usable
    Cancelled,
    /// The recommendation could not be assembled
    AggregationError,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::FatalDataError => "fatal_data_error",
            Self::Cancelled => "cancelled",
            Self::AggregationError => "aggregation_error",
        };
        f.write_str(s)
    }
}

/// Structured failure reason recorded on a failed run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReason {
    pub kind: FailureKind,
    pub message: String,
}

impl FailureReason {
    pub fn fatal_data(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::FatalDataError,
            message: message.into(),
        }
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Cancelled,
            message: message.into(),
        }
    }

    pub fn aggregation(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::AggregationError,
            message: message.into(),
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl From<FailureReason> for PipelineError {
    fn from(reason: FailureReason) -> Self {
        match reason.kind {
            FailureKind::FatalDataError => PipelineError::FatalData(reason.message),
            FailureKind::Cancelled => PipelineError::Cancelled(reason.message),
            FailureKind::AggregationError => PipelineError::Aggregation(reason.message),
        }
    }
}
