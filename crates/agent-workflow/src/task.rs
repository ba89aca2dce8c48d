//! Task and task result definitions

use agent_core::Payload;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// A unit of work bound for one analyzer
///
/// `K` identifies which analyzer the task belongs to. The payload is the
/// analyzer's input, assembled by the scheduler from prerequisite results.
#[derive(Debug, Clone)]
pub struct Task<K> {
    /// Which analyzer kind this task runs
    pub kind: K,
    /// Input payload for the analyzer
    pub payload: Payload,
    /// Dispatch priority, higher runs first among simultaneously ready tasks
    pub priority: u8,
    /// Time budget for the analyzer; must be positive
    pub timeout: Duration,
}

impl<K> Task<K> {
    /// Create a new task with default priority
    pub fn new(kind: K, payload: Payload, timeout: Duration) -> Self {
        Self {
            kind,
            payload,
            priority: 0,
            timeout,
        }
    }

    /// Set the dispatch priority
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }
}

/// Classification of a failed task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskErrorKind {
    /// The analyzer surfaced a fault
    AnalyzerError,
    /// The analyzer exceeded its time budget
    Timeout,
    /// The run was cancelled while the analyzer was in flight
    Cancelled,
}

impl fmt::Display for TaskErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::AnalyzerError => "analyzer_error",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Why a task failed, with the underlying message kept for diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    pub kind: TaskErrorKind,
    pub message: String,
}

impl TaskError {
    pub fn new(kind: TaskErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Outcome of one task
///
/// Read-only once handed back to the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub success: bool,
    /// Analyzer output; empty on failure
    pub output: Payload,
    pub error: Option<TaskError>,
    /// Wall-clock execution time, recorded for success and failure alike
    pub duration: Duration,
    pub started_at: DateTime<Utc>,
}

impl TaskResult {
    /// A successful result carrying the analyzer's output
    pub fn succeeded(output: Payload, duration: Duration, started_at: DateTime<Utc>) -> Self {
        Self {
            success: true,
            output,
            error: None,
            duration,
            started_at,
        }
    }

    /// A failed result
    pub fn failed(error: TaskError, duration: Duration, started_at: DateTime<Utc>) -> Self {
        Self {
            success: false,
            output: Payload::new(),
            error: Some(error),
            duration,
            started_at,
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Failure classification, `None` for successful results
    pub fn error_kind(&self) -> Option<TaskErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_builder() {
        let task = Task::new("technical", Payload::new(), Duration::from_secs(45)).with_priority(3);
        assert_eq!(task.kind, "technical");
        assert_eq!(task.priority, 3);
        assert_eq!(task.timeout, Duration::from_secs(45));
    }

    #[test]
    fn test_failed_result_has_empty_output() {
        let result = TaskResult::failed(
            TaskError::new(TaskErrorKind::Timeout, "exceeded 45s"),
            Duration::from_secs(45),
            Utc::now(),
        );

        assert!(!result.is_success());
        assert!(result.output.is_empty());
        assert_eq!(result.error_kind(), Some(TaskErrorKind::Timeout));
    }

    #[test]
    fn test_error_display() {
        let err = TaskError::new(TaskErrorKind::AnalyzerError, "no financial data");
        assert_eq!(err.to_string(), "analyzer_error: no financial data");
    }

    #[test]
    fn test_error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&TaskErrorKind::AnalyzerError);
        assert_eq!(json.unwrap(), "\"analyzer_error\"");
    }
}
