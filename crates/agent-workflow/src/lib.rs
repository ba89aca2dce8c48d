//! Task execution primitives for the analysis pipeline
//!
//! This crate runs one analyzer invocation at a time under a timeout and a
//! cooperative cancellation signal, and always turns the outcome into a
//! [`TaskResult`]. Scheduling across tasks lives with the caller.

pub mod executor;
pub mod task;

// Re-export for convenience
pub use executor::{ExecutorConfig, TaskExecutor};
pub use task::{Task, TaskError, TaskErrorKind, TaskResult};
