//! Task executor for running a single analyzer invocation
//!
//! The TaskExecutor implements the per-task execution contract:
//! 1. Start the analyzer with a child of the run's cancellation token
//! 2. Race it against the task timeout and the run-level cancellation
//! 3. On timeout or cancellation, signal the analyzer and give it a short
//!    grace period to wind down, then drop it
//! 4. Always return a `TaskResult`, never an error; a panicking analyzer
//!    counts as an analyzer error

use agent_core::{Analyzer, Error};
use chrono::Utc;
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::task::{Task, TaskError, TaskErrorKind, TaskResult};

/// Configuration for task execution
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// How long an interrupted analyzer may keep running after its
    /// cancellation signal fires
    pub grace_period: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(2),
        }
    }
}

enum Interrupt {
    Finished(agent_core::Result<agent_core::Payload>),
    Panicked(String),
    TimedOut,
    Cancelled,
}

/// Executes exactly one task against its analyzer
///
/// A call to [`TaskExecutor::run`] never takes longer than
/// `task.timeout + grace_period`, whatever the analyzer does.
#[derive(Debug, Clone, Default)]
pub struct TaskExecutor {
    config: ExecutorConfig,
}

impl TaskExecutor {
    /// Create a new task executor
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    /// Get the executor configuration
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Run a task to completion, timeout, or cancellation
    ///
    /// # Arguments
    ///
    /// * `task` - The task to run
    /// * `analyzer` - The analyzer bound to the task's kind
    /// * `cancel` - Run-scoped cancellation signal
    #[tracing::instrument(
        name = "task",
        skip_all,
        fields(kind = %task.kind, timeout_ms = task.timeout.as_millis() as u64)
    )]
    pub async fn run<K: fmt::Display>(
        &self,
        task: Task<K>,
        analyzer: &dyn Analyzer,
        cancel: &CancellationToken,
    ) -> TaskResult {
        let started_at = Utc::now();
        let start = Instant::now();
        let token = cancel.child_token();

        debug!("Dispatching task to analyzer '{}'", analyzer.name());

        let fut = AssertUnwindSafe(analyzer.analyze(task.payload, token.clone())).catch_unwind();
        tokio::pin!(fut);
        let deadline = tokio::time::sleep(task.timeout);
        tokio::pin!(deadline);

        let interrupt = tokio::select! {
            biased;
            result = &mut fut => match result {
                Ok(result) => Interrupt::Finished(result),
                Err(panic) => Interrupt::Panicked(panic_message(panic.as_ref())),
            },
            () = cancel.cancelled() => Interrupt::Cancelled,
            () = &mut deadline => Interrupt::TimedOut,
        };

        let error = match interrupt {
            Interrupt::Finished(Ok(output)) => {
                let duration = start.elapsed();
                info!(
                    duration_ms = duration.as_millis() as u64,
                    "Task succeeded"
                );
                return TaskResult::succeeded(output, duration, started_at);
            }
            Interrupt::Finished(Err(Error::Cancelled)) if cancel.is_cancelled() => {
                TaskError::new(TaskErrorKind::Cancelled, "analyzer stopped after cancellation")
            }
            Interrupt::Finished(Err(e)) => TaskError::new(TaskErrorKind::AnalyzerError, e.to_string()),
            Interrupt::Panicked(message) => TaskError::new(
                TaskErrorKind::AnalyzerError,
                format!("analyzer panicked: {message}"),
            ),
            Interrupt::TimedOut => {
                token.cancel();
                self.wind_down(&mut fut).await;
                TaskError::new(
                    TaskErrorKind::Timeout,
                    format!("analyzer exceeded its {:?} budget", task.timeout),
                )
            }
            Interrupt::Cancelled => {
                token.cancel();
                self.wind_down(&mut fut).await;
                TaskError::new(TaskErrorKind::Cancelled, "run cancelled while task was in flight")
            }
        };

        let duration = start.elapsed();
        warn!(
            duration_ms = duration.as_millis() as u64,
            error = %error,
            "Task failed"
        );
        TaskResult::failed(error, duration, started_at)
    }

    /// Let a signalled analyzer finish cleanup, bounded by the grace period
    async fn wind_down<F>(&self, fut: &mut F)
    where
        F: std::future::Future + Unpin,
    {
        if tokio::time::timeout(self.config.grace_period, fut)
            .await
            .is_err()
        {
            debug!(
                "Analyzer ignored cancellation for {:?}, dropping it",
                self.config.grace_period
            );
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::Payload;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    enum Behavior {
        Succeed(Payload),
        Fail(&'static str),
        SpuriousCancel,
        Panic,
        /// Sleeps for the given time but stops as soon as it is cancelled
        Cooperative(Duration),
        /// Sleeps for the given time and never looks at its token
        Stubborn(Duration),
    }

    struct Scripted {
        behavior: Behavior,
        saw_cancel: Arc<AtomicBool>,
    }

    impl Scripted {
        fn new(behavior: Behavior) -> Self {
            Self {
                behavior,
                saw_cancel: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    #[async_trait]
    impl Analyzer for Scripted {
        async fn analyze(
            &self,
            _input: Payload,
            cancel: CancellationToken,
        ) -> agent_core::Result<Payload> {
            match &self.behavior {
                Behavior::Succeed(output) => Ok(output.clone()),
                Behavior::Fail(msg) => Err(Error::ProcessingFailed((*msg).to_string())),
                Behavior::SpuriousCancel => Err(Error::Cancelled),
                Behavior::Panic => {
                    let empty: Vec<f64> = Vec::new();
                    Ok(Payload::new().with_score(empty[0]))
                }
                Behavior::Cooperative(wait) => {
                    tokio::select! {
                        () = tokio::time::sleep(*wait) => Ok(Payload::new()),
                        () = cancel.cancelled() => {
                            self.saw_cancel.store(true, Ordering::SeqCst);
                            Err(Error::Cancelled)
                        }
                    }
                }
                Behavior::Stubborn(wait) => {
                    tokio::time::sleep(*wait).await;
                    Ok(Payload::new())
                }
            }
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn task(timeout_secs: u64) -> Task<&'static str> {
        Task::new("sentiment", Payload::new(), Duration::from_secs(timeout_secs))
    }

    #[test]
    fn test_default_config() {
        let config = ExecutorConfig::default();
        assert_eq!(config.grace_period, Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_within_timeout() {
        agent_utils::init_test_tracing();
        let executor = TaskExecutor::default();
        let analyzer = Scripted::new(Behavior::Succeed(Payload::new().with_score(70.0)));

        let result = executor
            .run(task(45), &analyzer, &CancellationToken::new())
            .await;

        assert!(result.is_success());
        assert_eq!(result.output.score(), Some(70.0));
        assert!(result.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_analyzer_error_preserves_message() {
        let executor = TaskExecutor::default();
        let analyzer = Scripted::new(Behavior::Fail("no financial data"));

        let result = executor
            .run(task(45), &analyzer, &CancellationToken::new())
            .await;

        assert!(!result.is_success());
        let error = result.error.unwrap();
        assert_eq!(error.kind, TaskErrorKind::AnalyzerError);
        assert!(error.message.contains("no financial data"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_signals_analyzer() {
        let executor = TaskExecutor::default();
        let analyzer = Scripted::new(Behavior::Cooperative(Duration::from_secs(600)));
        let saw_cancel = Arc::clone(&analyzer.saw_cancel);

        let result = executor
            .run(task(45), &analyzer, &CancellationToken::new())
            .await;

        assert_eq!(result.error_kind(), Some(TaskErrorKind::Timeout));
        assert!(saw_cancel.load(Ordering::SeqCst));
        assert!(result.duration >= Duration::from_secs(45));
        assert!(result.duration < Duration::from_secs(46));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stubborn_analyzer_is_dropped_after_grace() {
        let executor = TaskExecutor::default();
        let analyzer = Scripted::new(Behavior::Stubborn(Duration::from_secs(600)));
        let start = Instant::now();

        let result = executor
            .run(task(45), &analyzer, &CancellationToken::new())
            .await;

        assert_eq!(result.error_kind(), Some(TaskErrorKind::Timeout));
        assert!(start.elapsed() <= Duration::from_secs(45) + executor.config().grace_period);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_cancellation() {
        let executor = TaskExecutor::default();
        let analyzer = Scripted::new(Behavior::Cooperative(Duration::from_secs(600)));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });

        let result = executor.run(task(45), &analyzer, &cancel).await;

        assert_eq!(result.error_kind(), Some(TaskErrorKind::Cancelled));
        assert!(result.duration < Duration::from_secs(45));
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_cancelled_run() {
        let executor = TaskExecutor::default();
        let analyzer = Scripted::new(Behavior::Cooperative(Duration::from_secs(1)));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = executor.run(task(45), &analyzer, &cancel).await;
        assert_eq!(result.error_kind(), Some(TaskErrorKind::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_spurious_cancelled_error_is_analyzer_fault() {
        let executor = TaskExecutor::default();
        let analyzer = Scripted::new(Behavior::SpuriousCancel);

        let result = executor
            .run(task(45), &analyzer, &CancellationToken::new())
            .await;

        assert_eq!(result.error_kind(), Some(TaskErrorKind::AnalyzerError));
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_analyzer_becomes_analyzer_error() {
        let executor = TaskExecutor::default();
        let analyzer = Scripted::new(Behavior::Panic);

        let result = executor
            .run(task(45), &analyzer, &CancellationToken::new())
            .await;

        assert!(!result.is_success());
        let error = result.error.unwrap();
        assert_eq!(error.kind, TaskErrorKind::AnalyzerError);
        assert!(error.message.contains("index out of bounds"));
    }
}
