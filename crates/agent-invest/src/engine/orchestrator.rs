//! Control loop for one analysis run
//!
//! The orchestrator owns its run's [`RunState`] exclusively. Tasks run
//! concurrently through the [`TaskExecutor`] and hand their results back to
//! the loop, which records them one at a time and then re-evaluates which
//! kinds became ready. Every state change is published as a snapshot on a
//! `watch` channel for observers.

use agent_core::{Analyzer, CancellationToken, Payload, payload::keys};
use agent_workflow::{ExecutorConfig, Task, TaskError, TaskErrorKind, TaskExecutor, TaskResult};
use chrono::Utc;
use futures::future::{self, BoxFuture, FutureExt};
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::json;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::aggregator::ResultAggregator;
use super::graph::DependencyGraph;
use super::request::{AnalysisKind, AnalysisRequest};
use super::result::Recommendation;
use super::state::{RunState, RunStatus};
use crate::config::PipelineConfig;
use crate::error::FailureReason;

/// The analyzer bound to each analysis kind
#[derive(Clone, Default)]
pub struct AnalyzerSet {
    analyzers: BTreeMap<AnalysisKind, Arc<dyn Analyzer>>,
}

impl AnalyzerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind an analyzer, replacing any previous binding for the kind
    pub fn with(mut self, kind: AnalysisKind, analyzer: Arc<dyn Analyzer>) -> Self {
        self.insert(kind, analyzer);
        self
    }

    pub fn insert(&mut self, kind: AnalysisKind, analyzer: Arc<dyn Analyzer>) {
        self.analyzers.insert(kind, analyzer);
    }

    pub fn get(&self, kind: AnalysisKind) -> Option<&Arc<dyn Analyzer>> {
        self.analyzers.get(&kind)
    }

    /// Kinds without a bound analyzer
    pub fn missing(&self) -> Vec<AnalysisKind> {
        AnalysisKind::ALL
            .into_iter()
            .filter(|kind| !self.analyzers.contains_key(kind))
            .collect()
    }
}

impl fmt::Debug for AnalyzerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.analyzers.iter().map(|(kind, a)| (kind, a.name())))
            .finish()
    }
}

/// Why the loop stopped dispatching before the graph was exhausted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    CallerCancelled,
    Deadline,
}

type Completion<'a> = BoxFuture<'a, (AnalysisKind, TaskResult)>;

/// Drives runs through the dependency graph
#[derive(Debug)]
pub struct Orchestrator {
    analyzers: AnalyzerSet,
    config: PipelineConfig,
    executor: TaskExecutor,
    aggregator: ResultAggregator,
}

impl Orchestrator {
    pub fn new(analyzers: AnalyzerSet, config: PipelineConfig) -> Self {
        let executor = TaskExecutor::new(ExecutorConfig {
            grace_period: config.grace_period,
        });
        let aggregator = ResultAggregator::new(&config);
        Self {
            analyzers,
            config,
            executor,
            aggregator,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run a request to a terminal state without observers
    pub async fn execute(&self, request: AnalysisRequest, cancel: &CancellationToken) -> RunState {
        let state = RunState::new(request);
        let (updates, _) = watch::channel(state.clone());
        self.run(state, cancel, &updates).await
    }

    /// Drive a `Pending` run to a terminal state
    ///
    /// `cancel` is the caller's signal; the run also cancels itself when
    /// its deadline expires. Every state change is sent on `updates`, the
    /// last one being the terminal state that is also returned.
    #[tracing::instrument(
        name = "run",
        skip_all,
        fields(run_id = %state.run_id(), symbol = state.request().symbol())
    )]
    pub async fn run(
        &self,
        mut state: RunState,
        cancel: &CancellationToken,
        updates: &watch::Sender<RunState>,
    ) -> RunState {
        if !state.start() {
            warn!(status = %state.status(), "Run is not pending, refusing to start it");
            return state;
        }
        info!(kinds = ?state.request().kinds(), "Run started");
        updates.send_replace(state.clone());

        let graph = DependencyGraph::for_request(state.request());
        let run_token = cancel.child_token();
        let deadline = tokio::time::sleep(self.config.run_deadline);
        tokio::pin!(deadline);

        let mut pending: FuturesUnordered<Completion<'_>> = FuturesUnordered::new();
        let mut stop: Option<StopReason> = None;

        loop {
            if stop.is_none() && cancel.is_cancelled() {
                stop = Some(StopReason::CallerCancelled);
                run_token.cancel();
            }

            if stop.is_none() && self.dispatch_ready(&graph, &mut state, &run_token, &mut pending) > 0
            {
                updates.send_replace(state.clone());
            }

            if pending.is_empty() {
                break;
            }

            tokio::select! {
                biased;
                Some((kind, result)) = pending.next() => {
                    if state.record(kind, result) {
                        updates.send_replace(state.clone());
                    } else {
                        warn!(%kind, "Discarded result for a kind that was not in flight");
                    }
                }
                () = cancel.cancelled(), if stop.is_none() => {
                    info!(in_flight = state.in_flight().len(), "Run cancelled by caller");
                    stop = Some(StopReason::CallerCancelled);
                    run_token.cancel();
                }
                () = &mut deadline, if stop.is_none() => {
                    warn!(
                        deadline_ms = self.config.run_deadline.as_millis() as u64,
                        in_flight = state.in_flight().len(),
                        "Run deadline expired"
                    );
                    stop = Some(StopReason::Deadline);
                    run_token.cancel();
                }
            }
        }

        self.finalize(&mut state, stop);
        updates.send_replace(state.clone());
        state
    }

    /// Dispatch every ready kind; returns how many were dispatched
    fn dispatch_ready<'a>(
        &'a self,
        graph: &DependencyGraph,
        state: &mut RunState,
        token: &'a CancellationToken,
        pending: &mut FuturesUnordered<Completion<'a>>,
    ) -> usize {
        let mut ready: Vec<AnalysisKind> = graph.ready_tasks(state).into_iter().collect();
        ready.sort_by_key(|kind| Reverse(kind.priority()));

        let mut dispatched = 0;
        for kind in ready {
            if !state.mark_in_flight(kind) {
                continue;
            }
            dispatched += 1;

            let Some(analyzer) = self.analyzers.get(kind).map(Arc::clone) else {
                warn!(%kind, "No analyzer registered");
                let result = TaskResult::failed(
                    TaskError::new(
                        TaskErrorKind::AnalyzerError,
                        format!("no analyzer registered for {kind}"),
                    ),
                    Duration::ZERO,
                    Utc::now(),
                );
                pending.push(future::ready((kind, result)).boxed());
                continue;
            };

            let task = Task::new(
                kind,
                self.task_input(graph, state, kind),
                self.config.timeout_for(kind),
            )
            .with_priority(kind.priority());
            debug!(%kind, priority = task.priority, "Task dispatched");

            let executor = &self.executor;
            pending.push(
                async move {
                    let result = executor.run(task, analyzer.as_ref(), token).await;
                    (kind, result)
                }
                .boxed(),
            );
        }

        dispatched
    }

    /// Input payload for a task: request context, the collected base data
    /// and the outputs of successful direct prerequisites, each nested
    /// under its kind name
    fn task_input(&self, graph: &DependencyGraph, state: &RunState, kind: AnalysisKind) -> Payload {
        let request = state.request();
        let mut input = Payload::new()
            .with_symbol(request.symbol())
            .with(keys::RISK_PROFILE, request.risk_profile().to_value())
            .with("requested", json!(request.kinds()));

        let mut sources: BTreeSet<AnalysisKind> = graph.prerequisites(kind).collect();
        if kind != AnalysisKind::DataCollection {
            sources.insert(AnalysisKind::DataCollection);
        }
        for source in sources {
            if let Some(result) = state.result(source).filter(|r| r.is_success()) {
                input.insert(source.as_str(), result.output.clone().into_value());
            }
        }

        input
    }

    fn finalize(&self, state: &mut RunState, stop: Option<StopReason>) {
        let finished = match self.conclude(state, stop) {
            Ok((status, recommendation)) => {
                info!(
                    %status,
                    action = %recommendation.action,
                    confidence = recommendation.confidence,
                    failed = ?recommendation.failed,
                    "Run finished"
                );
                state.finish(status, Some(recommendation), None)
            }
            Err(reason) => {
                warn!(reason = %reason, "Run failed");
                state.finish(RunStatus::Failed, None, Some(reason))
            }
        };

        if !finished {
            error!(status = %state.status(), "Run was already terminal at finalization");
        }
    }

    fn conclude(
        &self,
        state: &RunState,
        stop: Option<StopReason>,
    ) -> Result<(RunStatus, Recommendation), FailureReason> {
        if !state.succeeded(AnalysisKind::DataCollection) {
            if stop.is_some() {
                return Err(FailureReason::cancelled(
                    "run stopped before base data was collected",
                ));
            }
            let message = state
                .result(AnalysisKind::DataCollection)
                .and_then(|result| result.error.as_ref())
                .map_or_else(|| "data collection did not run".to_string(), ToString::to_string);
            return Err(FailureReason::fatal_data(message));
        }

        match stop {
            Some(StopReason::CallerCancelled) => {
                return Err(FailureReason::cancelled("cancelled by caller"));
            }
            Some(StopReason::Deadline) if state.successful_sub_analyses().next().is_none() => {
                return Err(FailureReason::cancelled(format!(
                    "run deadline of {:?} expired with no usable results",
                    self.config.run_deadline
                )));
            }
            _ => {}
        }

        let recommendation = self.aggregator.aggregate(state).map_err(|e| {
            error!(error = %e, "Recommendation could not be assembled");
            FailureReason::aggregation(e.to_string())
        })?;

        let status = if state.succeeded(AnalysisKind::StrategyGeneration) {
            RunStatus::Completed
        } else {
            RunStatus::PartiallyCompleted
        };
        Ok((status, recommendation))
    }
}
