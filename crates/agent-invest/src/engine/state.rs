//! Run identity and per-run state

use agent_workflow::TaskResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::request::{AnalysisKind, AnalysisRequest};
use super::result::Recommendation;
use crate::error::{FailureReason, PipelineError};

/// Unique identifier of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for RunId {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| PipelineError::InvalidRequest(format!("invalid run id '{s}': {e}")))
    }
}

/// Lifecycle of a run
///
/// `Pending -> Running -> {Completed, PartiallyCompleted, Failed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    /// `strategy_generation` succeeded
    Completed,
    /// Degraded recommendation built from what was available
    PartiallyCompleted,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::PartiallyCompleted | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::PartiallyCompleted => "partially_completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate state of one run
///
/// Only the run's orchestrator mutates a `RunState`; everybody else sees
/// cloned snapshots. The setters below refuse transitions that would break
/// the lifecycle, so a terminal state is frozen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    run_id: RunId,
    request: AnalysisRequest,
    results: BTreeMap<AnalysisKind, TaskResult>,
    in_flight: BTreeSet<AnalysisKind>,
    status: RunStatus,
    failure: Option<FailureReason>,
    recommendation: Option<Recommendation>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl RunState {
    /// A fresh `Pending` run
    pub fn new(request: AnalysisRequest) -> Self {
        Self::with_id(RunId::new(), request)
    }

    pub fn with_id(run_id: RunId, request: AnalysisRequest) -> Self {
        Self {
            run_id,
            request,
            results: BTreeMap::new(),
            in_flight: BTreeSet::new(),
            status: RunStatus::Pending,
            failure: None,
            recommendation: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    // =========== Accessors ===========

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn request(&self) -> &AnalysisRequest {
        &self.request
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Recorded results keyed by kind
    pub fn results(&self) -> &BTreeMap<AnalysisKind, TaskResult> {
        &self.results
    }

    pub fn result(&self, kind: AnalysisKind) -> Option<&TaskResult> {
        self.results.get(&kind)
    }

    /// Kinds dispatched but not yet recorded
    pub fn in_flight(&self) -> &BTreeSet<AnalysisKind> {
        &self.in_flight
    }

    /// Whether the kind was ever dispatched in this run
    pub fn is_scheduled(&self, kind: AnalysisKind) -> bool {
        self.in_flight.contains(&kind) || self.results.contains_key(&kind)
    }

    pub fn succeeded(&self, kind: AnalysisKind) -> bool {
        self.result(kind).is_some_and(TaskResult::is_success)
    }

    pub fn failed(&self, kind: AnalysisKind) -> bool {
        self.result(kind).is_some_and(|r| !r.is_success())
    }

    /// Requested sub-analyses that succeeded
    pub fn successful_sub_analyses(&self) -> impl Iterator<Item = AnalysisKind> + '_ {
        self.request
            .kinds()
            .iter()
            .copied()
            .filter(|kind| self.succeeded(*kind))
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        self.failure.as_ref()
    }

    pub fn recommendation(&self) -> Option<&Recommendation> {
        self.recommendation.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    // =========== Transitions ===========

    /// `Pending -> Running`; returns false from any other status
    pub fn start(&mut self) -> bool {
        if self.status != RunStatus::Pending {
            return false;
        }
        self.status = RunStatus::Running;
        self.started_at = Some(Utc::now());
        true
    }

    /// Mark a kind as dispatched
    ///
    /// Returns false if the kind was already scheduled or the run is
    /// terminal, in which case nothing changes.
    pub fn mark_in_flight(&mut self, kind: AnalysisKind) -> bool {
        if self.is_terminal() || self.is_scheduled(kind) {
            return false;
        }
        self.in_flight.insert(kind)
    }

    /// Record the result of an in-flight kind
    ///
    /// Results for kinds that are not in flight are ignored.
    pub fn record(&mut self, kind: AnalysisKind, result: TaskResult) -> bool {
        if self.is_terminal() || !self.in_flight.remove(&kind) {
            return false;
        }
        self.results.insert(kind, result);
        true
    }

    /// Freeze the run in a terminal status
    ///
    /// Returns false, leaving the state untouched, when the run is already
    /// terminal or `status` is not a terminal status.
    pub fn finish(
        &mut self,
        status: RunStatus,
        recommendation: Option<Recommendation>,
        failure: Option<FailureReason>,
    ) -> bool {
        if self.is_terminal() || !status.is_terminal() {
            return false;
        }
        self.status = status;
        self.recommendation = recommendation;
        self.failure = failure;
        self.finished_at = Some(Utc::now());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::RiskProfile;
    use agent_core::Payload;
    use agent_workflow::{TaskError, TaskErrorKind};
    use std::time::Duration;

    fn state() -> RunState {
        RunState::new(AnalysisRequest::full("000001", RiskProfile::default()).unwrap())
    }

    fn ok() -> TaskResult {
        TaskResult::succeeded(Payload::new(), Duration::from_millis(5), Utc::now())
    }

    #[test]
    fn test_new_state_is_pending() {
        let state = state();
        assert_eq!(state.status(), RunStatus::Pending);
        assert!(state.results().is_empty());
        assert!(state.started_at().is_none());
    }

    #[test]
    fn test_run_id_parse() {
        let id = RunId::new();
        assert_eq!(id.to_string().parse::<RunId>().unwrap(), id);
        assert!("not-a-run".parse::<RunId>().is_err());
    }

    #[test]
    fn test_no_duplicate_scheduling() {
        let mut state = state();
        assert!(state.start());
        assert!(state.mark_in_flight(AnalysisKind::DataCollection));
        assert!(!state.mark_in_flight(AnalysisKind::DataCollection));

        assert!(state.record(AnalysisKind::DataCollection, ok()));
        assert!(!state.mark_in_flight(AnalysisKind::DataCollection));
        assert!(!state.record(AnalysisKind::DataCollection, ok()));
        assert!(state.succeeded(AnalysisKind::DataCollection));
    }

    #[test]
    fn test_record_requires_in_flight() {
        let mut state = state();
        state.start();
        assert!(!state.record(AnalysisKind::Technical, ok()));
        assert!(state.result(AnalysisKind::Technical).is_none());
    }

    #[test]
    fn test_terminal_status_is_frozen() {
        let mut state = state();
        state.start();
        assert!(!state.finish(RunStatus::Running, None, None));
        assert!(state.finish(
            RunStatus::Failed,
            None,
            Some(FailureReason::fatal_data("no quotes"))
        ));

        assert!(!state.finish(RunStatus::Completed, None, None));
        assert!(!state.mark_in_flight(AnalysisKind::Fundamental));
        assert!(!state.start());
        assert_eq!(state.status(), RunStatus::Failed);
        assert!(state.finished_at().is_some());
    }

    #[test]
    fn test_successful_sub_analyses() {
        let mut state = state();
        state.start();
        for kind in [AnalysisKind::Fundamental, AnalysisKind::Technical] {
            state.mark_in_flight(kind);
        }
        state.record(AnalysisKind::Fundamental, ok());
        state.record(
            AnalysisKind::Technical,
            TaskResult::failed(
                TaskError::new(TaskErrorKind::Timeout, "slow"),
                Duration::from_secs(45),
                Utc::now(),
            ),
        );

        let succeeded: Vec<_> = state.successful_sub_analyses().collect();
        assert_eq!(succeeded, vec![AnalysisKind::Fundamental]);
        assert!(state.failed(AnalysisKind::Technical));
    }

    #[test]
    fn test_status_display() {
        assert_eq!(RunStatus::PartiallyCompleted.to_string(), "partially_completed");
        assert!(!RunStatus::Running.is_terminal());
    }
}
