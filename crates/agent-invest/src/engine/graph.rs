//! Dependency graph between analysis kinds

use std::collections::{BTreeMap, BTreeSet};

use super::request::{AnalysisKind, AnalysisRequest};
use super::state::RunState;

/// Prerequisite edges for one run
///
/// `data_collection` feeds every requested sub-analysis, the requested
/// sub-analyses feed `risk_assessment`, and `risk_assessment` feeds
/// `strategy_generation`. Sub-analyses that were not requested are absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyGraph {
    prerequisites: BTreeMap<AnalysisKind, BTreeSet<AnalysisKind>>,
}

impl DependencyGraph {
    /// Build the graph for a request
    pub fn for_request(request: &AnalysisRequest) -> Self {
        let mut prerequisites = BTreeMap::new();
        prerequisites.insert(AnalysisKind::DataCollection, BTreeSet::new());

        for &kind in request.kinds() {
            prerequisites.insert(kind, BTreeSet::from([AnalysisKind::DataCollection]));
        }

        prerequisites.insert(AnalysisKind::RiskAssessment, request.kinds().clone());
        prerequisites.insert(
            AnalysisKind::StrategyGeneration,
            BTreeSet::from([AnalysisKind::RiskAssessment]),
        );

        Self { prerequisites }
    }

    /// Kinds present in this graph, in stage order
    pub fn kinds(&self) -> impl Iterator<Item = AnalysisKind> + '_ {
        self.prerequisites.keys().copied()
    }

    pub fn contains(&self, kind: AnalysisKind) -> bool {
        self.prerequisites.contains_key(&kind)
    }

    /// Direct prerequisites of a kind; empty for kinds outside the graph
    pub fn prerequisites(&self, kind: AnalysisKind) -> impl Iterator<Item = AnalysisKind> + '_ {
        self.prerequisites
            .get(&kind)
            .into_iter()
            .flat_map(|prereqs| prereqs.iter().copied())
    }

    /// Every kind that can be dispatched now
    ///
    /// A kind is ready when it has not been scheduled and each prerequisite
    /// has an accepted result: a success, or a failed sub-analysis.
    /// `risk_assessment` additionally needs at least one successful
    /// sub-analysis. Pure function of `state`.
    pub fn ready_tasks(&self, state: &RunState) -> BTreeSet<AnalysisKind> {
        if state.is_terminal() {
            return BTreeSet::new();
        }

        self.kinds()
            .filter(|&kind| !state.is_scheduled(kind) && self.is_ready(kind, state))
            .collect()
    }

    /// Whether nothing is running and nothing more can be dispatched
    pub fn is_exhausted(&self, state: &RunState) -> bool {
        state.in_flight().is_empty() && self.ready_tasks(state).is_empty()
    }

    fn is_ready(&self, kind: AnalysisKind, state: &RunState) -> bool {
        let mut prereqs = self.prerequisites(kind).peekable();
        if prereqs.peek().is_none() {
            return true;
        }

        let mut any_succeeded = false;
        for prereq in prereqs {
            match state.result(prereq) {
                Some(result) if result.is_success() => any_succeeded = true,
                Some(_) if prereq.is_sub_analysis() => {}
                _ => return false,
            }
        }

        kind != AnalysisKind::RiskAssessment || any_succeeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::RiskProfile;
    use agent_core::Payload;
    use agent_workflow::{TaskError, TaskErrorKind, TaskResult};
    use chrono::Utc;
    use std::time::Duration;

    fn request(kinds: &[AnalysisKind]) -> AnalysisRequest {
        AnalysisRequest::new("000001", kinds.iter().copied(), RiskProfile::default()).unwrap()
    }

    fn complete(state: &mut RunState, kind: AnalysisKind, success: bool) {
        state.mark_in_flight(kind);
        let result = if success {
            TaskResult::succeeded(Payload::new(), Duration::from_millis(1), Utc::now())
        } else {
            TaskResult::failed(
                TaskError::new(TaskErrorKind::AnalyzerError, "boom"),
                Duration::from_millis(1),
                Utc::now(),
            )
        };
        state.record(kind, result);
    }

    #[test]
    fn test_unrequested_kinds_are_absent() {
        let graph = DependencyGraph::for_request(&request(&[AnalysisKind::Technical]));
        assert!(graph.contains(AnalysisKind::Technical));
        assert!(!graph.contains(AnalysisKind::Fundamental));
        assert_eq!(
            graph.prerequisites(AnalysisKind::RiskAssessment).collect::<Vec<_>>(),
            vec![AnalysisKind::Technical]
        );
    }

    #[test]
    fn test_only_data_collection_ready_at_start() {
        let req = request(&AnalysisKind::SUB_ANALYSES);
        let graph = DependencyGraph::for_request(&req);
        let state = RunState::new(req);

        assert_eq!(
            graph.ready_tasks(&state),
            BTreeSet::from([AnalysisKind::DataCollection])
        );
    }

    #[test]
    fn test_in_flight_kinds_are_not_ready() {
        let req = request(&AnalysisKind::SUB_ANALYSES);
        let graph = DependencyGraph::for_request(&req);
        let mut state = RunState::new(req);
        state.start();
        state.mark_in_flight(AnalysisKind::DataCollection);

        assert!(graph.ready_tasks(&state).is_empty());
        assert!(!graph.is_exhausted(&state));
    }

    #[test]
    fn test_sub_analyses_ready_together() {
        let req = request(&AnalysisKind::SUB_ANALYSES);
        let graph = DependencyGraph::for_request(&req);
        let mut state = RunState::new(req);
        state.start();
        complete(&mut state, AnalysisKind::DataCollection, true);

        assert_eq!(
            graph.ready_tasks(&state),
            BTreeSet::from(AnalysisKind::SUB_ANALYSES)
        );
    }

    #[test]
    fn test_data_collection_failure_blocks_everything() {
        let req = request(&AnalysisKind::SUB_ANALYSES);
        let graph = DependencyGraph::for_request(&req);
        let mut state = RunState::new(req);
        state.start();
        complete(&mut state, AnalysisKind::DataCollection, false);

        assert!(graph.ready_tasks(&state).is_empty());
        assert!(graph.is_exhausted(&state));
    }

    #[test]
    fn test_risk_waits_for_all_sub_analyses() {
        let req = request(&AnalysisKind::SUB_ANALYSES);
        let graph = DependencyGraph::for_request(&req);
        let mut state = RunState::new(req);
        state.start();
        complete(&mut state, AnalysisKind::DataCollection, true);
        complete(&mut state, AnalysisKind::Fundamental, true);
        complete(&mut state, AnalysisKind::Technical, false);
        state.mark_in_flight(AnalysisKind::Sentiment);

        assert!(graph.ready_tasks(&state).is_empty());
    }

    #[test]
    fn test_risk_proceeds_past_partial_failure() {
        let req = request(&AnalysisKind::SUB_ANALYSES);
        let graph = DependencyGraph::for_request(&req);
        let mut state = RunState::new(req);
        state.start();
        complete(&mut state, AnalysisKind::DataCollection, true);
        complete(&mut state, AnalysisKind::Fundamental, true);
        complete(&mut state, AnalysisKind::Technical, false);
        complete(&mut state, AnalysisKind::Sentiment, false);

        assert_eq!(
            graph.ready_tasks(&state),
            BTreeSet::from([AnalysisKind::RiskAssessment])
        );
    }

    #[test]
    fn test_risk_needs_one_success() {
        let req = request(&[AnalysisKind::Fundamental, AnalysisKind::Sentiment]);
        let graph = DependencyGraph::for_request(&req);
        let mut state = RunState::new(req);
        state.start();
        complete(&mut state, AnalysisKind::DataCollection, true);
        complete(&mut state, AnalysisKind::Fundamental, false);
        complete(&mut state, AnalysisKind::Sentiment, false);

        assert!(graph.ready_tasks(&state).is_empty());
        assert!(graph.is_exhausted(&state));
    }

    #[test]
    fn test_strategy_requires_risk_success() {
        let req = request(&[AnalysisKind::Technical]);
        let graph = DependencyGraph::for_request(&req);
        let mut state = RunState::new(req);
        state.start();
        complete(&mut state, AnalysisKind::DataCollection, true);
        complete(&mut state, AnalysisKind::Technical, true);
        complete(&mut state, AnalysisKind::RiskAssessment, false);

        assert!(graph.ready_tasks(&state).is_empty());
    }

    #[test]
    fn test_ready_tasks_is_deterministic() {
        let req = request(&AnalysisKind::SUB_ANALYSES);
        let graph = DependencyGraph::for_request(&req);
        let mut state = RunState::new(req);
        state.start();
        complete(&mut state, AnalysisKind::DataCollection, true);

        let first = graph.ready_tasks(&state);
        let second = graph.ready_tasks(&state.clone());
        assert_eq!(first, second);
    }
}
