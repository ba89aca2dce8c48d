//! Analysis engine
//!
//! Coordination layer for one or more concurrent analysis runs: the request
//! vocabulary, the per-run dependency graph and state machine, the
//! orchestrator loop, result aggregation and the process-wide run registry.

pub mod aggregator;
pub mod analysis_engine;
pub mod graph;
pub mod orchestrator;
pub mod registry;
pub mod request;
pub mod result;
pub mod state;

pub use aggregator::ResultAggregator;
pub use analysis_engine::{AnalysisEngine, RecommendationSink};
pub use graph::DependencyGraph;
pub use orchestrator::{AnalyzerSet, Orchestrator};
pub use registry::{RunRegistry, RunSummary};
pub use request::{
    AnalysisKind, AnalysisRequest, ExperienceLevel, HoldingHorizon, RiskProfile, RiskTolerance,
};
pub use result::{Action, Recommendation, RecommendationBasis, Signal, TraceEntry, TraceStatus};
pub use state::{RunId, RunState, RunStatus};
