//! Investment analysis pipeline
//!
//! Turns a stock symbol and a requester's risk profile into one explainable
//! recommendation by coordinating six analyzers:
//!
//! - `data_collection`: market snapshot (prices, financial ratios, news)
//! - `fundamental`, `technical`, `sentiment`: independent sub-analyses that
//!   run concurrently once base data is available
//! - `risk_assessment`: risk-weighted composite of the sub-analyses
//! - `strategy_generation`: action, confidence, target price and stop-loss
//!
//! # Architecture
//!
//! - [`engine::DependencyGraph`] decides which kinds are ready
//! - [`engine::Orchestrator`] dispatches ready kinds through the
//!   [`agent_workflow::TaskExecutor`], records results and applies the
//!   partial-failure policy
//! - [`engine::ResultAggregator`] merges whatever succeeded into a
//!   [`Recommendation`], penalizing confidence for missing inputs
//! - [`engine::RunRegistry`] tracks concurrent runs for polling and
//!   subscription
//! - [`AnalysisEngine`] is the service boundary tying these together
//!
//! Analyzers are pluggable behind [`agent_core::Analyzer`]; the
//! [`agents`] module ships reference implementations for all six kinds.
//!
//! # Example
//!
//! ```rust,no_run
//! use agent_invest::agents::{builtin_analyzers, StaticMarketData};
//! use agent_invest::{AnalysisEngine, AnalysisRequest, PipelineConfig, RiskProfile};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     agent_utils::init_tracing();
//!
//!     let source = StaticMarketData::new();
//!     let engine = AnalysisEngine::new(
//!         builtin_analyzers(Arc::new(source)),
//!         PipelineConfig::from_env()?,
//!     )?;
//!
//!     let request = AnalysisRequest::full("000001", RiskProfile::default())?;
//!     let recommendation = engine.analyze(request).await?;
//!     println!("{}", recommendation.summary);
//!
//!     Ok(())
//! }
//! ```

pub mod agents;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;

// Re-export main types for convenience
pub use config::PipelineConfig;
pub use engine::{
    Action, AnalysisEngine, AnalysisKind, AnalysisRequest, Recommendation, RecommendationSink,
    RiskProfile, RiskTolerance, RunId, RunState, RunStatus,
};
pub use error::{FailureKind, FailureReason, PipelineError, Result};
