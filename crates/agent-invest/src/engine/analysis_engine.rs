//! Analysis engine - the inbound service boundary
//!
//! Starts runs in the background, keeps them in a [`RunRegistry`] for
//! polling and subscription, and hands finished recommendations to the
//! registered sinks.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::orchestrator::{AnalyzerSet, Orchestrator};
use super::registry::{RunRegistry, RunSummary};
use super::request::{AnalysisKind, AnalysisRequest, RiskProfile};
use super::result::Recommendation;
use super::state::{RunId, RunState};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};

/// Receives finished recommendations, e.g. for storage or notification
///
/// A failing sink is logged and never changes the outcome of the run.
#[async_trait]
pub trait RecommendationSink: Send + Sync {
    async fn publish(&self, run_id: RunId, recommendation: Recommendation) -> anyhow::Result<()>;

    fn name(&self) -> &str;
}

/// Entry point for starting and querying analysis runs
///
/// # Example
///
/// ```no_run
/// use agent_invest::agents::{builtin_analyzers, StaticMarketData};
/// use agent_invest::{AnalysisEngine, AnalysisKind, PipelineConfig, RiskProfile};
/// use std::sync::Arc;
///
/// # async fn example() -> agent_invest::Result<()> {
/// let analyzers = builtin_analyzers(Arc::new(StaticMarketData::new()));
/// let engine = AnalysisEngine::new(analyzers, PipelineConfig::default())?;
///
/// let run_id = engine.start_analysis("000001", AnalysisKind::SUB_ANALYSES, RiskProfile::default())?;
/// let state = engine.wait_for_completion(run_id).await?;
/// println!("{:?}", state.recommendation());
/// # Ok(())
/// # }
/// ```
pub struct AnalysisEngine {
    orchestrator: Arc<Orchestrator>,
    registry: RunRegistry,
    sinks: Vec<Arc<dyn RecommendationSink>>,
}

impl AnalysisEngine {
    /// Create an engine; every analysis kind needs a bound analyzer
    pub fn new(analyzers: AnalyzerSet, config: PipelineConfig) -> Result<Self> {
        config.validate()?;

        let missing = analyzers.missing();
        if !missing.is_empty() {
            let names: Vec<&str> = missing.iter().map(AnalysisKind::as_str).collect();
            return Err(PipelineError::Config(format!(
                "no analyzer registered for: {}",
                names.join(", ")
            )));
        }

        Ok(Self {
            orchestrator: Arc::new(Orchestrator::new(analyzers, config)),
            registry: RunRegistry::new(),
            sinks: Vec::new(),
        })
    }

    /// Add a recommendation sink
    pub fn with_sink(mut self, sink: Arc<dyn RecommendationSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        self.orchestrator.config()
    }

    pub fn registry(&self) -> &RunRegistry {
        &self.registry
    }

    /// Validate the request and start a run in the background
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_analysis(
        &self,
        symbol: &str,
        kinds: impl IntoIterator<Item = AnalysisKind>,
        risk_profile: RiskProfile,
    ) -> Result<RunId> {
        let request = AnalysisRequest::new(symbol, kinds, risk_profile)?;
        Ok(self.submit(request))
    }

    /// Start a run for an already validated request
    pub fn submit(&self, request: AnalysisRequest) -> RunId {
        let state = RunState::new(request);
        let run_id = state.run_id();
        let cancel = CancellationToken::new();
        let updates = self.registry.register(&state, cancel.clone());
        info!(%run_id, symbol = state.request().symbol(), "Run submitted");

        let orchestrator = Arc::clone(&self.orchestrator);
        let sinks = self.sinks.clone();
        tokio::spawn(async move {
            let finished = orchestrator.run(state, &cancel, &updates).await;
            if let Some(recommendation) = finished.recommendation() {
                publish(&sinks, run_id, recommendation).await;
            }
        });

        run_id
    }

    /// Latest state of a run
    ///
    /// Reading a terminal run always returns the same state.
    pub fn get_run_result(&self, run_id: RunId) -> Result<RunState> {
        self.registry
            .get(run_id)
            .ok_or(PipelineError::RunNotFound(run_id))
    }

    /// Wait for a run to reach a terminal status
    pub async fn wait_for_completion(&self, run_id: RunId) -> Result<RunState> {
        self.registry
            .wait_for_completion(run_id)
            .await
            .ok_or(PipelineError::RunNotFound(run_id))
    }

    /// Observe every state change of a run
    pub fn subscribe(&self, run_id: RunId) -> Result<watch::Receiver<RunState>> {
        self.registry
            .subscribe(run_id)
            .ok_or(PipelineError::RunNotFound(run_id))
    }

    /// Ask a run to stop
    ///
    /// In-flight analyzers are signalled and the run ends `Failed` with a
    /// cancellation reason. Cancelling a finished run has no effect.
    pub fn cancel(&self, run_id: RunId) -> Result<()> {
        if self.registry.cancel(run_id) {
            info!(%run_id, "Run cancellation requested");
            Ok(())
        } else {
            Err(PipelineError::RunNotFound(run_id))
        }
    }

    /// Remove a run from the registry, returning its latest state
    pub fn take_run(&self, run_id: RunId) -> Result<RunState> {
        self.registry
            .take(run_id)
            .ok_or(PipelineError::RunNotFound(run_id))
    }

    /// Drop finished runs nobody took within `max_age`
    pub fn prune_finished_runs(&self, max_age: std::time::Duration) -> usize {
        self.registry.prune_finished(max_age)
    }

    pub fn list_runs(&self) -> Vec<RunSummary> {
        self.registry.list_runs()
    }

    /// Run a request to completion and return its recommendation
    ///
    /// A failed run surfaces its failure reason as the error. The run is
    /// removed from the registry once its outcome is handed back.
    pub async fn analyze(&self, request: AnalysisRequest) -> Result<Recommendation> {
        let run_id = self.submit(request);
        let state = self.wait_for_completion(run_id).await?;
        self.registry.take(run_id);
        debug!(%run_id, status = %state.status(), "Run archived");

        match (state.recommendation(), state.failure()) {
            (Some(recommendation), _) => Ok(recommendation.clone()),
            (None, Some(reason)) => Err(reason.clone().into()),
            (None, None) => Err(PipelineError::Aggregation(format!(
                "run {run_id} ended {} without a recommendation",
                state.status()
            ))),
        }
    }
}

impl std::fmt::Debug for AnalysisEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisEngine")
            .field("orchestrator", &self.orchestrator)
            .field("registry", &self.registry)
            .field("sinks", &self.sinks.iter().map(|s| s.name()).collect::<Vec<_>>())
            .finish()
    }
}

async fn publish(sinks: &[Arc<dyn RecommendationSink>], run_id: RunId, recommendation: &Recommendation) {
    for sink in sinks {
        if let Err(e) = sink.publish(run_id, recommendation.clone()).await {
            warn!(%run_id, sink = sink.name(), error = %e, "Recommendation hand-off failed");
        }
    }
}
