//! Result aggregation into a single recommendation

use agent_core::Payload;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use super::graph::DependencyGraph;
use super::request::AnalysisKind;
use super::result::{Action, Recommendation, RecommendationBasis, Signal, TraceEntry, TraceStatus};
use super::state::RunState;
use crate::agents::fields;
use crate::config::{MINIMAL_CONFIDENCE_CEILING, PipelineConfig};
use crate::error::{PipelineError, Result};

/// Merges the recorded task results of a run into a [`Recommendation`]
///
/// Aggregation is a pure function of the run state: identical results always
/// produce an identical recommendation.
#[derive(Debug, Clone)]
pub struct ResultAggregator {
    confidence_penalty: f64,
    fallback_confidence_cap: f64,
    minimal_confidence: f64,
    buy_threshold: f64,
    sell_threshold: f64,
}

struct Decision {
    action: Action,
    confidence: f64,
    target_price: Option<f64>,
    stop_loss: Option<f64>,
    basis: RecommendationBasis,
}

impl ResultAggregator {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            confidence_penalty: config.confidence_penalty,
            fallback_confidence_cap: config.fallback_confidence_cap,
            minimal_confidence: config.minimal_confidence.min(MINIMAL_CONFIDENCE_CEILING),
            buy_threshold: config.buy_threshold,
            sell_threshold: config.sell_threshold,
        }
    }

    /// Build the recommendation for a run whose base data was collected
    ///
    /// Fails with [`PipelineError::Aggregation`] when `data_collection` did
    /// not succeed or a successful strategy output is malformed.
    pub fn aggregate(&self, state: &RunState) -> Result<Recommendation> {
        if !state.succeeded(AnalysisKind::DataCollection) {
            return Err(PipelineError::Aggregation(
                "cannot aggregate without collected data".to_string(),
            ));
        }

        let graph = DependencyGraph::for_request(state.request());
        let reasoning: Vec<TraceEntry> = AnalysisKind::ALL
            .into_iter()
            .map(|kind| self.trace_entry(&graph, state, kind))
            .collect();

        let contributors: BTreeSet<AnalysisKind> = reasoning
            .iter()
            .filter(|entry| entry.status == TraceStatus::Contributed)
            .map(|entry| entry.kind)
            .collect();
        let failed: BTreeSet<AnalysisKind> = reasoning
            .iter()
            .filter(|entry| {
                matches!(
                    entry.status,
                    TraceStatus::Failed { .. } | TraceStatus::Skipped
                )
            })
            .map(|entry| entry.kind)
            .collect();
        let sub_scores: BTreeMap<AnalysisKind, f64> = reasoning
            .iter()
            .filter(|entry| entry.kind.is_sub_analysis())
            .filter_map(|entry| entry.score.map(|score| (entry.kind, score)))
            .collect();

        let decision = if state.succeeded(AnalysisKind::StrategyGeneration) {
            self.from_strategy(state)?
        } else if state.successful_sub_analyses().next().is_some() {
            self.majority_vote(&reasoning)
        } else {
            Decision {
                action: Action::Hold,
                confidence: self.minimal_confidence,
                target_price: None,
                stop_loss: None,
                basis: RecommendationBasis::DataOnly,
            }
        };

        let summary = summarize(state.request().symbol(), &decision, &failed);
        debug!(
            action = %decision.action,
            confidence = decision.confidence,
            basis = ?decision.basis,
            failed = failed.len(),
            "Recommendation aggregated"
        );

        Ok(Recommendation {
            symbol: state.request().symbol().to_string(),
            action: decision.action,
            confidence: decision.confidence,
            target_price: decision.target_price,
            stop_loss: decision.stop_loss,
            basis: decision.basis,
            reasoning,
            contributors,
            failed,
            sub_scores,
            summary,
        })
    }

    /// Directional lean of one output: an explicit signal wins over the score
    pub fn signal_of(&self, output: &Payload) -> Option<Signal> {
        output.signal().and_then(Signal::parse).or_else(|| {
            output
                .score()
                .map(|score| Signal::from_score(score, self.buy_threshold, self.sell_threshold))
        })
    }

    fn trace_entry(
        &self,
        graph: &DependencyGraph,
        state: &RunState,
        kind: AnalysisKind,
    ) -> TraceEntry {
        let (status, output) = if !graph.contains(kind) {
            (TraceStatus::NotRequested, None)
        } else {
            match state.result(kind) {
                Some(result) if result.is_success() => {
                    (TraceStatus::Contributed, Some(&result.output))
                }
                Some(result) => match result.error_kind() {
                    Some(error) => (TraceStatus::Failed { error }, None),
                    None => (TraceStatus::Skipped, None),
                },
                None => (TraceStatus::Skipped, None),
            }
        };

        let directional = kind.is_sub_analysis() || kind == AnalysisKind::RiskAssessment;
        TraceEntry {
            kind,
            status,
            score: output.and_then(Payload::score),
            signal: output
                .filter(|_| directional)
                .and_then(|output| self.signal_of(output)),
        }
    }

    fn from_strategy(&self, state: &RunState) -> Result<Decision> {
        let output = state
            .result(AnalysisKind::StrategyGeneration)
            .map(|result| &result.output)
            .ok_or_else(|| PipelineError::Aggregation("strategy output missing".to_string()))?;

        let action: Action = output
            .get(fields::ACTION)
            .and_then(|v| v.as_str())
            .ok_or_else(|| PipelineError::Aggregation("strategy output has no action".to_string()))?
            .parse()?;

        let confidence = output
            .get_f64(fields::CONFIDENCE)
            .filter(|c| c.is_finite() && (0.0..=100.0).contains(c))
            .ok_or_else(|| {
                PipelineError::Aggregation("strategy confidence missing or out of range".to_string())
            })?;

        let missing = state
            .request()
            .kinds()
            .iter()
            .filter(|kind| !state.succeeded(**kind))
            .count();
        let penalty = self.confidence_penalty.powi(missing as i32);

        Ok(Decision {
            action,
            confidence: round2(confidence * penalty),
            target_price: output.get_f64(fields::TARGET_PRICE),
            stop_loss: output.get_f64(fields::STOP_LOSS),
            basis: RecommendationBasis::Strategy,
        })
    }

    /// Majority vote over the sub-analyses that produced a direction
    fn majority_vote(&self, reasoning: &[TraceEntry]) -> Decision {
        let votes: Vec<Signal> = reasoning
            .iter()
            .filter(|entry| entry.kind.is_sub_analysis())
            .filter_map(|entry| entry.signal)
            .collect();

        let count = |signal: Signal| votes.iter().filter(|v| **v == signal).count();
        let (buy, sell, neutral) = (count(Signal::Buy), count(Signal::Sell), count(Signal::Neutral));

        let (action, winning) = if buy > sell && buy > neutral {
            (Action::Buy, buy)
        } else if sell > buy && sell > neutral {
            (Action::Sell, sell)
        } else {
            (Action::Hold, buy.max(sell).max(neutral))
        };

        let confidence = if votes.is_empty() {
            self.minimal_confidence
        } else {
            round2(self.fallback_confidence_cap * winning as f64 / votes.len() as f64)
        };

        Decision {
            action,
            confidence,
            target_price: None,
            stop_loss: None,
            basis: RecommendationBasis::MajorityVote,
        }
    }
}

fn summarize(symbol: &str, decision: &Decision, failed: &BTreeSet<AnalysisKind>) -> String {
    let basis = match decision.basis {
        RecommendationBasis::Strategy => "strategy",
        RecommendationBasis::MajorityVote => "majority vote",
        RecommendationBasis::DataOnly => "base data only",
    };
    let mut summary = format!(
        "{symbol}: {} with {:.1}% confidence from {basis}",
        decision.action, decision.confidence
    );
    if !failed.is_empty() {
        let names: Vec<&str> = failed.iter().map(AnalysisKind::as_str).collect();
        summary.push_str(&format!(", unavailable: {}", names.join(", ")));
    }
    summary
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
