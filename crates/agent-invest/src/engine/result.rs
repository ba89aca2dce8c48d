//! Recommendation types

use agent_workflow::TaskErrorKind;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use super::request::AnalysisKind;
use crate::error::PipelineError;

/// What the requester should do with the stock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Buy,
    Hold,
    Sell,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Hold => "hold",
            Self::Sell => "sell",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = PipelineError;

    /// Graded actions such as `strong_buy` or `reduce` fold into the three
    /// base actions.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "buy" | "strong_buy" => Ok(Self::Buy),
            "hold" => Ok(Self::Hold),
            "sell" | "strong_sell" | "reduce" => Ok(Self::Sell),
            other => Err(PipelineError::Aggregation(format!("unknown action '{other}'"))),
        }
    }
}

/// Direction a single analysis leans
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    Buy,
    Sell,
    Neutral,
}

impl Signal {
    /// Parse an explicit signal string; unrecognised values yield `None`
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "buy" | "bullish" | "positive" => Some(Self::Buy),
            "sell" | "bearish" | "negative" => Some(Self::Sell),
            "neutral" | "hold" => Some(Self::Neutral),
            _ => None,
        }
    }

    /// Classify a 0-100 score against the buy and sell thresholds
    pub fn from_score(score: f64, buy_threshold: f64, sell_threshold: f64) -> Self {
        if score >= buy_threshold {
            Self::Buy
        } else if score <= sell_threshold {
            Self::Sell
        } else {
            Self::Neutral
        }
    }
}

/// How a recommendation was derived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationBasis {
    /// Taken from a successful strategy_generation output
    Strategy,
    /// Majority vote over the sub-analyses that succeeded
    MajorityVote,
    /// Only base data was available
    DataOnly,
}

/// Status of one analysis kind in the reasoning trace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TraceStatus {
    /// Succeeded and fed the recommendation
    Contributed,
    /// Ran and failed
    Failed { error: TaskErrorKind },
    /// Part of the run but never dispatched
    Skipped,
    /// Not part of the run
    NotRequested,
}

/// One line of the reasoning trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub kind: AnalysisKind,
    #[serde(flatten)]
    pub status: TraceStatus,
    /// Score reported by the analysis, if any
    pub score: Option<f64>,
    /// Direction the analysis leaned, if it could be determined
    pub signal: Option<Signal>,
}

/// Final output of a run
///
/// Every field is a pure function of the task results recorded when the run
/// was finalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub symbol: String,
    pub action: Action,
    /// Confidence in [0, 100]
    pub confidence: f64,
    pub target_price: Option<f64>,
    pub stop_loss: Option<f64>,
    pub basis: RecommendationBasis,
    /// Per-kind status, in stage order
    pub reasoning: Vec<TraceEntry>,
    /// Kinds whose outputs shaped the recommendation
    pub contributors: BTreeSet<AnalysisKind>,
    /// Kinds in the run that failed or were skipped
    pub failed: BTreeSet<AnalysisKind>,
    /// Sub-analysis scores that were available
    pub sub_scores: BTreeMap<AnalysisKind, f64>,
    /// One-line human readable summary
    pub summary: String,
}

impl Recommendation {
    /// Whether any part of the run was unavailable
    pub fn is_degraded(&self) -> bool {
        !self.failed.is_empty() || self.basis != RecommendationBasis::Strategy
    }

    /// Trace entry for a kind
    pub fn trace(&self, kind: AnalysisKind) -> Option<&TraceEntry> {
        self.reasoning.iter().find(|entry| entry.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_parse_folds_grades() {
        assert_eq!("strong_buy".parse::<Action>().unwrap(), Action::Buy);
        assert_eq!("REDUCE".parse::<Action>().unwrap(), Action::Sell);
        assert_eq!("hold".parse::<Action>().unwrap(), Action::Hold);
        assert!("short".parse::<Action>().is_err());
    }

    #[test]
    fn test_signal_from_score() {
        assert_eq!(Signal::from_score(60.0, 60.0, 40.0), Signal::Buy);
        assert_eq!(Signal::from_score(40.0, 60.0, 40.0), Signal::Sell);
        assert_eq!(Signal::from_score(50.0, 60.0, 40.0), Signal::Neutral);
    }

    #[test]
    fn test_signal_parse() {
        assert_eq!(Signal::parse("Bullish"), Some(Signal::Buy));
        assert_eq!(Signal::parse("sell"), Some(Signal::Sell));
        assert_eq!(Signal::parse("sideways"), None);
    }

    #[test]
    fn test_trace_entry_serialization() {
        let entry = TraceEntry {
            kind: AnalysisKind::Sentiment,
            status: TraceStatus::Failed {
                error: TaskErrorKind::Timeout,
            },
            score: None,
            signal: None,
        };

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["kind"], "sentiment");
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"], "timeout");
    }
}
