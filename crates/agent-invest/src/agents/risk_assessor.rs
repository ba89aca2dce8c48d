//! Risk assessment: weighted composite of the sub-analysis scores

use agent_core::{Analyzer, CancellationToken, Error, Payload, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::debug;

use super::{ensure_active, fields, market_snapshot, risk_tolerance, round2};
use crate::engine::{AnalysisKind, RiskTolerance};

const TRADING_DAYS: f64 = 252.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Classify annualized volatility
    pub fn from_volatility(volatility: f64) -> Self {
        if volatility < 0.2 {
            Self::Low
        } else if volatility < 0.4 {
            Self::Medium
        } else {
            Self::High
        }
    }
}

/// Fundamental/technical/sentiment weights for a tolerance
fn weights(tolerance: RiskTolerance) -> [(AnalysisKind, f64); 3] {
    let (fundamental, technical, sentiment) = match tolerance {
        RiskTolerance::Conservative => (0.5, 0.3, 0.2),
        RiskTolerance::Moderate => (0.4, 0.4, 0.2),
        RiskTolerance::Aggressive => (0.3, 0.4, 0.3),
    };
    [
        (AnalysisKind::Fundamental, fundamental),
        (AnalysisKind::Technical, technical),
        (AnalysisKind::Sentiment, sentiment),
    ]
}

/// Annualized standard deviation of simple returns
pub fn annualized_volatility(closes: &[f64]) -> Option<f64> {
    let returns: Vec<f64> = closes
        .windows(2)
        .filter(|w| w[0] > 0.0)
        .map(|w| w[1] / w[0] - 1.0)
        .collect();
    if returns.len() < 2 {
        return None;
    }

    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let variance =
        returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (returns.len() - 1) as f64;
    Some(variance.sqrt() * TRADING_DAYS.sqrt())
}

/// Combines the available sub-analysis scores into one composite score
///
/// Weights depend on the requester's risk tolerance and are renormalised
/// over the sub-analyses that actually produced a score.
#[derive(Debug, Clone, Default)]
pub struct RiskAssessor;

impl RiskAssessor {
    pub fn new() -> Self {
        Self
    }

    /// Composite score over `scores`; `None` if no weighted score is present
    pub fn composite(
        scores: &BTreeMap<AnalysisKind, f64>,
        tolerance: RiskTolerance,
    ) -> Option<f64> {
        let (total, weight) = weights(tolerance)
            .into_iter()
            .filter_map(|(kind, w)| scores.get(&kind).map(|s| (s * w, w)))
            .fold((0.0, 0.0), |(t, w), (s, x)| (t + s, w + x));

        (weight > 0.0).then(|| round2(total / weight).clamp(0.0, 100.0))
    }
}

#[async_trait]
impl Analyzer for RiskAssessor {
    async fn analyze(&self, input: Payload, cancel: CancellationToken) -> Result<Payload> {
        ensure_active(&cancel)?;
        let tolerance = risk_tolerance(&input)?;

        let scores: BTreeMap<AnalysisKind, f64> = AnalysisKind::SUB_ANALYSES
            .into_iter()
            .filter_map(|kind| {
                input
                    .get_payload(kind.as_str())
                    .and_then(|output| output.score())
                    .map(|score| (kind, score))
            })
            .collect();

        let composite = Self::composite(&scores, tolerance).ok_or_else(|| {
            Error::InvalidInput("no sub-analysis scores to assess".to_string())
        })?;

        let volatility = market_snapshot(&input)
            .ok()
            .and_then(|snapshot| annualized_volatility(&snapshot.price_history));
        let risk_level = volatility.map_or(RiskLevel::Medium, RiskLevel::from_volatility);
        ensure_active(&cancel)?;

        debug!(composite, ?risk_level, inputs = scores.len(), "Risk assessment complete");

        Ok(Payload::new()
            .with_score(composite)
            .with(fields::SUB_SCORES, json!(scores))
            .with(fields::VOLATILITY, json!(volatility.map(round2)))
            .with(fields::RISK_LEVEL, json!(risk_level))
            .with("risk_tolerance", json!(tolerance))
            .with(
                fields::SUMMARY,
                json!(format!(
                    "composite score {composite}/100 over {} analyses, {risk_level:?} risk",
                    scores.len()
                )),
            ))
    }

    fn name(&self) -> &str {
        "risk_assessor"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing;
    use crate::engine::RiskProfile;
    use agent_core::payload::keys;

    fn scores(entries: &[(AnalysisKind, f64)]) -> BTreeMap<AnalysisKind, f64> {
        entries.iter().copied().collect()
    }

    #[test]
    fn test_composite_uses_tolerance_weights() {
        let all = scores(&[
            (AnalysisKind::Fundamental, 80.0),
            (AnalysisKind::Technical, 60.0),
            (AnalysisKind::Sentiment, 70.0),
        ]);

        // 80 * 0.4 + 60 * 0.4 + 70 * 0.2
        assert_eq!(RiskAssessor::composite(&all, RiskTolerance::Moderate), Some(70.0));
        // 80 * 0.5 + 60 * 0.3 + 70 * 0.2
        assert_eq!(
            RiskAssessor::composite(&all, RiskTolerance::Conservative),
            Some(72.0)
        );
    }

    #[test]
    fn test_composite_renormalises_missing_inputs() {
        let partial = scores(&[
            (AnalysisKind::Fundamental, 80.0),
            (AnalysisKind::Technical, 60.0),
        ]);
        assert_eq!(
            RiskAssessor::composite(&partial, RiskTolerance::Moderate),
            Some(70.0)
        );
        assert_eq!(
            RiskAssessor::composite(&BTreeMap::new(), RiskTolerance::Moderate),
            None
        );
    }

    #[test]
    fn test_volatility() {
        let flat = vec![10.0; 30];
        assert_eq!(annualized_volatility(&flat), Some(0.0));
        assert!(annualized_volatility(&[10.0, 11.0]).is_none());

        let swinging: Vec<f64> = (0..30)
            .map(|i| if i % 2 == 0 { 10.0 } else { 11.0 })
            .collect();
        let vol = annualized_volatility(&swinging).unwrap();
        assert_eq!(RiskLevel::from_volatility(vol), RiskLevel::High);
    }

    #[tokio::test]
    async fn test_assess_from_upstream_outputs() {
        let input = testing::sub_analysis_input(&testing::snapshot())
            .with(
                keys::RISK_PROFILE,
                RiskProfile::with_tolerance(RiskTolerance::Aggressive).to_value(),
            )
            .with("technical", Payload::new().with_score(60.0).into_value())
            .with("sentiment", Payload::new().with_score(70.0).into_value());

        let output = RiskAssessor::new()
            .analyze(input, CancellationToken::new())
            .await
            .unwrap();

        // (60 * 0.4 + 70 * 0.3) / 0.7
        assert_eq!(output.score(), Some(64.29));
        assert_eq!(output.get(fields::RISK_LEVEL), Some(&json!("low")));
    }

    #[tokio::test]
    async fn test_no_scores_is_invalid_input() {
        let input = testing::sub_analysis_input(&testing::snapshot());
        let result = RiskAssessor::new()
            .analyze(input, CancellationToken::new())
            .await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }
}
