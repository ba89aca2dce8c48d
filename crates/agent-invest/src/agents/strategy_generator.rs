//! Strategy generation from the risk-weighted composite score

use agent_core::{Analyzer, CancellationToken, Payload, Result, payload::keys};
use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use super::{ensure_active, fields, market_snapshot, round2, upstream};
use crate::engine::{Action, AnalysisKind, HoldingHorizon, RiskTolerance};

const MAX_CONFIDENCE: f64 = 95.0;

/// Target gain and stop-loss distance, as fractions of the current price
fn price_bands(tolerance: RiskTolerance) -> (f64, f64) {
    match tolerance {
        RiskTolerance::Conservative => (0.15, 0.08),
        RiskTolerance::Moderate => (0.25, 0.12),
        RiskTolerance::Aggressive => (0.35, 0.15),
    }
}

/// Scale applied to the target gain for a composite score
fn target_scale(score: f64) -> f64 {
    if score >= 75.0 {
        1.2
    } else if score >= 60.0 {
        1.0
    } else if score >= 40.0 {
        0.8
    } else if score >= 25.0 {
        0.5
    } else {
        0.3
    }
}

fn holding_period(action: Action, horizon: HoldingHorizon) -> &'static str {
    match (action, horizon) {
        (Action::Buy, HoldingHorizon::Short) => "1-3 months",
        (Action::Buy, HoldingHorizon::Medium) => "3-6 months",
        (Action::Buy, HoldingHorizon::Long) => "6-12 months",
        _ => "1-3 months",
    }
}

/// Turns the composite score into an actionable strategy
///
/// | score   | action                              | confidence          |
/// |---------|-------------------------------------|---------------------|
/// | >= 75   | buy                                 | 80 + (s - 75) * 0.8 |
/// | 60..75  | buy if aggressive, else hold        | 60 + (s - 60)       |
/// | 40..60  | hold                                | 50 + (s - 40) * 0.5 |
/// | 25..40  | sell unless conservative, then hold | 60 + (40 - s)       |
/// | < 25    | sell                                | 80 + (25 - s) * 0.8 |
///
/// Confidence is capped at 95.
#[derive(Debug, Clone, Default)]
pub struct StrategyGenerator;

impl StrategyGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Action and confidence for a composite score
    pub fn decide(score: f64, tolerance: RiskTolerance) -> (Action, f64) {
        let (action, confidence) = if score >= 75.0 {
            (Action::Buy, 80.0 + (score - 75.0) * 0.8)
        } else if score >= 60.0 {
            let action = if tolerance == RiskTolerance::Aggressive {
                Action::Buy
            } else {
                Action::Hold
            };
            (action, 60.0 + (score - 60.0))
        } else if score >= 40.0 {
            (Action::Hold, 50.0 + (score - 40.0) * 0.5)
        } else if score >= 25.0 {
            let action = if tolerance == RiskTolerance::Conservative {
                Action::Hold
            } else {
                Action::Sell
            };
            (action, 60.0 + (40.0 - score))
        } else {
            (Action::Sell, 80.0 + (25.0 - score) * 0.8)
        };

        (action, round2(confidence.min(MAX_CONFIDENCE)))
    }

    /// Target price and stop-loss around `price`
    ///
    /// A sell targets the downside, with the stop above the price.
    pub fn price_targets(
        price: f64,
        score: f64,
        action: Action,
        tolerance: RiskTolerance,
    ) -> (f64, f64) {
        let (gain, stop) = price_bands(tolerance);
        let move_ = gain * target_scale(score);
        match action {
            Action::Sell => (round2(price * (1.0 - move_)), round2(price * (1.0 + stop))),
            Action::Buy | Action::Hold => {
                (round2(price * (1.0 + move_)), round2(price * (1.0 - stop)))
            }
        }
    }
}

#[async_trait]
impl Analyzer for StrategyGenerator {
    async fn analyze(&self, input: Payload, cancel: CancellationToken) -> Result<Payload> {
        ensure_active(&cancel)?;

        let risk = upstream(&input, AnalysisKind::RiskAssessment)?;
        let score = risk.require_f64(keys::SCORE)?;
        let price = market_snapshot(&input)?.current_price;

        let profile = input.get_payload(keys::RISK_PROFILE).unwrap_or_default();
        let tolerance: RiskTolerance = profile.get_typed("risk_tolerance")?.unwrap_or_default();
        let horizon: HoldingHorizon = profile.get_typed("holding_horizon")?.unwrap_or_default();

        let (action, confidence) = Self::decide(score, tolerance);
        let (target_price, stop_loss) = Self::price_targets(price, score, action, tolerance);
        debug!(score, %action, confidence, "Strategy generated");

        Ok(Payload::new()
            .with_score(score)
            .with(fields::ACTION, json!(action))
            .with(fields::CONFIDENCE, json!(confidence))
            .with(fields::TARGET_PRICE, json!(target_price))
            .with(fields::STOP_LOSS, json!(stop_loss))
            .with(fields::HOLDING_PERIOD, json!(holding_period(action, horizon)))
            .with(
                fields::SUMMARY,
                json!(format!(
                    "{action} at composite score {score}/100, target {target_price}, stop {stop_loss}"
                )),
            ))
    }

    fn name(&self) -> &str {
        "strategy_generator"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing;
    use crate::engine::RiskProfile;

    #[test]
    fn test_decide_bands() {
        assert_eq!(
            StrategyGenerator::decide(80.0, RiskTolerance::Moderate),
            (Action::Buy, 84.0)
        );
        assert_eq!(
            StrategyGenerator::decide(70.0, RiskTolerance::Moderate),
            (Action::Hold, 70.0)
        );
        assert_eq!(
            StrategyGenerator::decide(70.0, RiskTolerance::Aggressive),
            (Action::Buy, 70.0)
        );
        assert_eq!(
            StrategyGenerator::decide(50.0, RiskTolerance::Moderate),
            (Action::Hold, 55.0)
        );
        assert_eq!(
            StrategyGenerator::decide(30.0, RiskTolerance::Conservative),
            (Action::Hold, 70.0)
        );
        assert_eq!(
            StrategyGenerator::decide(30.0, RiskTolerance::Moderate),
            (Action::Sell, 70.0)
        );
    }

    #[test]
    fn test_confidence_is_capped() {
        let (action, confidence) = StrategyGenerator::decide(100.0, RiskTolerance::Moderate);
        assert_eq!(action, Action::Buy);
        assert!((confidence - 95.0).abs() < f64::EPSILON);

        let (action, confidence) = StrategyGenerator::decide(0.0, RiskTolerance::Moderate);
        assert_eq!(action, Action::Sell);
        assert!((confidence - 95.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_price_targets() {
        let (target, stop) =
            StrategyGenerator::price_targets(10.0, 80.0, Action::Buy, RiskTolerance::Moderate);
        // 25% gain scaled by 1.2, 12% stop
        assert!((target - 13.0).abs() < 1e-9);
        assert!((stop - 8.8).abs() < 1e-9);

        let (target, stop) =
            StrategyGenerator::price_targets(10.0, 20.0, Action::Sell, RiskTolerance::Aggressive);
        assert!(target < 10.0);
        assert!(stop > 10.0);
    }

    #[tokio::test]
    async fn test_generate_from_risk_output() {
        let input = testing::sub_analysis_input(&testing::snapshot())
            .with(
                keys::RISK_PROFILE,
                RiskProfile::with_tolerance(RiskTolerance::Aggressive).to_value(),
            )
            .with(
                AnalysisKind::RiskAssessment.as_str(),
                Payload::new().with_score(65.0).into_value(),
            );

        let output = StrategyGenerator::new()
            .analyze(input, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(output.get(fields::ACTION), Some(&json!("buy")));
        assert_eq!(output.get_f64(fields::CONFIDENCE), Some(65.0));
        assert_eq!(output.get(fields::HOLDING_PERIOD), Some(&json!("3-6 months")));
        // 15.0 * (1 + 0.35)
        assert_eq!(output.get_f64(fields::TARGET_PRICE), Some(20.25));
    }

    #[tokio::test]
    async fn test_missing_risk_input() {
        let input = testing::sub_analysis_input(&testing::snapshot());
        let result = StrategyGenerator::new()
            .analyze(input, CancellationToken::new())
            .await;
        assert!(matches!(result, Err(agent_core::Error::InvalidInput(_))));
    }
}
