//! Fundamental analysis over financial ratios

use agent_core::{Analyzer, CancellationToken, Error, Payload, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::debug;

use super::{Financials, ensure_active, fields, market_snapshot};

/// How a ratio compares with its reference bands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatioGrade {
    Good,
    Fair,
    Poor,
}

impl RatioGrade {
    fn score(self) -> f64 {
        match self {
            Self::Good => 85.0,
            Self::Fair => 65.0,
            Self::Poor => 30.0,
        }
    }
}

/// Reference bands and weight for one ratio; bounds are inclusive
struct RatioBand {
    name: &'static str,
    read: fn(&Financials) -> Option<f64>,
    good: (f64, f64),
    fair: (f64, f64),
    weight: f64,
}

const BANDS: [RatioBand; 6] = [
    RatioBand {
        name: "pe_ratio",
        read: |f| f.pe_ratio,
        good: (10.0, 20.0),
        fair: (5.0, 30.0),
        weight: 0.20,
    },
    RatioBand {
        name: "pb_ratio",
        read: |f| f.pb_ratio,
        good: (0.8, 1.5),
        fair: (0.5, 2.0),
        weight: 0.15,
    },
    RatioBand {
        name: "roe",
        read: |f| f.roe,
        good: (0.15, 1.0),
        fair: (0.08, 0.15),
        weight: 0.25,
    },
    RatioBand {
        name: "debt_ratio",
        read: |f| f.debt_ratio,
        good: (0.0, 0.4),
        fair: (0.4, 0.6),
        weight: 0.20,
    },
    RatioBand {
        name: "profit_margin",
        read: |f| f.profit_margin,
        good: (0.15, 1.0),
        fair: (0.08, 0.15),
        weight: 0.15,
    },
    RatioBand {
        name: "current_ratio",
        read: |f| f.current_ratio,
        good: (1.5, 3.0),
        fair: (1.0, 1.5),
        weight: 0.05,
    },
];

impl RatioBand {
    fn grade(&self, value: f64) -> RatioGrade {
        let within = |(lo, hi): (f64, f64)| (lo..=hi).contains(&value);
        if within(self.good) {
            RatioGrade::Good
        } else if within(self.fair) {
            RatioGrade::Fair
        } else {
            RatioGrade::Poor
        }
    }

    fn value(&self, financials: &Financials) -> Option<f64> {
        (self.read)(financials).filter(|v| v.is_finite())
    }
}

/// Grade of one ratio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatioAssessment {
    pub value: f64,
    pub grade: RatioGrade,
}

/// Scores a company's financial ratios against reference bands
///
/// Each known ratio is graded good (85), fair (65) or poor (30); the score is
/// the weighted mean over the ratios that are present.
#[derive(Debug, Clone, Default)]
pub struct FundamentalAnalyzer;

impl FundamentalAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Grade every known ratio
    pub fn assess(financials: &Financials) -> BTreeMap<&'static str, RatioAssessment> {
        BANDS
            .iter()
            .filter_map(|band| {
                band.value(financials).map(|value| {
                    (
                        band.name,
                        RatioAssessment {
                            value,
                            grade: band.grade(value),
                        },
                    )
                })
            })
            .collect()
    }

    /// Weighted score over the assessed ratios; `None` when nothing is known
    pub fn score(assessments: &BTreeMap<&'static str, RatioAssessment>) -> Option<f64> {
        let (total, weight) = BANDS
            .iter()
            .filter_map(|band| assessments.get(band.name).map(|a| (a.grade.score(), band.weight)))
            .fold((0.0, 0.0), |(total, weight), (score, w)| {
                (total + score * w, weight + w)
            });

        (weight > 0.0).then(|| (total / weight).round().clamp(0.0, 100.0))
    }
}

#[async_trait]
impl Analyzer for FundamentalAnalyzer {
    async fn analyze(&self, input: Payload, cancel: CancellationToken) -> Result<Payload> {
        ensure_active(&cancel)?;
        let snapshot = market_snapshot(&input)?;

        let assessments = Self::assess(&snapshot.financials);
        let score = Self::score(&assessments)
            .ok_or_else(|| Error::ProcessingFailed("no financial ratios available".to_string()))?;
        ensure_active(&cancel)?;

        let poor: Vec<&str> = assessments
            .iter()
            .filter(|(_, a)| a.grade == RatioGrade::Poor)
            .map(|(name, _)| *name)
            .collect();
        let summary = if poor.is_empty() {
            format!("fundamental score {score}/100")
        } else {
            format!("fundamental score {score}/100, weak: {}", poor.join(", "))
        };
        debug!(score, ratios = assessments.len(), "Fundamental analysis complete");

        Ok(Payload::new()
            .with_score(score)
            .with("assessments", json!(assessments))
            .with(fields::SUMMARY, json!(summary)))
    }

    fn name(&self) -> &str {
        "fundamental_analyzer"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing;

    #[test]
    fn test_band_grading() {
        let pe = &BANDS[0];
        assert_eq!(pe.grade(15.0), RatioGrade::Good);
        assert_eq!(pe.grade(25.0), RatioGrade::Fair);
        assert_eq!(pe.grade(45.0), RatioGrade::Poor);
        assert_eq!(pe.grade(3.0), RatioGrade::Poor);
    }

    #[test]
    fn test_weighted_score_over_present_ratios() {
        let financials = Financials {
            pe_ratio: Some(15.0),
            debt_ratio: Some(0.5),
            ..Financials::default()
        };
        let assessments = FundamentalAnalyzer::assess(&financials);
        assert_eq!(assessments.len(), 2);

        // (85 * 0.20 + 65 * 0.20) / 0.40
        assert_eq!(FundamentalAnalyzer::score(&assessments), Some(75.0));
    }

    #[test]
    fn test_no_ratios_yields_no_score() {
        let assessments = FundamentalAnalyzer::assess(&Financials::default());
        assert_eq!(FundamentalAnalyzer::score(&assessments), None);
    }

    #[tokio::test]
    async fn test_healthy_company_scores_high() {
        let input = testing::sub_analysis_input(&testing::snapshot());
        let output = FundamentalAnalyzer::new()
            .analyze(input, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(output.score(), Some(85.0));
        assert!(output.get("assessments").is_some());
    }

    #[tokio::test]
    async fn test_missing_financials_is_an_error() {
        let mut snapshot = testing::snapshot();
        snapshot.financials = Financials::default();
        let result = FundamentalAnalyzer::new()
            .analyze(testing::sub_analysis_input(&snapshot), CancellationToken::new())
            .await;
        assert!(matches!(result, Err(Error::ProcessingFailed(_))));
    }

    #[tokio::test]
    async fn test_missing_data_collection_input() {
        let result = FundamentalAnalyzer::new()
            .analyze(Payload::new().with_symbol("000001"), CancellationToken::new())
            .await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }
}
