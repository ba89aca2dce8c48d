//! Built-in analyzers for the six analysis kinds
//!
//! Each analyzer implements [`agent_core::Analyzer`]. Inputs are assembled by
//! the orchestrator: the request context (`symbol`, `risk_profile`), the
//! `data_collection` output, and the outputs of successful direct
//! prerequisites, each nested under its kind name.

pub mod data_collector;
pub mod fundamental_analyzer;
pub mod risk_assessor;
pub mod sentiment_analyzer;
pub mod strategy_generator;
pub mod technical_analyzer;

pub use data_collector::{
    DataCollector, Financials, MarketDataSource, MarketSnapshot, NewsItem, StaticMarketData,
};
pub use fundamental_analyzer::FundamentalAnalyzer;
pub use risk_assessor::RiskAssessor;
pub use sentiment_analyzer::SentimentAnalyzer;
pub use strategy_generator::StrategyGenerator;
pub use technical_analyzer::TechnicalAnalyzer;

use agent_core::{CancellationToken, Error, Payload, Result, payload::keys};
use std::sync::Arc;

use crate::cache::SnapshotCache;
use crate::engine::{AnalysisKind, AnalyzerSet, RiskTolerance};

/// Payload field names produced and consumed by the built-in analyzers
pub mod fields {
    pub const PRICE_HISTORY: &str = "price_history";
    pub const FINANCIALS: &str = "financials";
    pub const NEWS: &str = "news";
    pub const SOURCE: &str = "source";
    pub const SUMMARY: &str = "summary";
    pub const SUB_SCORES: &str = "sub_scores";
    pub const RISK_LEVEL: &str = "risk_level";
    pub const VOLATILITY: &str = "volatility";
    pub const ACTION: &str = "action";
    pub const CONFIDENCE: &str = "confidence";
    pub const TARGET_PRICE: &str = "target_price";
    pub const STOP_LOSS: &str = "stop_loss";
    pub const HOLDING_PERIOD: &str = "holding_period";
}

/// Every built-in analyzer over the given market data source
pub fn builtin_analyzers(source: Arc<dyn MarketDataSource>) -> AnalyzerSet {
    builtin_analyzers_with_cache(source, SnapshotCache::default())
}

/// Like [`builtin_analyzers`] with an explicit snapshot cache
pub fn builtin_analyzers_with_cache(
    source: Arc<dyn MarketDataSource>,
    cache: SnapshotCache,
) -> AnalyzerSet {
    AnalyzerSet::new()
        .with(
            AnalysisKind::DataCollection,
            Arc::new(DataCollector::with_cache(source, cache)),
        )
        .with(AnalysisKind::Fundamental, Arc::new(FundamentalAnalyzer::new()))
        .with(AnalysisKind::Technical, Arc::new(TechnicalAnalyzer::new()))
        .with(AnalysisKind::Sentiment, Arc::new(SentimentAnalyzer::new()))
        .with(AnalysisKind::RiskAssessment, Arc::new(RiskAssessor::new()))
        .with(
            AnalysisKind::StrategyGeneration,
            Arc::new(StrategyGenerator::new()),
        )
}

fn ensure_active(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}

/// Output of a prerequisite, nested under its kind name
fn upstream(input: &Payload, kind: AnalysisKind) -> Result<Payload> {
    input
        .get_payload(kind.as_str())
        .ok_or_else(|| Error::InvalidInput(format!("missing '{kind}' input")))
}

fn market_snapshot(input: &Payload) -> Result<MarketSnapshot> {
    let data = upstream(input, AnalysisKind::DataCollection)?;
    MarketSnapshot::from_payload(&data)
}

/// Requester's risk tolerance; moderate when absent
fn risk_tolerance(input: &Payload) -> Result<RiskTolerance> {
    let Some(profile) = input.get_payload(keys::RISK_PROFILE) else {
        return Ok(RiskTolerance::default());
    };
    Ok(profile
        .get_typed::<RiskTolerance>("risk_tolerance")?
        .unwrap_or_default())
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// A steadily rising price series
    pub fn rising_prices(len: usize) -> Vec<f64> {
        (0..len).map(|i| 10.0 + i as f64 * 0.1).collect()
    }

    pub fn snapshot() -> MarketSnapshot {
        MarketSnapshot {
            current_price: 15.0,
            price_history: rising_prices(60),
            financials: Financials {
                pe_ratio: Some(15.0),
                pb_ratio: Some(1.2),
                roe: Some(0.18),
                debt_ratio: Some(0.35),
                profit_margin: Some(0.2),
                current_ratio: Some(1.8),
            },
            news: vec![NewsItem {
                title: "Quarterly profit beats expectations".to_string(),
                summary: "Strong growth and improved margins".to_string(),
            }],
        }
    }

    /// Input as the orchestrator would assemble it for a sub-analysis
    pub fn sub_analysis_input(snapshot: &MarketSnapshot) -> Payload {
        Payload::new()
            .with_symbol("000001")
            .with(
                AnalysisKind::DataCollection.as_str(),
                snapshot.to_payload().into_value(),
            )
    }
}
