//! Basic investment analysis example
//!
//! Runs the built-in analyzers over in-memory market data and prints the
//! recommendation with its reasoning trace.
//!
//! To run this example:
//! ```bash
//! # Optional: shorten the run deadline or tune the confidence penalty
//! export INVEST_RUN_DEADLINE_SECS=150
//! export INVEST_CONFIDENCE_PENALTY=0.8
//!
//! cargo run --example basic_analysis 000001 aggressive
//! ```

use agent_invest::agents::{Financials, MarketSnapshot, NewsItem, StaticMarketData, builtin_analyzers};
use agent_invest::engine::TraceStatus;
use agent_invest::{AnalysisEngine, AnalysisKind, PipelineConfig, RiskProfile, RiskTolerance};
use std::env;
use std::sync::Arc;

fn demo_snapshot() -> MarketSnapshot {
    MarketSnapshot {
        current_price: 12.4,
        price_history: (0..80)
            .map(|i| 10.0 + f64::from(i) * 0.03 + (f64::from(i) * 0.7).sin() * 0.2)
            .collect(),
        financials: Financials {
            pe_ratio: Some(11.5),
            pb_ratio: Some(0.9),
            roe: Some(0.12),
            debt_ratio: Some(0.52),
            profit_margin: Some(0.21),
            current_ratio: Some(1.1),
        },
        news: vec![
            NewsItem {
                title: "Bank reports steady growth in net interest income".to_string(),
                summary: "Profit rose on improved loan quality".to_string(),
            },
            NewsItem {
                title: "Regulator flags rising property exposure".to_string(),
                summary: "Analysts warn of risk from weak developers".to_string(),
            },
        ],
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    agent_utils::init_tracing();

    let args: Vec<String> = env::args().collect();
    let symbol = args.get(1).map_or("000001", String::as_str);
    let tolerance = match args.get(2).map(String::as_str) {
        Some("conservative") => RiskTolerance::Conservative,
        Some("aggressive") => RiskTolerance::Aggressive,
        _ => RiskTolerance::Moderate,
    };

    println!("=== Investment Analysis ===\n");
    println!("Analyzing: {symbol} ({})\n", tolerance.as_str());

    let config = PipelineConfig::from_env()?;
    println!("Configuration:");
    println!("  - Run deadline: {:?}", config.run_deadline);
    println!("  - Confidence penalty: {}", config.confidence_penalty);
    println!("  - Grace period: {:?}\n", config.grace_period);

    let source = StaticMarketData::new().with_snapshot(symbol, demo_snapshot());
    let engine = AnalysisEngine::new(builtin_analyzers(Arc::new(source)), config)?;

    let run_id = engine.start_analysis(
        symbol,
        AnalysisKind::SUB_ANALYSES,
        RiskProfile::with_tolerance(tolerance),
    )?;
    let state = engine.wait_for_completion(run_id).await?;

    println!("Run {run_id} finished: {}", state.status());
    if let Some(reason) = state.failure() {
        println!("Failure: {reason:?}");
    }

    let Some(recommendation) = state.recommendation() else {
        return Ok(());
    };

    println!("\n=== Recommendation ===");
    println!("{}", recommendation.summary);
    println!("  Action:     {}", recommendation.action.as_str());
    println!("  Confidence: {:.1}", recommendation.confidence);
    if let Some(target) = recommendation.target_price {
        println!("  Target:     {target:.2}");
    }
    if let Some(stop) = recommendation.stop_loss {
        println!("  Stop loss:  {stop:.2}");
    }

    println!("\nReasoning:");
    for entry in &recommendation.reasoning {
        let status = match &entry.status {
            TraceStatus::Contributed => "contributed".to_string(),
            TraceStatus::Failed { error } => format!("failed ({error:?})"),
            TraceStatus::Skipped => "skipped".to_string(),
            TraceStatus::NotRequested => "not requested".to_string(),
        };
        let score = entry
            .score
            .map_or_else(|| "-".to_string(), |s| format!("{s:.1}"));
        println!("  {:<20} {:<16} score {score}", entry.kind.as_str(), status);
    }

    Ok(())
}
