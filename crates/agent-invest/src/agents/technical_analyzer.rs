//! Technical analysis over the closing price history

use agent_core::{Analyzer, CancellationToken, Error, Payload, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use ta::{
    Next,
    indicators::{
        BollingerBands, ExponentialMovingAverage, RelativeStrengthIndex, SimpleMovingAverage,
    },
};
use tracing::debug;

use super::{ensure_active, fields, market_snapshot, round2};

/// Fewest closes needed for MACD and its signal line to settle
pub const MIN_HISTORY: usize = 35;

const RSI_PERIOD: usize = 14;
const BOLLINGER_PERIOD: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Bullish,
    Bearish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendStrength {
    Weak,
    Moderate,
    Strong,
}

/// Moving-average alignment across short, medium and long windows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Formation {
    Bullish,
    Bearish,
    Mixed,
}

fn indicator_err(e: impl std::fmt::Display) -> Error {
    Error::ProcessingFailed(format!("indicator setup failed: {e}"))
}

/// Latest indicator values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Indicators {
    pub rsi: f64,
    pub macd: f64,
    pub macd_signal: f64,
    pub ma_5: f64,
    pub ma_20: f64,
    /// Only known with at least 60 closes
    pub ma_60: Option<f64>,
    pub bollinger_middle: f64,
}

impl Indicators {
    /// Compute every indicator over `closes`, oldest first
    pub fn compute(closes: &[f64]) -> Result<Self> {
        if closes.len() < MIN_HISTORY {
            return Err(Error::ProcessingFailed(format!(
                "need at least {MIN_HISTORY} closes, got {}",
                closes.len()
            )));
        }

        let mut rsi = RelativeStrengthIndex::new(RSI_PERIOD).map_err(indicator_err)?;
        let mut ema12 = ExponentialMovingAverage::new(12).map_err(indicator_err)?;
        let mut ema26 = ExponentialMovingAverage::new(26).map_err(indicator_err)?;
        let mut signal = ExponentialMovingAverage::new(9).map_err(indicator_err)?;
        let mut ma_5 = SimpleMovingAverage::new(5).map_err(indicator_err)?;
        let mut ma_20 = SimpleMovingAverage::new(20).map_err(indicator_err)?;
        let mut ma_60 = SimpleMovingAverage::new(60).map_err(indicator_err)?;
        let mut bands = BollingerBands::new(BOLLINGER_PERIOD, 2.0).map_err(indicator_err)?;

        let mut latest = Self {
            rsi: 50.0,
            macd: 0.0,
            macd_signal: 0.0,
            ma_5: 0.0,
            ma_20: 0.0,
            ma_60: None,
            bollinger_middle: 0.0,
        };
        for &close in closes {
            latest.rsi = rsi.next(close);
            latest.macd = ema12.next(close) - ema26.next(close);
            latest.macd_signal = signal.next(latest.macd);
            latest.ma_5 = ma_5.next(close);
            latest.ma_20 = ma_20.next(close);
            latest.ma_60 = Some(ma_60.next(close));
            latest.bollinger_middle = bands.next(close).average;
        }
        if closes.len() < 60 {
            latest.ma_60 = None;
        }

        Ok(latest)
    }

    pub fn trend(&self, price: f64) -> (TrendDirection, TrendStrength) {
        let direction = if self.ma_5 > self.ma_20 {
            TrendDirection::Bullish
        } else {
            TrendDirection::Bearish
        };

        let deviation = if self.bollinger_middle > 0.0 {
            (price - self.bollinger_middle).abs() / self.bollinger_middle
        } else {
            0.0
        };
        let strength = if deviation > 0.05 {
            TrendStrength::Strong
        } else if deviation > 0.02 {
            TrendStrength::Moderate
        } else {
            TrendStrength::Weak
        };

        (direction, strength)
    }

    pub fn formation(&self) -> Formation {
        match self.ma_60 {
            Some(ma_60) if self.ma_5 > self.ma_20 && self.ma_20 > ma_60 => Formation::Bullish,
            Some(ma_60) if self.ma_5 < self.ma_20 && self.ma_20 < ma_60 => Formation::Bearish,
            _ => Formation::Mixed,
        }
    }
}

/// Scores momentum and trend from RSI, MACD and moving averages
///
/// Starts at 50. Oversold RSI adds 20, a neutral RSI adds 10 and overbought
/// RSI takes 20 away; MACD above its signal adds 15, otherwise subtracts 15;
/// the trend adds or subtracts 10, plus 5 when strong; a clean moving
/// average formation adds or subtracts another 10.
#[derive(Debug, Clone, Default)]
pub struct TechnicalAnalyzer;

impl TechnicalAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn score(
        indicators: &Indicators,
        trend: (TrendDirection, TrendStrength),
        formation: Formation,
    ) -> f64 {
        let mut score: f64 = 50.0;

        score += if indicators.rsi < 30.0 {
            20.0
        } else if indicators.rsi > 70.0 {
            -20.0
        } else {
            10.0
        };

        score += if indicators.macd > indicators.macd_signal {
            15.0
        } else {
            -15.0
        };

        let strong = trend.1 == TrendStrength::Strong;
        score += match trend.0 {
            TrendDirection::Bullish if strong => 15.0,
            TrendDirection::Bullish => 10.0,
            TrendDirection::Bearish if strong => -15.0,
            TrendDirection::Bearish => -10.0,
        };

        score += match formation {
            Formation::Bullish => 10.0,
            Formation::Bearish => -10.0,
            Formation::Mixed => 0.0,
        };

        score.clamp(0.0, 100.0)
    }
}

#[async_trait]
impl Analyzer for TechnicalAnalyzer {
    async fn analyze(&self, input: Payload, cancel: CancellationToken) -> Result<Payload> {
        ensure_active(&cancel)?;
        let snapshot = market_snapshot(&input)?;

        let indicators = Indicators::compute(&snapshot.price_history)?;
        ensure_active(&cancel)?;

        let price = snapshot
            .price_history
            .last()
            .copied()
            .unwrap_or(snapshot.current_price);
        let trend = indicators.trend(price);
        let formation = indicators.formation();
        let score = Self::score(&indicators, trend, formation);
        debug!(score, rsi = indicators.rsi, "Technical analysis complete");

        let summary = format!(
            "technical score {score}/100, RSI {:.1}, {:?} trend",
            indicators.rsi, trend.0
        );
        Ok(Payload::new()
            .with_score(score)
            .with(
                "indicators",
                json!({
                    "rsi": round2(indicators.rsi),
                    "macd": indicators.macd,
                    "macd_signal": indicators.macd_signal,
                    "ma_5": round2(indicators.ma_5),
                    "ma_20": round2(indicators.ma_20),
                    "ma_60": indicators.ma_60.map(round2),
                }),
            )
            .with(
                "trend",
                json!({ "direction": trend.0, "strength": trend.1 }),
            )
            .with("formation", json!(formation))
            .with(fields::SUMMARY, json!(summary)))
    }

    fn name(&self) -> &str {
        "technical_analyzer"
    }
}
