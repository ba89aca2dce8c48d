//! Lexicon-based news sentiment

use agent_core::{Analyzer, CancellationToken, Payload, Result};
use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use super::{NewsItem, ensure_active, fields, market_snapshot, round2};

const POSITIVE: &[&str] = &[
    "beat", "beats", "breakthrough", "bullish", "buy", "exceeds", "gain", "gains", "growth",
    "improved", "improves", "optimistic", "outperform", "profit", "profits", "rally", "record",
    "recovery", "rise", "rises", "strong", "surge", "surges", "upgrade",
];

const NEGATIVE: &[&str] = &[
    "bearish", "concern", "concerns", "crisis", "cut", "cuts", "decline", "declines", "downgrade",
    "drop", "drops", "fall", "falls", "investigation", "lawsuit", "loss", "losses", "miss",
    "misses", "plunge", "plunges", "risk", "risks", "sell", "warning", "weak",
];

const MODIFIERS: &[(&str, f64)] = &[
    ("extremely", 1.5),
    ("very", 1.5),
    ("highly", 1.3),
    ("significantly", 1.3),
    ("quite", 1.2),
    ("somewhat", 0.8),
    ("slightly", 0.7),
    ("marginally", 0.6),
];

const TITLE_WEIGHT: f64 = 0.6;
const BODY_WEIGHT: f64 = 0.4;

/// Scores news tone from a word lexicon
///
/// Each text scores the sum of its sentiment words (scaled by a preceding
/// intensity modifier) over `min(word count, 10)`, clamped to [-1, 1]. An
/// item blends title and summary 60/40. Items scoring exactly zero are
/// ignored, and the mean over the rest maps onto 0-100. Without any scored
/// items the result is a neutral 50.
#[derive(Debug, Clone)]
pub struct SentimentAnalyzer {
    positive: HashSet<&'static str>,
    negative: HashSet<&'static str>,
    modifiers: HashMap<&'static str, f64>,
}

impl Default for SentimentAnalyzer {
    fn default() -> Self {
        Self {
            positive: POSITIVE.iter().copied().collect(),
            negative: NEGATIVE.iter().copied().collect(),
            modifiers: MODIFIERS.iter().copied().collect(),
        }
    }
}

impl SentimentAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tone of one text in [-1, 1]
    pub fn text_score(&self, text: &str) -> f64 {
        let words: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .collect();
        if words.is_empty() {
            return 0.0;
        }

        let mut total = 0.0;
        for (i, word) in words.iter().enumerate() {
            let intensity = i
                .checked_sub(1)
                .and_then(|prev| self.modifiers.get(words[prev].as_str()))
                .copied()
                .unwrap_or(1.0);

            if self.positive.contains(word.as_str()) {
                total += intensity;
            } else if self.negative.contains(word.as_str()) {
                total -= intensity;
            }
        }

        (total / words.len().min(10) as f64).clamp(-1.0, 1.0)
    }

    /// Blended tone of a news item in [-1, 1]
    pub fn item_score(&self, item: &NewsItem) -> f64 {
        self.text_score(&item.title) * TITLE_WEIGHT + self.text_score(&item.summary) * BODY_WEIGHT
    }

    /// Overall 0-100 score and the number of non-neutral items
    pub fn overall(&self, news: &[NewsItem]) -> (f64, usize) {
        let scored: Vec<f64> = news
            .iter()
            .map(|item| self.item_score(item))
            .filter(|s| *s != 0.0)
            .collect();
        if scored.is_empty() {
            return (50.0, 0);
        }

        let mean = scored.iter().sum::<f64>() / scored.len() as f64;
        (((mean + 1.0) * 50.0).round().clamp(0.0, 100.0), scored.len())
    }
}

#[async_trait]
impl Analyzer for SentimentAnalyzer {
    async fn analyze(&self, input: Payload, cancel: CancellationToken) -> Result<Payload> {
        ensure_active(&cancel)?;
        let snapshot = market_snapshot(&input)?;

        let item_scores: Vec<f64> = snapshot
            .news
            .iter()
            .map(|item| round2(self.item_score(item)))
            .collect();
        ensure_active(&cancel)?;

        let (score, scored) = self.overall(&snapshot.news);
        let positive = item_scores.iter().filter(|s| **s > 0.1).count();
        let negative = item_scores.iter().filter(|s| **s < -0.1).count();
        debug!(score, news = snapshot.news.len(), scored, "Sentiment analysis complete");

        Ok(Payload::new()
            .with_score(score)
            .with("news_count", json!(snapshot.news.len()))
            .with("scored_count", json!(scored))
            .with("positive_count", json!(positive))
            .with("negative_count", json!(negative))
            .with("item_scores", json!(item_scores))
            .with(
                fields::SUMMARY,
                json!(format!(
                    "sentiment score {score}/100 from {scored} of {} news items",
                    snapshot.news.len()
                )),
            ))
    }

    fn name(&self) -> &str {
        "sentiment_analyzer"
    }
}
