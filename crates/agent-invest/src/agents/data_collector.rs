//! Data collection analyzer and the market data it gathers

use agent_core::{Analyzer, CancellationToken, Error, Payload, Result, payload::keys};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::{ensure_active, fields};
use crate::cache::SnapshotCache;

/// Key financial ratios; any of them may be unknown
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Financials {
    pub pe_ratio: Option<f64>,
    pub pb_ratio: Option<f64>,
    /// Return on equity as a fraction
    pub roe: Option<f64>,
    /// Liabilities over assets
    pub debt_ratio: Option<f64>,
    /// Net margin as a fraction
    pub profit_margin: Option<f64>,
    pub current_ratio: Option<f64>,
}

/// A news headline with its summary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    #[serde(default)]
    pub summary: String,
}

/// Everything downstream analyzers need about one symbol
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub current_price: f64,
    /// Closing prices, oldest first
    #[serde(default)]
    pub price_history: Vec<f64>,
    #[serde(default)]
    pub financials: Financials,
    #[serde(default)]
    pub news: Vec<NewsItem>,
}

impl MarketSnapshot {
    /// Payload form of the snapshot
    pub fn to_payload(&self) -> Payload {
        Payload::new()
            .with(keys::CURRENT_PRICE, serde_json::json!(self.current_price))
            .with(fields::PRICE_HISTORY, serde_json::json!(self.price_history))
            .with(
                fields::FINANCIALS,
                serde_json::to_value(&self.financials).unwrap_or_default(),
            )
            .with(
                fields::NEWS,
                serde_json::to_value(&self.news).unwrap_or_default(),
            )
    }

    /// Read a snapshot back from a `data_collection` output
    pub fn from_payload(payload: &Payload) -> Result<Self> {
        Ok(Self {
            current_price: payload.require_f64(keys::CURRENT_PRICE)?,
            price_history: payload.get_typed(fields::PRICE_HISTORY)?.unwrap_or_default(),
            financials: payload.get_typed(fields::FINANCIALS)?.unwrap_or_default(),
            news: payload.get_typed(fields::NEWS)?.unwrap_or_default(),
        })
    }
}

/// Provider of market data for a symbol
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn fetch(&self, symbol: &str) -> Result<MarketSnapshot>;

    fn name(&self) -> &str;
}

/// In-memory market data, keyed by symbol
#[derive(Debug, Clone, Default)]
pub struct StaticMarketData {
    snapshots: HashMap<String, MarketSnapshot>,
}

impl StaticMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(mut self, symbol: impl Into<String>, snapshot: MarketSnapshot) -> Self {
        self.snapshots
            .insert(symbol.into().trim().to_uppercase(), snapshot);
        self
    }
}

#[async_trait]
impl MarketDataSource for StaticMarketData {
    async fn fetch(&self, symbol: &str) -> Result<MarketSnapshot> {
        self.snapshots
            .get(&symbol.trim().to_uppercase())
            .cloned()
            .ok_or_else(|| Error::ProcessingFailed(format!("no market data for {symbol}")))
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// Collects the base market snapshot for a symbol
///
/// Snapshots are cached per symbol, so runs for the same stock within the
/// cache lifetime see the same data.
pub struct DataCollector {
    source: Arc<dyn MarketDataSource>,
    cache: SnapshotCache,
}

impl DataCollector {
    pub fn new(source: Arc<dyn MarketDataSource>) -> Self {
        Self::with_cache(source, SnapshotCache::default())
    }

    pub fn with_cache(source: Arc<dyn MarketDataSource>, cache: SnapshotCache) -> Self {
        Self { source, cache }
    }

    fn validate(snapshot: &MarketSnapshot, symbol: &str) -> Result<()> {
        if !snapshot.current_price.is_finite() || snapshot.current_price <= 0.0 {
            return Err(Error::ProcessingFailed(format!(
                "invalid current price {} for {symbol}",
                snapshot.current_price
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Analyzer for DataCollector {
    async fn analyze(&self, input: Payload, cancel: CancellationToken) -> Result<Payload> {
        let symbol = input.require_str(keys::SYMBOL)?.to_string();
        ensure_active(&cancel)?;

        // only valid snapshots reach the cache
        let fetch = self.cache.get_or_fetch(&symbol, || async {
            let snapshot = self.source.fetch(&symbol).await?;
            Self::validate(&snapshot, &symbol)?;
            Ok::<_, Error>(snapshot)
        });
        let snapshot = tokio::select! {
            () = cancel.cancelled() => return Err(Error::Cancelled),
            snapshot = fetch => snapshot?,
        };

        debug!(
            symbol = %symbol,
            prices = snapshot.price_history.len(),
            news = snapshot.news.len(),
            "Collected market snapshot"
        );
        info!(symbol = %symbol, source = self.source.name(), "Data collection complete");

        Ok(snapshot
            .to_payload()
            .with_symbol(symbol)
            .with(fields::SOURCE, serde_json::json!(self.source.name())))
    }

    fn name(&self) -> &str {
        "data_collector"
    }
}
