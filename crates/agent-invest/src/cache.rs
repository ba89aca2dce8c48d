//! Time-bounded cache of collected market snapshots

use cached::{Cached, TimedCache};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::agents::MarketSnapshot;

/// How long a collected snapshot stays fresh
pub const DEFAULT_SNAPSHOT_TTL: Duration = Duration::from_secs(30 * 60);

/// Thread-safe, clonable snapshot cache keyed by symbol
///
/// Clones share the same underlying storage.
#[derive(Clone)]
pub struct SnapshotCache {
    entries: Arc<RwLock<TimedCache<String, MarketSnapshot>>>,
}

impl SnapshotCache {
    /// Create a new cache with the given time-to-live
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(TimedCache::with_lifespan(ttl))),
        }
    }

    fn key(symbol: &str) -> String {
        symbol.trim().to_uppercase()
    }

    /// Get a fresh snapshot, if any
    pub async fn get(&self, symbol: &str) -> Option<MarketSnapshot> {
        let mut entries = self.entries.write().await;
        entries.cache_get(&Self::key(symbol)).cloned()
    }

    pub async fn insert(&self, symbol: &str, snapshot: MarketSnapshot) {
        let mut entries = self.entries.write().await;
        let _ = entries.cache_set(Self::key(symbol), snapshot);
    }

    /// Return the cached snapshot or fetch and store a new one
    ///
    /// Fetch errors are returned as-is and nothing is cached.
    pub async fn get_or_fetch<F, Fut, E>(&self, symbol: &str, fetch: F) -> Result<MarketSnapshot, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<MarketSnapshot, E>>,
    {
        if let Some(snapshot) = self.get(symbol).await {
            tracing::debug!(symbol, "Snapshot cache hit");
            return Ok(snapshot);
        }

        tracing::debug!(symbol, "Snapshot cache miss");
        let snapshot = fetch().await?;
        self.insert(symbol, snapshot.clone()).await;
        Ok(snapshot)
    }

    /// Drop the snapshot for a symbol
    pub async fn invalidate(&self, symbol: &str) {
        let mut entries = self.entries.write().await;
        let _ = entries.cache_remove(&Self::key(symbol));
    }

    pub async fn clear(&self) {
        let mut entries = self.entries.write().await;
        entries.cache_clear();
    }

    pub async fn len(&self) -> usize {
        let entries = self.entries.read().await;
        entries.cache_size()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for SnapshotCache {
    fn default() -> Self {
        Self::new(DEFAULT_SNAPSHOT_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(price: f64) -> MarketSnapshot {
        MarketSnapshot {
            current_price: price,
            ..MarketSnapshot::default()
        }
    }

    #[tokio::test]
    async fn test_insert_and_get_normalizes_symbol() {
        let cache = SnapshotCache::default();
        cache.insert("aapl", snapshot(150.0)).await;

        let hit = cache.get(" AAPL ").await.unwrap();
        assert!((hit.current_price - 150.0).abs() < f64::EPSILON);
        assert!(cache.get("MSFT").await.is_none());
    }

    #[tokio::test]
    async fn test_get_or_fetch_only_fetches_once() {
        let cache = SnapshotCache::default();
        let mut calls = 0;

        let first = cache
            .get_or_fetch("000001", || {
                calls += 1;
                async { Ok::<_, String>(snapshot(12.5)) }
            })
            .await
            .unwrap();
        let second = cache
            .get_or_fetch("000001", || {
                calls += 1;
                async { Ok::<_, String>(snapshot(99.0)) }
            })
            .await
            .unwrap();

        assert_eq!(calls, 1);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_fetch_errors_are_not_cached() {
        let cache = SnapshotCache::default();

        let result = cache
            .get_or_fetch("000001", || async { Err::<MarketSnapshot, _>("offline") })
            .await;
        assert!(result.is_err());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_invalidate_and_clear() {
        let cache = SnapshotCache::default();
        cache.insert("AAPL", snapshot(1.0)).await;
        cache.insert("MSFT", snapshot(2.0)).await;
        assert_eq!(cache.len().await, 2);

        cache.invalidate("AAPL").await;
        assert!(cache.get("AAPL").await.is_none());

        cache.clear().await;
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_clones_share_storage() {
        let cache = SnapshotCache::default();
        let clone = cache.clone();
        clone.insert("AAPL", snapshot(3.0)).await;
        assert!(cache.get("AAPL").await.is_some());
    }
}
