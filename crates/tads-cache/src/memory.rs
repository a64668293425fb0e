use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use tads_models::MarketSnapshot;

/// In-memory hot cache of decoded market snapshots, backed by moka.
///
/// Entries are evicted after the TTL so a refreshed SQLite row is picked
/// up without a restart.
pub struct SnapshotMemory {
    inner: Cache<String, Arc<MarketSnapshot>>,
}

impl SnapshotMemory {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub async fn get(&self, key: &str) -> Option<Arc<MarketSnapshot>> {
        self.inner.get(key).await
    }

    pub async fn insert(&self, key: String, snapshot: Arc<MarketSnapshot>) {
        self.inner.insert(key, snapshot).await;
    }

    pub async fn invalidate(&self, key: &str) {
        self.inner.invalidate(key).await;
    }
}
