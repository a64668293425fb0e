use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tads_models::cache_schema::key_patterns;
use tads_models::{MarketSnapshot, Position};
use tracing::debug;

use crate::error::CacheError;
use crate::memory::SnapshotMemory;
use crate::sqlite::SqliteStore;

/// Snapshot reads go moka (hot) → SQLite → None, promoting SQLite hits.
/// Position reads and writes go straight to SQLite.
///
/// SQLite access is synchronized via `Mutex` since `rusqlite::Connection` is not `Sync`.
pub struct CacheStore {
    memory: SnapshotMemory,
    sqlite: Mutex<SqliteStore>,
}

impl CacheStore {
    pub fn new(sqlite: SqliteStore, max_capacity: u64, memory_ttl: Duration) -> Self {
        Self {
            memory: SnapshotMemory::new(max_capacity, memory_ttl),
            sqlite: Mutex::new(sqlite),
        }
    }

    fn sqlite(&self) -> Result<MutexGuard<'_, SqliteStore>, CacheError> {
        self.sqlite
            .lock()
            .map_err(|e| CacheError::Unavailable(format!("SQLite mutex poisoned: {e}")))
    }

    pub async fn snapshot(&self, symbol: &str) -> Result<Option<Arc<MarketSnapshot>>, CacheError> {
        let key = key_patterns::snapshot(symbol);
        if let Some(hit) = self.memory.get(&key).await {
            return Ok(Some(hit));
        }

        let row = self.sqlite()?.get_snapshot(symbol)?;
        let Some(row) = row else {
            debug!(symbol, "No snapshot in store");
            return Ok(None);
        };

        let snapshot: Arc<MarketSnapshot> = Arc::new(serde_json::from_str(&row.snapshot_json)?);
        self.memory.insert(key, Arc::clone(&snapshot)).await;
        Ok(Some(snapshot))
    }

    /// Persist a snapshot and drop any stale hot copy.
    pub async fn put_snapshot(
        &self,
        snapshot: &MarketSnapshot,
        source: &str,
        ttl: chrono::Duration,
    ) -> Result<(), CacheError> {
        self.sqlite()?.put_snapshot(snapshot, source, ttl)?;
        self.memory
            .invalidate(&key_patterns::snapshot(&snapshot.symbol))
            .await;
        Ok(())
    }

    pub fn upsert_position(&self, owner: &str, position: &Position) -> Result<(), CacheError> {
        self.sqlite()?.upsert_position(owner, position)
    }

    pub fn positions(&self, owner: &str) -> Result<Vec<Position>, CacheError> {
        self.sqlite()?.list_positions(owner)
    }

    pub fn remove_position(&self, owner: &str, symbol: &str) -> Result<bool, CacheError> {
        self.sqlite()?.remove_position(owner, symbol)
    }

    pub fn clear_positions(&self, owner: &str) -> Result<usize, CacheError> {
        self.sqlite()?.clear_positions(owner)
    }
}
