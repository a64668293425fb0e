use std::collections::HashMap;

use async_trait::async_trait;
use tads_cache::CacheStore;
use tads_models::MarketSnapshot;

use crate::error::RiskError;

/// Where the aggregator gets sector, beta, close history and earnings
/// dates for a symbol. `Ok(None)` means the source knows nothing about it.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch_snapshot(&self, symbol: &str) -> Result<Option<MarketSnapshot>, RiskError>;
}

#[async_trait]
impl MarketDataSource for CacheStore {
    fn name(&self) -> &str {
        "cache"
    }

    async fn fetch_snapshot(&self, symbol: &str) -> Result<Option<MarketSnapshot>, RiskError> {
        let hit = self.snapshot(symbol).await?;
        Ok(hit.map(|snapshot| (*snapshot).clone()))
    }
}

/// Fixed in-memory snapshots keyed by symbol.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    snapshots: HashMap<String, MarketSnapshot>,
}

impl StaticSource {
    pub fn new(snapshots: impl IntoIterator<Item = MarketSnapshot>) -> Self {
        Self {
            snapshots: snapshots
                .into_iter()
                .map(|s| (s.symbol.clone(), s))
                .collect(),
        }
    }
}

#[async_trait]
impl MarketDataSource for StaticSource {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch_snapshot(&self, symbol: &str) -> Result<Option<MarketSnapshot>, RiskError> {
        Ok(self.snapshots.get(symbol).cloned())
    }
}
