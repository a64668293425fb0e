pub mod actions;
pub mod aggregator;
pub mod error;
pub mod metrics;
pub mod source;

pub use actions::{barrier_proximity, recommend_action, Alignment};
pub use aggregator::{assess, distinct_symbols, RiskAggregator};
pub use error::RiskError;
pub use source::{MarketDataSource, StaticSource};
