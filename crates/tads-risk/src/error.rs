use tads_cache::CacheError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RiskError {
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Market data unavailable for {symbol}: {reason}")]
    MarketData { symbol: String, reason: String },

    #[error("Portfolio has no positions with a non-zero value")]
    EmptyPortfolio,
}
