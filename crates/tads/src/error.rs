use tads_agents::AgentError;
use tads_cache::CacheError;
use tads_risk::RiskError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TadsError {
    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error(transparent)]
    Risk(#[from] RiskError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("Cancelled before launch")]
    Cancelled,

    #[error("Run task failed: {0}")]
    Task(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl TadsError {
    /// Upstream failures are unrecoverable and must reach the caller.
    pub fn is_upstream(&self) -> bool {
        matches!(self, TadsError::Agent(AgentError::Upstream(_)))
    }
}
