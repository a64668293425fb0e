use tads_models::StateError;
use thiserror::Error;

/// Every recovery strategy failed to produce a decision record.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("no decision record recoverable from {input_len} bytes (tried: {tried})", tried = .attempted.join(", "))]
pub struct ExtractionFailure {
    pub attempted: Vec<&'static str>,
    pub input_len: usize,
    /// Parse error from the last strategy that found JSON at all.
    pub last_error: Option<String>,
}

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Rate limited after {attempts} attempt(s)")]
    RateLimited { attempts: u32 },

    #[error("Upstream failure: {0}")]
    Upstream(String),

    #[error("Service unavailable (HTTP {status})")]
    Unavailable { status: u16 },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Inference timed out after {0} seconds")]
    Timeout(u64),

    #[error("Backend returned an empty response")]
    EmptyResponse,

    #[error(transparent)]
    Extraction(#[from] ExtractionFailure),

    #[error("All API keys are cooling down")]
    AllKeysCoolingDown,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Deliberation state error: {0}")]
    State(#[from] StateError),
}

impl AgentError {
    /// Failures that only degrade context quality. Anything else aborts the run.
    pub fn is_absorbable(&self) -> bool {
        !matches!(
            self,
            AgentError::Upstream(_) | AgentError::Config(_) | AgentError::State(_)
        )
    }
}
