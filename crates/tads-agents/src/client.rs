use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::backend::{GenerationRequest, GenerationResult, InferenceBackend};
use crate::error::AgentError;

/// Bounded retry for rate-limited and temporarily unavailable calls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_millis(5_000),
        }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff_base * attempt
    }
}

/// Retrying front door to an [`InferenceBackend`].
///
/// Only rate-limit signals and 5xx unavailability are retried; every other
/// failure is returned on the first occurrence. The client never inspects the text.
#[derive(Clone)]
pub struct InferenceClient {
    backend: Arc<dyn InferenceBackend>,
    policy: RetryPolicy,
    flash_model: String,
    pro_model: String,
}

impl InferenceClient {
    pub fn new(
        backend: Arc<dyn InferenceBackend>,
        policy: RetryPolicy,
        flash_model: &str,
        pro_model: &str,
    ) -> Self {
        Self {
            backend,
            policy,
            flash_model: flash_model.to_string(),
            pro_model: pro_model.to_string(),
        }
    }

    /// Request against the fast model used for gathering and debate.
    pub fn flash(&self, prompt: impl Into<String>) -> GenerationRequest {
        GenerationRequest::new(&self.flash_model, prompt)
    }

    /// Request against the stronger model used for judgments.
    pub fn pro(&self, prompt: impl Into<String>) -> GenerationRequest {
        GenerationRequest::new(&self.pro_model, prompt)
    }

    pub async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult, AgentError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let start = Instant::now();
            match self.backend.generate(request).await {
                Ok(result) => {
                    debug!(
                        backend = self.backend.name(),
                        model = %request.model,
                        attempt,
                        elapsed_ms = start.elapsed().as_millis(),
                        "Generation succeeded"
                    );
                    return Ok(result);
                }
                Err(AgentError::RateLimited { .. } | AgentError::AllKeysCoolingDown) => {
                    if attempt >= max_attempts {
                        warn!(backend = self.backend.name(), attempts = attempt, "Rate limit retries exhausted");
                        return Err(AgentError::RateLimited { attempts: attempt });
                    }
                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        backend = self.backend.name(),
                        attempt,
                        delay_ms = delay.as_millis(),
                        "Rate limited, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(AgentError::Unavailable { status }) => {
                    if attempt >= max_attempts {
                        warn!(backend = self.backend.name(), attempts = attempt, status, "Service still unavailable");
                        return Err(AgentError::Unavailable { status });
                    }
                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        backend = self.backend.name(),
                        attempt,
                        status,
                        delay_ms = delay.as_millis(),
                        "Service unavailable, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
