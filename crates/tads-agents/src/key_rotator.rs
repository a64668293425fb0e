use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::AgentError;

/// Round-robin API key selection with per-key cooldowns.
///
/// Owned by whoever builds the backend and passed in as a dependency.
pub struct KeyRotator {
    keys: Vec<String>,
    cooldown: Duration,
    state: Mutex<RotatorState>,
}

struct RotatorState {
    next: usize,
    cooling_until: Vec<Option<Instant>>,
}

impl KeyRotator {
    pub fn new(keys: Vec<String>, cooldown: Duration) -> Result<Self, AgentError> {
        let keys: Vec<String> = keys
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        if keys.is_empty() {
            return Err(AgentError::Config("no API keys configured".to_string()));
        }
        let state = RotatorState {
            next: 0,
            cooling_until: vec![None; keys.len()],
        };
        Ok(Self {
            keys,
            cooldown,
            state: Mutex::new(state),
        })
    }

    /// Read comma-separated keys from the environment variable `var`.
    pub fn from_env(var: &str, cooldown: Duration) -> Result<Self, AgentError> {
        let raw = std::env::var(var)
            .map_err(|_| AgentError::Config(format!("environment variable {var} is not set")))?;
        Self::new(raw.split(',').map(str::to_string).collect(), cooldown)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RotatorState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The next key, in round-robin order, that is not cooling down.
    pub fn next_key(&self) -> Result<String, AgentError> {
        let now = Instant::now();
        let mut state = self.lock();
        let count = self.keys.len();
        for offset in 0..count {
            let idx = (state.next + offset) % count;
            let available = match state.cooling_until[idx] {
                Some(until) => until <= now,
                None => true,
            };
            if available {
                state.cooling_until[idx] = None;
                state.next = (idx + 1) % count;
                debug!(key_index = idx, "Selected API key");
                return Ok(self.keys[idx].clone());
            }
        }
        Err(AgentError::AllKeysCoolingDown)
    }

    /// Start the cooldown for `key` after it hit a rate limit.
    pub fn mark_rate_limited(&self, key: &str) {
        let Some(idx) = self.keys.iter().position(|k| k == key) else {
            return;
        };
        let mut state = self.lock();
        state.cooling_until[idx] = Some(Instant::now() + self.cooldown);
        warn!(key_index = idx, cooldown_s = self.cooldown.as_secs(), "API key cooling down");
    }
}
