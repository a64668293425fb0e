use serde::{Deserialize, Serialize};

use crate::risk_report::RiskProfile;
use crate::signal::Language;

/// Top-level configuration for TADS.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TadsConfig {
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub portfolio: PortfolioConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Gemini,
    ClaudeCli,
}

/// Configuration for the text-generation client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InferenceConfig {
    pub backend: BackendKind,
    /// Model for data gathering and debate turns.
    pub flash_model: String,
    /// Model for both judgments.
    pub pro_model: String,
    pub base_url: String,
    /// Environment variable holding one or more comma-separated API keys.
    pub api_key_env: String,
    pub key_cooldown_seconds: u64,
    /// Total attempts per call when the backend signals a rate limit.
    pub max_retries: u32,
    /// Delay before retry `n` is `backoff_base_ms * n`.
    pub backoff_base_ms: u64,
    pub timeout_seconds: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Gemini,
            flash_model: "gemini-3-flash-preview".to_string(),
            pro_model: "gemini-3-pro-preview".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta/models".to_string(),
            api_key_env: "GOOGLE_API_KEY".to_string(),
            key_cooldown_seconds: 60,
            max_retries: 3,
            backoff_base_ms: 5_000,
            timeout_seconds: 120,
        }
    }
}

/// Configuration for one deliberation run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Bull/bear exchanges before the directional judgment. At least 1.
    pub debate_rounds: u32,
    /// Bound on concurrent calls during GATHER and RISK_DEBATE.
    pub max_parallel_calls: usize,
    pub default_language: Language,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            debate_rounds: 2,
            max_parallel_calls: 3,
            default_language: Language::En,
        }
    }
}

impl PipelineConfig {
    pub fn effective_rounds(&self) -> u32 {
        self.debate_rounds.max(1)
    }
}

/// Configuration for multi-symbol runs and portfolio assessment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PortfolioConfig {
    pub max_concurrent_runs: usize,
    /// Pause between two pipeline launches.
    pub launch_stagger_ms: u64,
    pub risk_profile: RiskProfile,
    pub fetch_concurrency: usize,
    pub earnings_window_days: i64,
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        Self {
            max_concurrent_runs: 3,
            launch_stagger_ms: 2_000,
            risk_profile: RiskProfile::Moderate,
            fetch_concurrency: 4,
            earnings_window_days: 14,
        }
    }
}

/// Configuration for the snapshot/position store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    pub sqlite_path: String,
    /// Maximum number of snapshots held in memory.
    pub memory_max_capacity: u64,
    pub memory_ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            sqlite_path: "data/tads.db".to_string(),
            memory_max_capacity: 1_000,
            memory_ttl_seconds: 300,
        }
    }
}
