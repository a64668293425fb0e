//! TADS - Trading Adversarial Deliberation System
//!
//! Runs a bull/bear debate and a three-way risk debate over gathered
//! market context, then asks a judge for a structured decision record
//! with knockout-barrier tiers. Portfolios of leveraged positions are
//! assessed against those decisions.
//!
//! # Library Usage
//!
//! ```rust,no_run
//! use tads::models::{DecisionRecord, Language, Position, RiskReport};
//! use tads::agents::{Orchestrator, RunOptions};
//! use tads::risk::RiskAggregator;
//! use tads::models::config::{TadsConfig, PipelineConfig};
//! ```

pub mod batch;
pub mod error;
pub mod portfolio;

pub use tads_agents as agents;
pub use tads_cache as cache;
pub use tads_models as models;
pub use tads_risk as risk;

pub use batch::{BatchJob, BatchOutcome, BatchRunner};
pub use error::TadsError;
pub use portfolio::assess_portfolio;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::NaiveDate;
use tads_agents::{
    AgentError, ClaudeCliBackend, GeminiBackend, InferenceBackend, InferenceClient, KeyRotator, Orchestrator,
    RetryPolicy, RunOptions,
};
use tads_cache::{CacheStore, SqliteStore};
use tads_models::config::{BackendKind, CacheConfig, InferenceConfig, TadsConfig};
use tads_models::{DeliberationState, Language};

pub fn retry_policy(config: &InferenceConfig) -> RetryPolicy {
    RetryPolicy {
        max_attempts: config.max_retries.max(1),
        backoff_base: Duration::from_millis(config.backoff_base_ms),
    }
}

/// Build the configured inference backend. Gemini keys come from the
/// environment variable named in the configuration.
pub fn build_backend(config: &InferenceConfig) -> Result<Arc<dyn InferenceBackend>, anyhow::Error> {
    let timeout = Duration::from_secs(config.timeout_seconds);
    let backend: Arc<dyn InferenceBackend> = match config.backend {
        BackendKind::Gemini => {
            let keys = KeyRotator::from_env(
                &config.api_key_env,
                Duration::from_secs(config.key_cooldown_seconds),
            )?;
            Arc::new(GeminiBackend::new(&config.base_url, Arc::new(keys), timeout)?)
        }
        BackendKind::ClaudeCli => Arc::new(ClaudeCliBackend::new(timeout)),
    };
    Ok(backend)
}

/// Build an Orchestrator from configuration.
pub fn build_orchestrator(config: &TadsConfig) -> Result<Orchestrator, anyhow::Error> {
    let backend = build_backend(&config.inference).context("Failed to build inference backend")?;
    let client = InferenceClient::new(
        backend,
        retry_policy(&config.inference),
        &config.inference.flash_model,
        &config.inference.pro_model,
    );
    Ok(Orchestrator::new(client, config.pipeline.clone()))
}

/// Open the snapshot/position store, creating the database directory if needed.
pub fn build_store(config: &CacheConfig) -> Result<Arc<CacheStore>, anyhow::Error> {
    if let Some(parent) = Path::new(&config.sqlite_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
    }
    let sqlite = SqliteStore::open(&config.sqlite_path)
        .with_context(|| format!("Failed to open cache DB: {}", config.sqlite_path))?;
    Ok(Arc::new(CacheStore::new(
        sqlite,
        config.memory_max_capacity,
        Duration::from_secs(config.memory_ttl_seconds),
    )))
}

/// Deliberate on a single symbol using the given orchestrator.
pub async fn analyze(
    orchestrator: &Orchestrator,
    symbol: &str,
    as_of: NaiveDate,
    language: Language,
    options: RunOptions,
) -> Result<DeliberationState, AgentError> {
    orchestrator.run(symbol, as_of, language, options).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tads_agents::test_support::{scripted_orchestrator, ScriptedBackend};
    use tads_models::{Direction, Phase, PipelineConfig, Position, Signal};

    #[test]
    fn retry_policy_from_config() {
        let config = InferenceConfig {
            max_retries: 5,
            backoff_base_ms: 250,
            ..InferenceConfig::default()
        };
        let policy = retry_policy(&config);
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.delay_for(2), Duration::from_millis(500));

        let zero = InferenceConfig {
            max_retries: 0,
            ..InferenceConfig::default()
        };
        assert_eq!(retry_policy(&zero).max_attempts, 1);
    }

    #[test]
    fn claude_cli_backend_needs_no_key() {
        let mut config = TadsConfig::default();
        config.inference.backend = BackendKind::ClaudeCli;
        let orchestrator = build_orchestrator(&config).unwrap();
        assert_eq!(orchestrator.config().debate_rounds, 2);
    }

    #[test]
    fn gemini_without_key_fails() {
        let mut config = TadsConfig::default();
        config.inference.api_key_env = "TADS_TEST_KEY_THAT_IS_NEVER_SET".to_string();
        let err = build_orchestrator(&config).err().unwrap();
        assert!(format!("{err:#}").contains("TADS_TEST_KEY_THAT_IS_NEVER_SET"));
    }

    #[tokio::test]
    async fn store_creates_nested_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("tads.db");
        let config = CacheConfig {
            sqlite_path: path.to_string_lossy().into_owned(),
            ..CacheConfig::default()
        };

        let store = build_store(&config).unwrap();
        let position = Position::parse("SILVER-LONG-956-4.16-78--15.5").unwrap();
        store.upsert_position("alice", &position).unwrap();
        assert!(path.exists());
        assert_eq!(store.positions("alice").unwrap(), vec![position]);
    }

    #[tokio::test]
    async fn analyze_with_forced_direction() {
        let backend = Arc::new(ScriptedBackend::new());
        let orchestrator = scripted_orchestrator(backend, PipelineConfig::default());
        let options = RunOptions {
            forced_direction: Some(Direction::Long),
            price_hint: Some(100.0),
        };

        let state = analyze(
            &orchestrator,
            "AAPL",
            NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            Language::En,
            options,
        )
        .await
        .unwrap();
        assert_eq!(state.phase(), Phase::Done);
        assert_eq!(state.direction(), Some(Direction::Long));
        assert_eq!(state.decision.unwrap().signal, Signal::Long);
    }
}
