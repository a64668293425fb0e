//! Test support: a scripted inference backend.
//!
//! `ScriptedBackend` recognises which role a prompt belongs to from its
//! first line and answers from a per-role script, so the whole
//! deliberation can run without network access. Every request is
//! recorded for later inspection.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tads_models::PipelineConfig;

use crate::backend::{GenerationRequest, GenerationResult, InferenceBackend};
use crate::client::{InferenceClient, RetryPolicy};
use crate::error::AgentError;
use crate::orchestrator::Orchestrator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptRole {
    Price,
    EurRate,
    Technical,
    News,
    Fundamentals,
    Bull,
    Bear,
    DirectionJudge,
    Risky,
    Safe,
    Neutral,
    RiskJudge,
    MinimalJudge,
}

impl ScriptRole {
    /// Identify the role from the prompt's opening line.
    pub fn classify(prompt: &str) -> Option<Self> {
        let first = prompt.lines().next().unwrap_or_default();
        let table = [
            ("Search for the current price", ScriptRole::Price),
            ("EUR/USD exchange rate", ScriptRole::EurRate),
            ("Search for technical analysis", ScriptRole::Technical),
            ("Search for the latest news", ScriptRole::News),
            ("Search for fundamental data", ScriptRole::Fundamentals),
            ("Search for market context", ScriptRole::Fundamentals),
            ("BULLISH analyst", ScriptRole::Bull),
            ("BEARISH analyst", ScriptRole::Bear),
            ("INVESTMENT JUDGE", ScriptRole::DirectionJudge),
            ("AGGRESSIVE risk analyst", ScriptRole::Risky),
            ("CONSERVATIVE risk analyst", ScriptRole::Safe),
            ("NEUTRAL risk analyst", ScriptRole::Neutral),
            ("FINAL RISK JUDGE", ScriptRole::RiskJudge),
            ("Return ONLY one JSON object for", ScriptRole::MinimalJudge),
        ];
        table
            .iter()
            .find(|(needle, _)| first.contains(needle))
            .map(|(_, role)| *role)
    }
}

/// One scripted answer.
#[derive(Clone)]
pub enum Reply {
    Text(String),
    Fail(fn() -> AgentError),
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Reply::Text(text.into())
    }
}

/// A decision record as the risk judge would return it.
pub fn decision_json(signal: &str, confidence: f64) -> String {
    serde_json::json!({
        "signal": signal,
        "confidence": confidence,
        "unable_to_assess": false,
        "price_usd": 100.0,
        "strategies": {
            "conservative": {"ko_level": 80.0, "distance_pct": 20.0, "risk": "low"},
            "moderate": {"ko_level": 88.0, "distance_pct": 12.0, "risk": "medium"},
            "aggressive": {"ko_level": 93.0, "distance_pct": 7.0, "risk": "high"}
        },
        "support_zones": [{"level": 95.0, "description": "prior breakout"}],
        "resistance_zones": [{"level": 110.0, "description": "all-time high"}],
        "timeframes": {"short_term": "HOLD", "medium_term": signal, "long_term": signal},
        "detailed_analysis": "Bulls had the stronger evidence."
    })
    .to_string()
}

fn default_reply(role: ScriptRole) -> Reply {
    let text = match role {
        ScriptRole::Price => r#"{"price_usd": 100.0, "asset_name": "Apple Inc.", "source": "test"}"#.to_string(),
        ScriptRole::EurRate => r#"{"rate": 1.25}"#.to_string(),
        ScriptRole::Technical => "RSI 55, price above the 200-day average.".to_string(),
        ScriptRole::News => "No major news.".to_string(),
        ScriptRole::Fundamentals => "P/E 28, margins stable.".to_string(),
        ScriptRole::Bull => "Momentum and earnings support a rise.".to_string(),
        ScriptRole::Bear => "Valuation is stretched.".to_string(),
        ScriptRole::DirectionJudge => "The bulls were stronger.\nRECOMMENDATION: **LONG**".to_string(),
        ScriptRole::Risky => "Use a 6% barrier.".to_string(),
        ScriptRole::Safe => "Use a 20% barrier.".to_string(),
        ScriptRole::Neutral => "Use a 12% barrier.".to_string(),
        ScriptRole::RiskJudge | ScriptRole::MinimalJudge => decision_json("LONG", 0.8),
    };
    Reply::Text(text)
}

#[derive(Default)]
struct Script {
    replies: HashMap<ScriptRole, Vec<Reply>>,
    calls: HashMap<ScriptRole, usize>,
    requests: Vec<GenerationRequest>,
}

/// Mock backend answering by role. The n-th call for a role gets the n-th
/// scripted reply; the last reply repeats once the script runs out.
pub struct ScriptedBackend {
    script: Mutex<Script>,
    enforce_schema: bool,
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedBackend {
    /// Every role answers with a plausible default; the run ends LONG at 0.8.
    pub fn new() -> Self {
        Self {
            script: Mutex::new(Script::default()),
            enforce_schema: true,
        }
    }

    pub fn with(self, role: ScriptRole, reply: Reply) -> Self {
        self.with_sequence(role, vec![reply])
    }

    pub fn with_sequence(self, role: ScriptRole, replies: Vec<Reply>) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.replies.insert(role, replies);
        }
        self
    }

    /// Behave like a backend without native schema support.
    pub fn without_schema_enforcement(mut self) -> Self {
        self.enforce_schema = false;
        self
    }

    pub fn calls(&self, role: ScriptRole) -> usize {
        self.script
            .lock()
            .map(|s| s.calls.get(&role).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.script.lock().map(|s| s.requests.clone()).unwrap_or_default()
    }

    /// Recorded requests for one role, in call order.
    pub fn requests_for(&self, role: ScriptRole) -> Vec<GenerationRequest> {
        self.requests()
            .into_iter()
            .filter(|r| ScriptRole::classify(&r.prompt) == Some(role))
            .collect()
    }
}

#[async_trait]
impl InferenceBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult, AgentError> {
        let role = ScriptRole::classify(&request.prompt)
            .ok_or_else(|| AgentError::Config(format!("unscripted prompt: {:.60}", request.prompt)))?;

        let reply = {
            let mut script = self
                .script
                .lock()
                .map_err(|_| AgentError::Config("script lock poisoned".into()))?;
            script.requests.push(request.clone());
            let n = {
                let count = script.calls.entry(role).or_insert(0);
                *count += 1;
                *count - 1
            };
            match script.replies.get(&role) {
                Some(replies) if !replies.is_empty() => replies[n.min(replies.len() - 1)].clone(),
                _ => default_reply(role),
            }
        };

        match reply {
            Reply::Text(text) => Ok(GenerationResult {
                text,
                finish_reason: Some("STOP".to_string()),
                grounded: request.grounding,
                schema_enforced: self.enforce_schema && request.schema.is_some(),
            }),
            Reply::Fail(failure) => Err(failure()),
        }
    }
}

/// Client over `backend` with millisecond backoff.
pub fn scripted_client(backend: Arc<ScriptedBackend>) -> InferenceClient {
    InferenceClient::new(
        backend,
        RetryPolicy {
            max_attempts: 3,
            backoff_base: Duration::from_millis(1),
        },
        "flash-test",
        "pro-test",
    )
}

pub fn scripted_orchestrator(backend: Arc<ScriptedBackend>, config: PipelineConfig) -> Orchestrator {
    Orchestrator::new(scripted_client(backend), config)
}
