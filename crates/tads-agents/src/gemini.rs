//! Gemini `generateContent` backend over HTTPS.
//!
//! Uses a long-lived reqwest::Client for connection pooling and an injected
//! [`KeyRotator`] for quota management.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::backend::{GenerationRequest, GenerationResult, InferenceBackend};
use crate::error::AgentError;
use crate::key_rotator::KeyRotator;

pub struct GeminiBackend {
    client: Client,
    base_url: String,
    keys: Arc<KeyRotator>,
    timeout: Duration,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: String,
    response_schema: serde_json::Value,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Content,
    #[serde(default)]
    finish_reason: Option<String>,
    #[serde(default)]
    grounding_metadata: Option<serde_json::Value>,
}

impl GeminiBackend {
    pub fn new(base_url: &str, keys: Arc<KeyRotator>, timeout: Duration) -> Result<Self, AgentError> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(timeout)
            .build()
            .map_err(|e| AgentError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            keys,
            timeout,
        })
    }

    fn url(&self, model: &str) -> String {
        format!("{}/{model}:generateContent", self.base_url)
    }
}

fn build_body(request: &GenerationRequest) -> GeminiRequest {
    GeminiRequest {
        contents: vec![Content {
            role: Some("user".to_string()),
            parts: vec![Part {
                text: Some(request.prompt.clone()),
            }],
        }],
        tools: request
            .grounding
            .then(|| vec![serde_json::json!({ "google_search": {} })]),
        generation_config: request.schema.as_ref().map(|schema| GenerationConfig {
            response_mime_type: "application/json".to_string(),
            response_schema: schema.clone(),
        }),
    }
}

/// Map a non-success HTTP status to the error taxonomy.
fn classify_status(status: u16, body: &str) -> AgentError {
    if status == 429 || body.contains("RESOURCE_EXHAUSTED") {
        return AgentError::RateLimited { attempts: 1 };
    }
    if matches!(status, 500 | 502 | 503 | 504) {
        return AgentError::Unavailable { status };
    }
    let snippet: String = body.chars().take(300).collect();
    AgentError::Upstream(format!("HTTP {status}: {snippet}"))
}

/// Collapse candidates and parts into one result.
fn normalize(response: GeminiResponse, request: &GenerationRequest) -> Result<GenerationResult, AgentError> {
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or(AgentError::EmptyResponse)?;

    let text: String = candidate
        .content
        .parts
        .into_iter()
        .filter_map(|p| p.text)
        .collect::<Vec<_>>()
        .join("");

    if text.trim().is_empty() {
        return Err(AgentError::EmptyResponse);
    }

    Ok(GenerationResult {
        text,
        finish_reason: candidate.finish_reason,
        grounded: request.grounding && candidate.grounding_metadata.is_some(),
        schema_enforced: request.schema.is_some(),
    })
}

#[async_trait]
impl InferenceBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult, AgentError> {
        let key = self.keys.next_key()?;
        debug!(model = %request.model, grounding = request.grounding, schema = request.schema.is_some(), "Calling Gemini");

        let response = self
            .client
            .post(self.url(&request.model))
            .header("x-goog-api-key", &key)
            .json(&build_body(request))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AgentError::Timeout(self.timeout.as_secs())
                } else {
                    AgentError::Transport(e.without_url().to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = classify_status(status.as_u16(), &body);
            if matches!(err, AgentError::RateLimited { .. }) {
                self.keys.mark_rate_limited(&key);
            } else {
                warn!(status = status.as_u16(), "Gemini request failed");
            }
            return Err(err);
        }

        let parsed: GeminiResponse = response
            .json()
            .await
            .map_err(|e| AgentError::Transport(format!("invalid Gemini response body: {}", e.without_url())))?;
        normalize(parsed, request)
    }
}
