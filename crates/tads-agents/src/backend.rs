use async_trait::async_trait;

use crate::error::AgentError;

/// One stateless generation call. Conversation context travels inside `prompt`.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub model: String,
    /// Ask the backend to ground the answer with web search.
    pub grounding: bool,
    /// JSON schema the answer must conform to.
    pub schema: Option<serde_json::Value>,
}

impl GenerationRequest {
    pub fn new(model: &str, prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.to_string(),
            grounding: false,
            schema: None,
        }
    }

    pub fn grounded(mut self) -> Self {
        self.grounding = true;
        self
    }

    pub fn with_schema(mut self, schema: serde_json::Value) -> Self {
        self.schema = Some(schema);
        self
    }
}

/// Backend output normalised to a single shape.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationResult {
    pub text: String,
    pub finish_reason: Option<String>,
    /// Whether search grounding was actually applied.
    pub grounded: bool,
    /// Whether the backend itself enforced the request schema.
    pub schema_enforced: bool,
}

impl GenerationResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            finish_reason: None,
            grounded: false,
            schema_enforced: false,
        }
    }
}

/// Text-generation service. Mockable for testing.
///
/// Implementations report an explicit rate-limit signal as
/// `AgentError::RateLimited` and never retry on their own.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult, AgentError>;
}
