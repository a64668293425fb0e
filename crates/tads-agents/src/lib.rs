pub mod backend;
pub mod claude_cli;
pub mod client;
pub mod error;
pub mod extract;
pub mod gemini;
pub mod key_rotator;
pub mod orchestrator;
pub mod prompts;
pub mod strategy;

pub mod test_support;

pub use backend::{GenerationRequest, GenerationResult, InferenceBackend};
pub use claude_cli::ClaudeCliBackend;
pub use client::{InferenceClient, RetryPolicy};
pub use error::{AgentError, ExtractionFailure};
pub use extract::{extract_decision, parse_direction_verdict};
pub use gemini::GeminiBackend;
pub use key_rotator::KeyRotator;
pub use orchestrator::{finalize_decision, Orchestrator, RunOptions};
pub use strategy::compute_tiers;
