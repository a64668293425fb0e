use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::backend::{GenerationRequest, GenerationResult, InferenceBackend};
use crate::error::AgentError;

/// Backend that shells out to the `claude` CLI.
///
/// The CLI has no search grounding and no schema enforcement: grounding
/// requests are answered ungrounded and a schema is appended to the prompt.
pub struct ClaudeCliBackend {
    pub program: String,
    pub timeout: Duration,
}

impl Default for ClaudeCliBackend {
    fn default() -> Self {
        Self {
            program: "claude".to_string(),
            timeout: Duration::from_secs(120),
        }
    }
}

impl ClaudeCliBackend {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    /// Check if the configured CLI program is on the system and responds.
    pub async fn is_available(&self) -> bool {
        match Command::new(&self.program)
            .arg("--version")
            .kill_on_drop(true)
            .output()
            .await
        {
            Ok(output) => output.status.success(),
            Err(_) => false,
        }
    }
}

fn prompt_with_schema(request: &GenerationRequest) -> String {
    match &request.schema {
        Some(schema) => format!(
            "{}\n\nRespond with a single JSON object conforming to this JSON schema and nothing else:\n{}",
            request.prompt,
            serde_json::to_string_pretty(schema).unwrap_or_default()
        ),
        None => request.prompt.clone(),
    }
}

fn looks_rate_limited(stderr: &str) -> bool {
    let lower = stderr.to_ascii_lowercase();
    lower.contains("rate limit") || lower.contains("429") || lower.contains("overloaded")
}

#[async_trait]
impl InferenceBackend for ClaudeCliBackend {
    fn name(&self) -> &str {
        "claude_cli"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult, AgentError> {
        if request.grounding {
            debug!("Grounding not supported by claude CLI; answering ungrounded");
        }
        debug!(model = %request.model, "Invoking claude CLI");

        let prompt = prompt_with_schema(request);
        let result = tokio::time::timeout(self.timeout, async {
            Command::new(&self.program)
                .args([
                    "-p",
                    prompt.as_str(),
                    "--model",
                    request.model.as_str(),
                    "--output-format",
                    "text",
                ])
                .kill_on_drop(true)
                .output()
                .await
        })
        .await
        .map_err(|_| AgentError::Timeout(self.timeout.as_secs()))?
        .map_err(|e| AgentError::Upstream(format!("Failed to spawn {}: {e}", self.program)))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            warn!(status = %result.status, stderr = %stderr, "Claude CLI failed");
            if looks_rate_limited(&stderr) {
                return Err(AgentError::RateLimited { attempts: 1 });
            }
            return Err(AgentError::Transport(format!(
                "{} exited {}: {}",
                self.program, result.status, stderr
            )));
        }

        let stdout = String::from_utf8_lossy(&result.stdout).to_string();
        if stdout.trim().is_empty() {
            return Err(AgentError::EmptyResponse);
        }

        Ok(GenerationResult::text(stdout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_backend() {
        let backend = ClaudeCliBackend::default();
        assert_eq!(backend.program, "claude");
        assert_eq!(backend.timeout, Duration::from_secs(120));
    }

    #[test]
    fn schema_is_appended_to_prompt() {
        let request = GenerationRequest::new("m", "Decide.")
            .with_schema(serde_json::json!({"type": "object"}));
        let prompt = prompt_with_schema(&request);
        assert!(prompt.starts_with("Decide.\n\n"));
        assert!(prompt.contains("\"type\": \"object\""));

        assert_eq!(prompt_with_schema(&GenerationRequest::new("m", "Hi")), "Hi");
    }

    #[test]
    fn rate_limit_detection() {
        assert!(looks_rate_limited("Error: Rate limit reached"));
        assert!(looks_rate_limited("HTTP 429"));
        assert!(!looks_rate_limited("invalid model"));
    }

    #[tokio::test]
    async fn missing_program_is_upstream_failure() {
        let backend = ClaudeCliBackend {
            program: "definitely-not-a-real-binary-tads".to_string(),
            timeout: Duration::from_secs(5),
        };
        let err = backend
            .generate(&GenerationRequest::new("m", "hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Upstream(_)));
        assert!(!backend.is_available().await);
    }

    #[cfg(target_os = "linux")]
    fn write_script(dir: &std::path::Path, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("fake-claude");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[cfg(target_os = "linux")]
    fn is_gone(pid: &str) -> bool {
        match std::fs::read_to_string(format!("/proc/{pid}/status")) {
            Ok(status) => status
                .lines()
                .any(|l| l.starts_with("State:") && (l.contains('Z') || l.contains('X'))),
            Err(_) => true,
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn timed_out_child_is_killed() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("pid");
        let program = write_script(
            dir.path(),
            &format!("echo $$ > {}\nexec sleep 30", pid_file.display()),
        );
        let backend = ClaudeCliBackend {
            program,
            timeout: Duration::from_millis(500),
        };

        let err = backend
            .generate(&GenerationRequest::new("m", "hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Timeout(_)));

        let pid = std::fs::read_to_string(&pid_file).unwrap().trim().to_string();
        let mut gone = false;
        for _ in 0..40 {
            if is_gone(&pid) {
                gone = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(gone, "child {pid} still running after timeout");
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn availability_uses_configured_program() {
        let dir = tempfile::tempdir().unwrap();
        let backend = ClaudeCliBackend {
            program: write_script(dir.path(), "exit 0"),
            timeout: Duration::from_secs(5),
        };
        assert!(backend.is_available().await);
    }
}
