//! End-to-end runs of the `tads analyze` binary against a local stand-in
//! for the Gemini endpoint.

use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::process::Command;

const KEY_ENV: &str = "TADS_CLI_TEST_KEY";
const KEY: &str = "SECRETKEY123";

/// Read one HTTP request (headers plus Content-Length body) as text.
async fn read_request(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = stream.read(&mut chunk).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&buf);
        if let Some(end) = text.find("\r\n\r\n") {
            let body_len = text[..end]
                .lines()
                .find_map(|l| {
                    let (name, value) = l.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if buf.len() >= end + 4 + body_len {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Answer every request with `status` and `body`; returns the base URL and
/// the raw requests seen.
async fn serve(status: &'static str, body: &'static str) -> (String, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let log = Arc::clone(&log);
            tokio::spawn(async move {
                let request = read_request(&mut stream).await;
                log.lock().unwrap().push(request);
                let response = format!(
                    "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });
    (format!("http://{addr}/v1beta/models"), seen)
}

fn write_config(dir: &tempfile::TempDir, base_url: &str) -> String {
    let path = dir.path().join("tads.toml");
    let config = format!(
        r#"
[inference]
base_url = "{base_url}"
api_key_env = "{KEY_ENV}"
max_retries = 1
timeout_seconds = 10

[cache]
sqlite_path = "{}"
"#,
        dir.path().join("tads.db").display()
    );
    std::fs::write(&path, config).unwrap();
    path.to_string_lossy().into_owned()
}

#[tokio::test]
async fn upstream_failure_prints_degraded_record() {
    let (base_url, seen) = serve("401 Unauthorized", r#"{"error":{"status":"UNAUTHENTICATED"}}"#).await;
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(&dir, &base_url);

    let output = Command::new(env!("CARGO_BIN_EXE_tads"))
        .args(["--config", &config, "analyze", "AAPL"])
        .env(KEY_ENV, KEY)
        .env("RUST_LOG", "tads=debug,tads_agents=debug")
        .output()
        .await
        .unwrap();

    assert_eq!(output.status.code(), Some(1));

    let stdout = String::from_utf8_lossy(&output.stdout);
    let record: serde_json::Value = serde_json::from_str(stdout.trim()).unwrap();
    assert_eq!(record["signal"], "IGNORE");
    assert_eq!(record["confidence"], 0.0);
    assert_eq!(record["unable_to_assess"], true);
    let reason = record["unable_to_assess_reason"].as_str().unwrap();
    assert!(reason.starts_with("Error: "), "reason: {reason}");
    assert!(reason.contains("401"), "reason: {reason}");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!stdout.contains(KEY));
    assert!(!stderr.contains(KEY));

    // Calls still in flight when the run aborts may close before sending.
    let requests: Vec<String> = seen
        .lock()
        .unwrap()
        .iter()
        .filter(|r| !r.is_empty())
        .cloned()
        .collect();
    assert!(!requests.is_empty());
    for request in &requests {
        let request_line = request.lines().next().unwrap_or_default();
        assert!(!request_line.contains(KEY), "key in URL: {request_line}");
        assert!(request.to_ascii_lowercase().contains("x-goog-api-key: secretkey123"));
    }
}

#[tokio::test]
async fn missing_config_is_an_error_without_record() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.toml");

    let output = Command::new(env!("CARGO_BIN_EXE_tads"))
        .args(["--config", &missing.to_string_lossy(), "analyze", "AAPL"])
        .output()
        .await
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Failed to read config"));
}
