//! Backend trait and the networked backend implementations.
//!
//! Backends:
//!   RemoteCliBackend — external inference CLI, invoked as `<program> -p <prompt>`
//!   OllamaBackend    — local Ollama `/api/generate`, non-streaming
//!
//! The offline responder that terminates every routing chain lives in
//! `crate::fallback`.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, instrument};

// ── Error ─────────────────────────────────────────────────────────────────────

/// Failure tags a backend can report. The router only ever looks at the tag.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("Rate limit reached")]
    RateLimited,
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
    #[error("Backend timed out after {0:?}")]
    Timeout(Duration),
    #[error("Malformed backend payload: {0}")]
    Malformed(String),
}

impl BackendError {
    pub fn kind(&self) -> &'static str {
        match self {
            BackendError::RateLimited    => "rate_limited",
            BackendError::Unavailable(_) => "unavailable",
            BackendError::Timeout(_)     => "timeout",
            BackendError::Malformed(_)   => "malformed",
        }
    }
}

/// Tagged outcome of one backend invocation: `Ok` is the success tag.
pub type BackendResult = Result<String, BackendError>;

// ── Request ───────────────────────────────────────────────────────────────────

/// Assistant persona and domain context prepended to every prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    pub name: String,
    pub role: String,
    pub context: String,
}

impl Default for Persona {
    fn default() -> Self {
        Self {
            name: "JARVIS".to_string(),
            role: "the AI assistant for MATHIS OS".to_string(),
            context: "MATHIS OS is a custom operating system written in the Mathis programming language.\n\
                      \n\
                      Context about MATHIS:\n\
                      - Mathis is a stack-based assembly language with AI annotations\n\
                      - Files use .masm extension\n\
                      - Compiles to .mbc bytecode\n\
                      - Kernel runs on x86 bare metal\n\
                      - Current features: shell, keyboard, Mini VM"
                .to_string(),
        }
    }
}

impl Persona {
    /// `You are <name>, <role>.` followed by the domain context.
    pub fn preamble(&self) -> String {
        format!("You are {}, {}.\n{}", self.name, self.role, self.context)
    }
}

/// A prompt bound to its persona. Fields are private so a request cannot
/// change once built.
#[derive(Debug, Clone)]
pub struct BackendRequest {
    persona: Arc<Persona>,
    prompt: String,
    context: Option<String>,
}

impl BackendRequest {
    pub fn new(persona: Arc<Persona>, prompt: impl Into<String>) -> Self {
        Self { persona, prompt: prompt.into(), context: None }
    }

    /// Extra instructions for this request only (e.g. a brevity hint).
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        let context = context.into();
        self.context = if context.trim().is_empty() { None } else { Some(context) };
        self
    }

    pub fn prompt(&self) -> &str { &self.prompt }
    pub fn context(&self) -> Option<&str> { self.context.as_deref() }

    /// Long-form rendering used by the remote CLI tier.
    pub fn cli_prompt(&self) -> String {
        format!(
            "{}\n\n{}\n\nUser request: {}\n\nRespond concisely and provide code when asked.",
            self.persona.preamble(),
            self.context.as_deref().unwrap_or(""),
            self.prompt,
        )
    }

    /// Completion-style rendering used by the local service tier.
    pub fn chat_prompt(&self) -> String {
        let mut system = self.persona.preamble();
        if let Some(ctx) = &self.context {
            system.push('\n');
            system.push_str(ctx);
        }
        format!("{}\n\nUser: {}\n\n{}:", system, self.prompt, self.persona.name)
    }
}

// ── Trait ─────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Run one request. Must return within roughly `timeout`; never retries.
    async fn invoke(&self, req: &BackendRequest, timeout: Duration) -> BackendResult;
    fn name(&self) -> &str;
    fn is_local(&self) -> bool;
}

// ── 1. Remote CLI ─────────────────────────────────────────────────────────────

pub const DEFAULT_RATE_LIMIT_MARKERS: [&str; 2] = ["limit reached", "resets"];

pub struct RemoteCliBackend {
    pub program: String,
    /// Arguments placed before `-p <prompt>`.
    pub args: Vec<String>,
    rate_limit_markers: Vec<String>,
}

impl RemoteCliBackend {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            rate_limit_markers: DEFAULT_RATE_LIMIT_MARKERS.iter().map(|m| m.to_string()).collect(),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_rate_limit_markers(mut self, markers: Vec<String>) -> Self {
        self.rate_limit_markers = markers.into_iter().map(|m| m.to_lowercase()).collect();
        self
    }

    fn is_rate_limited(&self, output: &str) -> bool {
        let lower = output.to_lowercase();
        self.rate_limit_markers.iter().any(|m| !m.is_empty() && lower.contains(m.as_str()))
    }
}

#[async_trait]
impl BackendClient for RemoteCliBackend {
    #[instrument(skip(self, req), fields(program = %self.program))]
    async fn invoke(&self, req: &BackendRequest, timeout: Duration) -> BackendResult {
        let child = Command::new(&self.program)
            .args(&self.args)
            .arg("-p")
            .arg(req.cli_prompt())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BackendError::Unavailable(format!("cannot spawn {}: {e}", self.program)))?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Err(_) => return Err(BackendError::Timeout(timeout)),
            Ok(Err(e)) => return Err(BackendError::Unavailable(e.to_string())),
            Ok(Ok(output)) => output,
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if self.is_rate_limited(&stdout) || self.is_rate_limited(&stderr) {
            return Err(BackendError::RateLimited);
        }
        if !output.status.success() {
            let detail = stderr.lines().next().unwrap_or("").trim();
            return Err(BackendError::Unavailable(format!("{} ({})", output.status, detail)));
        }

        let text = stdout.trim();
        if text.is_empty() {
            return Err(BackendError::Malformed("empty output".to_string()));
        }
        debug!(bytes = text.len(), "remote CLI answered");
        Ok(text.to_string())
    }

    fn name(&self) -> &str { "remote_cli" }
    fn is_local(&self) -> bool { false }
}

// ── 2. Ollama (local) ─────────────────────────────────────────────────────────

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434/api/generate";
pub const DEFAULT_OLLAMA_MODEL: &str = "tinyllama";

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

pub struct OllamaBackend {
    pub url: String,
    pub model: String,
    client: reqwest::Client,
}

impl OllamaBackend {
    pub fn new(url: impl Into<String>, model: impl Into<String>) -> Self {
        Self { url: url.into(), model: model.into(), client: reqwest::Client::new() }
    }
}

fn classify_http(err: reqwest::Error, timeout: Duration) -> BackendError {
    if err.is_timeout() {
        BackendError::Timeout(timeout)
    } else {
        BackendError::Unavailable(err.to_string())
    }
}

#[async_trait]
impl BackendClient for OllamaBackend {
    #[instrument(skip(self, req), fields(model = %self.model))]
    async fn invoke(&self, req: &BackendRequest, timeout: Duration) -> BackendResult {
        let body = serde_json::json!({
            "model":  &self.model,
            "prompt": req.chat_prompt(),
            "stream": false,
        });
        let resp = self.client
            .post(&self.url)
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_http(e, timeout))?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(BackendError::RateLimited);
        }
        if !status.is_success() {
            return Err(BackendError::Unavailable(format!("HTTP {status}")));
        }

        let bytes = resp.bytes().await.map_err(|e| classify_http(e, timeout))?;
        let parsed: GenerateResponse = serde_json::from_slice(&bytes)
            .map_err(|e| BackendError::Malformed(e.to_string()))?;

        let text = parsed.response.trim();
        if text.is_empty() {
            return Err(BackendError::Malformed("empty response field".to_string()));
        }
        Ok(text.to_string())
    }

    fn name(&self) -> &str { "ollama" }
    fn is_local(&self) -> bool { true }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::post, Json, Router};

    fn request(prompt: &str) -> BackendRequest {
        BackendRequest::new(Arc::new(Persona::default()), prompt)
    }

    fn sh(script: &str) -> RemoteCliBackend {
        // `sh -c <script> sh -p <prompt>`: the prompt lands in $1/$2 and is ignored.
        RemoteCliBackend::new("sh").with_args(vec!["-c".into(), script.into(), "sh".into()])
    }

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/api/generate")
    }

    #[test]
    fn test_chat_prompt_layout() {
        let req = request("ping").with_context("Be VERY brief.");
        let rendered = req.chat_prompt();
        assert!(rendered.starts_with("You are JARVIS, the AI assistant for MATHIS OS."));
        assert!(rendered.contains("Be VERY brief."));
        assert!(rendered.ends_with("User: ping\n\nJARVIS:"));
    }

    #[test]
    fn test_cli_prompt_layout() {
        let rendered = request("list files").cli_prompt();
        assert!(rendered.contains("Compiles to .mbc bytecode"));
        assert!(rendered.contains("User request: list files"));
        assert!(rendered.ends_with("Respond concisely and provide code when asked."));
    }

    #[test]
    fn test_blank_context_is_dropped() {
        assert!(request("x").with_context("   ").context().is_none());
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(BackendError::RateLimited.kind(), "rate_limited");
        assert_eq!(BackendError::Timeout(Duration::from_secs(1)).kind(), "timeout");
        assert_eq!(BackendError::Malformed("x".into()).kind(), "malformed");
    }

    #[tokio::test]
    async fn test_remote_cli_success_is_trimmed() {
        let b = sh("printf '  hello from the cli \\n\\n'");
        let out = b.invoke(&request("hi"), Duration::from_secs(5)).await;
        assert_eq!(out, Ok("hello from the cli".to_string()));
    }

    #[tokio::test]
    async fn test_remote_cli_rate_limit_marker() {
        let b = sh("echo 'Usage Limit Reached. Resets at 5pm.'");
        let out = b.invoke(&request("hi"), Duration::from_secs(5)).await;
        assert_eq!(out, Err(BackendError::RateLimited));
    }

    #[tokio::test]
    async fn test_remote_cli_nonzero_exit_is_unavailable() {
        let b = sh("echo boom >&2; exit 3");
        let out = b.invoke(&request("hi"), Duration::from_secs(5)).await;
        assert!(matches!(out, Err(BackendError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_remote_cli_missing_program_is_unavailable() {
        let b = RemoteCliBackend::new("/nonexistent/jarvis-cli");
        let out = b.invoke(&request("hi"), Duration::from_secs(5)).await;
        assert!(matches!(out, Err(BackendError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_remote_cli_timeout() {
        let b = sh("sleep 5");
        let limit = Duration::from_millis(100);
        let out = b.invoke(&request("hi"), limit).await;
        assert_eq!(out, Err(BackendError::Timeout(limit)));
    }

    #[tokio::test]
    async fn test_remote_cli_custom_markers() {
        let b = sh("echo 'quota exhausted'").with_rate_limit_markers(vec!["QUOTA".into()]);
        let out = b.invoke(&request("hi"), Duration::from_secs(5)).await;
        assert_eq!(out, Err(BackendError::RateLimited));
    }

    #[tokio::test]
    async fn test_ollama_success_sends_non_streaming_body() {
        let app = Router::new().route(
            "/api/generate",
            post(|Json(body): Json<serde_json::Value>| async move {
                assert_eq!(body["model"], "tinyllama");
                assert_eq!(body["stream"], false);
                assert!(body["prompt"].as_str().unwrap_or("").ends_with("JARVIS:"));
                Json(serde_json::json!({"response": "  Hello guest.  ", "done": true}))
            }),
        );
        let b = OllamaBackend::new(serve(app).await, DEFAULT_OLLAMA_MODEL);
        let out = b.invoke(&request("hello"), Duration::from_secs(5)).await;
        assert_eq!(out, Ok("Hello guest.".to_string()));
    }

    #[tokio::test]
    async fn test_ollama_bad_json_is_malformed() {
        let app = Router::new().route("/api/generate", post(|| async { "definitely not json" }));
        let b = OllamaBackend::new(serve(app).await, DEFAULT_OLLAMA_MODEL);
        let out = b.invoke(&request("hello"), Duration::from_secs(5)).await;
        assert!(matches!(out, Err(BackendError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_ollama_missing_field_is_malformed() {
        let app = Router::new().route(
            "/api/generate",
            post(|| async { Json(serde_json::json!({"done": true})) }),
        );
        let b = OllamaBackend::new(serve(app).await, DEFAULT_OLLAMA_MODEL);
        let out = b.invoke(&request("hello"), Duration::from_secs(5)).await;
        assert!(matches!(out, Err(BackendError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_ollama_refused_is_unavailable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let b = OllamaBackend::new(format!("http://{addr}/api/generate"), DEFAULT_OLLAMA_MODEL);
        let out = b.invoke(&request("hello"), Duration::from_secs(5)).await;
        assert!(matches!(out, Err(BackendError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_ollama_slow_server_times_out() {
        let app = Router::new().route(
            "/api/generate",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(serde_json::json!({"response": "late"}))
            }),
        );
        let b = OllamaBackend::new(serve(app).await, DEFAULT_OLLAMA_MODEL);
        let limit = Duration::from_millis(200);
        let out = b.invoke(&request("hello"), limit).await;
        assert_eq!(out, Err(BackendError::Timeout(limit)));
    }

    #[test]
    fn test_ollama_is_local() {
        let b = OllamaBackend::new(DEFAULT_OLLAMA_URL, "llama3:8b");
        assert!(b.is_local());
        assert!(!RemoteCliBackend::new("claude").is_local());
    }
}
