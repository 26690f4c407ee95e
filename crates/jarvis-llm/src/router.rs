//! Backend router — tries each tier of the routing chain in priority order
//! and falls back to the static responder when every tier fails.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::audit::{Attempt, ExchangeRecord};
use crate::backend::{BackendClient, BackendRequest, OllamaBackend, Persona, RemoteCliBackend};
use crate::fallback::StaticResponder;

pub const REMOTE_CLI_TIMEOUT: Duration = Duration::from_secs(60);
pub const LOCAL_SERVICE_TIMEOUT: Duration = Duration::from_secs(30);

/// One entry of the routing chain.
struct Tier {
    backend: Arc<dyn BackendClient>,
    timeout: Duration,
}

/// Text returned by the router together with its audit record.
#[derive(Debug, Clone)]
pub struct Routed {
    pub text: String,
    pub record: ExchangeRecord,
}

/// Routes prompts through an ordered chain of backends.
///
/// The chain is built at startup with `register_backend` and is read-only
/// afterwards; share the router behind an `Arc` between bridge loops.
pub struct BackendRouter {
    chain: Vec<Tier>,
    fallback: StaticResponder,
    persona: Arc<Persona>,
}

impl BackendRouter {
    pub fn new(persona: Persona) -> Self {
        Self {
            chain: Vec::new(),
            fallback: StaticResponder::new(),
            persona: Arc::new(persona),
        }
    }

    /// Append a backend; registration order is priority order.
    pub fn register_backend(&mut self, backend: Arc<dyn BackendClient>, timeout: Duration) {
        self.chain.push(Tier { backend, timeout });
    }

    pub fn registered_backends(&self) -> Vec<&str> {
        self.chain.iter().map(|t| t.backend.name()).collect()
    }

    /// Build a request for `prompt` bound to this router's persona.
    pub fn request(&self, prompt: &str) -> BackendRequest {
        BackendRequest::new(self.persona.clone(), prompt)
    }

    /// Route a prompt and return the first usable text. Never fails.
    pub async fn route(&self, prompt: &str) -> String {
        self.route_request(self.request(prompt)).await.text
    }

    pub async fn route_request(&self, req: BackendRequest) -> Routed {
        let mut attempts = Vec::with_capacity(self.chain.len());

        for tier in &self.chain {
            let name = tier.backend.name();
            let started = Instant::now();
            let outcome = tier.backend.invoke(&req, tier.timeout).await;
            let latency_ms = started.elapsed().as_millis() as u64;

            match outcome {
                Ok(text) => {
                    tracing::info!(
                        backend = name,
                        is_local = tier.backend.is_local(),
                        latency_ms,
                        "LLM request routed"
                    );
                    attempts.push(Attempt { backend: name.to_string(), outcome: "success".to_string(), latency_ms });
                    return self.finish(name.to_string(), attempts, &req, text);
                }
                Err(err) => {
                    tracing::warn!(backend = name, kind = err.kind(), latency_ms, "Backend failed, trying next tier: {err}");
                    attempts.push(Attempt { backend: name.to_string(), outcome: err.kind().to_string(), latency_ms });
                }
            }
        }

        tracing::warn!(
            tried = attempts.len(),
            topic = self.fallback.classify(req.prompt()).as_str(),
            "All backends failed, answering from the static responder"
        );
        let text = self.fallback.respond(req.prompt());
        self.finish(self.fallback.name().to_string(), attempts, &req, text)
    }

    fn finish(&self, backend: String, attempts: Vec<Attempt>, req: &BackendRequest, text: String) -> Routed {
        let record = ExchangeRecord::new(backend, attempts, req.prompt(), &text);
        tracing::debug!(
            id = %record.id,
            backend = %record.backend,
            attempts = record.attempts.len(),
            output_bytes = record.output_bytes,
            output_hash = %record.output_hash,
            "exchange audited"
        );
        Routed { text, record }
    }
}

// ── Construction from configuration ──────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum BackendKind {
    RemoteCli {
        program: String,
        args: Vec<String>,
        rate_limit_markers: Vec<String>,
    },
    Ollama {
        url: String,
        model: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub timeout: Duration,
}

impl BackendConfig {
    pub fn remote_cli(program: impl Into<String>) -> Self {
        Self {
            kind: BackendKind::RemoteCli {
                program: program.into(),
                args: Vec::new(),
                rate_limit_markers: crate::backend::DEFAULT_RATE_LIMIT_MARKERS
                    .iter()
                    .map(|m| m.to_string())
                    .collect(),
            },
            timeout: REMOTE_CLI_TIMEOUT,
        }
    }

    pub fn ollama(url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            kind: BackendKind::Ollama { url: url.into(), model: model.into() },
            timeout: LOCAL_SERVICE_TIMEOUT,
        }
    }
}

/// Build a router whose chain follows the order of `backends`.
pub fn build_router(backends: Vec<BackendConfig>, persona: Persona) -> BackendRouter {
    let mut router = BackendRouter::new(persona);
    for cfg in backends {
        let backend: Arc<dyn BackendClient> = match cfg.kind {
            BackendKind::RemoteCli { program, args, rate_limit_markers } => Arc::new(
                RemoteCliBackend::new(program)
                    .with_args(args)
                    .with_rate_limit_markers(rate_limit_markers),
            ),
            BackendKind::Ollama { url, model } => Arc::new(OllamaBackend::new(url, model)),
        };
        router.register_backend(backend, cfg.timeout);
    }
    router
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendError, BackendResult};
    use crate::fallback::Canned;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        name: &'static str,
        outcome: BackendResult,
        calls: Arc<AtomicUsize>,
        seen_timeout: std::sync::Mutex<Option<Duration>>,
    }

    impl Scripted {
        fn new(name: &'static str, outcome: BackendResult) -> Arc<Self> {
            Arc::new(Self {
                name,
                outcome,
                calls: Arc::new(AtomicUsize::new(0)),
                seen_timeout: std::sync::Mutex::new(None),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl BackendClient for Scripted {
        async fn invoke(&self, _req: &BackendRequest, timeout: Duration) -> BackendResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.seen_timeout.lock().unwrap() = Some(timeout);
            self.outcome.clone()
        }
        fn name(&self) -> &str { self.name }
        fn is_local(&self) -> bool { true }
    }

    fn router_with(tiers: &[Arc<Scripted>]) -> BackendRouter {
        let mut r = BackendRouter::new(Persona::default());
        for t in tiers {
            r.register_backend(t.clone(), Duration::from_secs(1));
        }
        r
    }

    #[tokio::test]
    async fn test_first_success_short_circuits() {
        let a = Scripted::new("a", Ok("x".into()));
        let b = Scripted::new("b", Ok("y".into()));
        let r = router_with(&[a.clone(), b.clone()]);

        assert_eq!(r.route("anything").await, "x");
        assert_eq!(a.calls(), 1);
        assert_eq!(b.calls(), 0);
    }

    #[tokio::test]
    async fn test_timeout_falls_through() {
        let a = Scripted::new("a", Err(BackendError::Timeout(Duration::from_secs(1))));
        let b = Scripted::new("b", Ok("y".into()));
        let r = router_with(&[a.clone(), b.clone()]);

        let routed = r.route_request(r.request("anything")).await;
        assert_eq!(routed.text, "y");
        assert_eq!(routed.record.backend, "b");
        assert_eq!(routed.record.attempts[0].outcome, "timeout");
        assert!(!routed.record.fell_back());
    }

    #[tokio::test]
    async fn test_every_failure_kind_falls_through() {
        let tiers = [
            Scripted::new("a", Err(BackendError::RateLimited)),
            Scripted::new("b", Err(BackendError::Malformed("{".into()))),
            Scripted::new("c", Err(BackendError::Unavailable("refused".into()))),
            Scripted::new("d", Ok("d wins".into())),
        ];
        let r = router_with(&tiers);
        assert_eq!(r.route("q").await, "d wins");
        assert!(tiers.iter().all(|t| t.calls() == 1));
    }

    #[tokio::test]
    async fn test_all_unavailable_uses_static_responder() {
        let a = Scripted::new("a", Err(BackendError::Unavailable("down".into())));
        let b = Scripted::new("b", Err(BackendError::Unavailable("down".into())));
        let r = router_with(&[a, b]);

        let routed = r.route_request(r.request("what is mathis")).await;
        assert_eq!(routed.record.backend, "static");
        assert!(routed.record.fell_back());
        assert_eq!(Some(routed.text.as_str()), Canned::Identity.answer());
    }

    #[tokio::test]
    async fn test_empty_chain_is_still_total() {
        let r = BackendRouter::new(Persona::default());
        let out = r.route("tell me a story").await;
        assert!(out.starts_with("[offline] I understood: tell me a story"));
    }

    #[tokio::test]
    async fn test_tier_timeout_is_passed_through() {
        let a = Scripted::new("a", Ok("x".into()));
        let mut r = BackendRouter::new(Persona::default());
        r.register_backend(a.clone(), REMOTE_CLI_TIMEOUT);
        r.route("q").await;
        assert_eq!(*a.seen_timeout.lock().unwrap(), Some(REMOTE_CLI_TIMEOUT));
    }

    #[test]
    fn test_build_router_keeps_priority_order() {
        let r = build_router(
            vec![
                BackendConfig::remote_cli("claude"),
                BackendConfig::ollama(crate::backend::DEFAULT_OLLAMA_URL, "tinyllama"),
            ],
            Persona::default(),
        );
        assert_eq!(r.registered_backends(), vec!["remote_cli", "ollama"]);
    }

    #[test]
    fn test_default_tier_timeouts() {
        assert_eq!(BackendConfig::remote_cli("claude").timeout, Duration::from_secs(60));
        assert_eq!(BackendConfig::ollama("u", "m").timeout, Duration::from_secs(30));
    }
}
