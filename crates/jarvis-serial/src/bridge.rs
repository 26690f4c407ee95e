//! Bridge loop: serial frames in, routed and normalized replies out.
//!
//! One request is in flight at a time. The loop does not read the next
//! frame before the current reply is written, which matches the guest's
//! half-duplex command/response behaviour.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use jarvis_llm::{BackendRouter, Normalizer};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::transport::{FrameTransport, DEFAULT_POLL_SLICE};

pub const BRIDGE_HINT: &str = "Be VERY brief (1-2 sentences max).";

#[derive(Debug, Clone)]
pub struct BridgeSettings {
    /// Upper bound on each readiness wait; also bounds shutdown latency
    /// while idle.
    pub poll_slice: Duration,
    pub normalizer: Normalizer,
    /// Per-request context added for serial traffic.
    pub hint: Option<String>,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            poll_slice: DEFAULT_POLL_SLICE,
            normalizer: Normalizer::default(),
            hint: Some(BRIDGE_HINT.to_string()),
        }
    }
}

/// Counters reported when the loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    pub frames: u64,
    pub discarded: u64,
    pub replies: u64,
}

pub struct BridgeLoop<E> {
    transport: FrameTransport<E>,
    router: Arc<BackendRouter>,
    settings: BridgeSettings,
    stats: BridgeStats,
}

impl<E> BridgeLoop<E>
where
    E: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(transport: FrameTransport<E>, router: Arc<BackendRouter>, settings: BridgeSettings) -> Self {
        Self { transport, router, settings, stats: BridgeStats::default() }
    }

    /// Serve frames until `shutdown` resolves or the transport fails.
    ///
    /// The transport is closed on every exit path before returning. A
    /// transport error is returned to the caller; the loop never retries.
    pub async fn run<S>(mut self, shutdown: S) -> Result<BridgeStats>
    where
        S: Future<Output = ()>,
    {
        let mut shutdown = std::pin::pin!(shutdown);
        let served = self.serve(shutdown.as_mut()).await;
        let closed = self.transport.close().await;

        info!(
            frames = self.stats.frames,
            replies = self.stats.replies,
            discarded = self.stats.discarded,
            "Bridge stopped"
        );
        served?;
        closed?;
        Ok(self.stats)
    }

    async fn serve<S>(&mut self, mut shutdown: Pin<&mut S>) -> Result<()>
    where
        S: Future<Output = ()>,
    {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.as_mut() => {
                    info!("Shutdown requested");
                    return Ok(());
                }
                polled = self.transport.poll(self.settings.poll_slice) => {
                    polled?;
                }
            }

            while let Some(frame) = self.transport.extract_frame() {
                self.stats.frames += 1;
                if frame.is_empty() {
                    debug!("Discarding empty frame");
                    self.stats.discarded += 1;
                    continue;
                }

                info!(frame = frame.text(), "Guest request");
                let reply = tokio::select! {
                    biased;
                    _ = shutdown.as_mut() => {
                        warn!("Shutdown requested while a request was in flight");
                        return Ok(());
                    }
                    reply = self.respond(frame.text()) => reply,
                };

                info!(reply = reply.as_str(), "Bridge reply");
                self.transport.write(&reply).await?;
                self.stats.replies += 1;
            }
        }
    }

    async fn respond(&self, prompt: &str) -> String {
        let mut req = self.router.request(prompt);
        if let Some(hint) = &self.settings.hint {
            req = req.with_context(hint.clone());
        }
        let routed = self.router.route_request(req).await;
        self.settings.normalizer.apply(&routed.text)
    }
}
