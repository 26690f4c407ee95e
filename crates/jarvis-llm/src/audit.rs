//! Audit records for routed exchanges.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// One backend call made while routing a prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attempt {
    pub backend: String,
    /// `success` or the failure kind (`timeout`, `rate_limited`, ...).
    pub outcome: String,
    pub latency_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeRecord {
    pub id: Uuid,
    /// Backend whose text was returned (`static` when the chain was exhausted).
    pub backend: String,
    pub attempts: Vec<Attempt>,
    pub prompt_bytes: usize,
    pub output_bytes: usize,
    pub output_hash: String,
    pub completed_at: chrono::DateTime<Utc>,
}

impl ExchangeRecord {
    pub fn new(backend: String, attempts: Vec<Attempt>, prompt: &str, output: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(output.as_bytes());
        let output_hash = format!("{:x}", hasher.finalize());

        Self {
            id: Uuid::new_v4(),
            backend,
            attempts,
            prompt_bytes: prompt.len(),
            output_bytes: output.len(),
            output_hash,
            completed_at: Utc::now(),
        }
    }

    pub fn fell_back(&self) -> bool {
        self.attempts.iter().all(|a| a.outcome != "success")
    }
}
