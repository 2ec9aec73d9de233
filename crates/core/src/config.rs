//! Client configuration types.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bundler client configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Node base URL (e.g., "https://node1.example.com").
    #[serde(default = "default_url")]
    pub url: String,
    /// Upload lane name used in request paths.
    #[serde(default = "default_token")]
    pub token: String,
    /// Chunk size in bytes for chunked uploads.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
    /// Maximum number of chunk uploads in flight at once.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Payloads at or above this size are always chunked.
    #[serde(default = "default_chunking_threshold")]
    pub chunking_threshold: u64,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Multiplier applied to the request timeout for session finalization,
    /// which reconstructs the whole envelope on the node.
    #[serde(default = "default_finalize_timeout_factor")]
    pub finalize_timeout_factor: u32,
    /// Signature type code the node signs receipts with.
    #[serde(default = "default_receipt_signature_type")]
    pub receipt_signature_type: u16,
    /// Retry policy for transient HTTP failures.
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Retry policy configuration.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,
    /// Upper bound on any retry delay, in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_url() -> String {
    "https://node1.bundlr.network".to_string()
}

fn default_token() -> String {
    "arweave".to_string()
}

fn default_chunk_size() -> u64 {
    crate::DEFAULT_CHUNK_SIZE
}

fn default_batch_size() -> usize {
    5
}

fn default_chunking_threshold() -> u64 {
    crate::CHUNKING_THRESHOLD
}

fn default_timeout_secs() -> u64 {
    40
}

fn default_finalize_timeout_factor() -> u32 {
    10
}

fn default_receipt_signature_type() -> u16 {
    crate::SignatureType::Arweave.code()
}

fn default_retries() -> u32 {
    3
}

fn default_min_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    10_000
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            token: default_token(),
            chunk_size: default_chunk_size(),
            batch_size: default_batch_size(),
            chunking_threshold: default_chunking_threshold(),
            timeout_secs: default_timeout_secs(),
            finalize_timeout_factor: default_finalize_timeout_factor(),
            receipt_signature_type: default_receipt_signature_type(),
            retry: RetryConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retries: default_retries(),
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl ClientConfig {
    /// Validate configuration invariants.
    pub fn validate(&self) -> crate::Result<()> {
        if self.chunk_size == 0 {
            return Err(crate::Error::Config("chunk_size must be positive".to_string()));
        }
        if self.batch_size == 0 {
            return Err(crate::Error::Config("batch_size must be positive".to_string()));
        }
        if self.timeout_secs == 0 {
            return Err(crate::Error::Config(
                "timeout_secs must be positive".to_string(),
            ));
        }
        if self.token.is_empty() {
            return Err(crate::Error::Config("token must not be empty".to_string()));
        }
        self.retry.validate()
    }

    /// Per-request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Timeout for the finalize request.
    pub fn finalize_timeout(&self) -> Duration {
        self.timeout()
            .saturating_mul(self.finalize_timeout_factor.max(1))
    }
}

impl RetryConfig {
    /// Validate the delay bounds.
    pub fn validate(&self) -> crate::Result<()> {
        if self.min_delay_ms > self.max_delay_ms {
            return Err(crate::Error::Config(format!(
                "retry min_delay_ms ({}) exceeds max_delay_ms ({})",
                self.min_delay_ms, self.max_delay_ms
            )));
        }
        Ok(())
    }
}
