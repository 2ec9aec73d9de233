//! The node operations the upload protocols depend on.

use crate::error::{UploadError, UploadResult};
use crate::receipt::UploadReceipt;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Chunk session information returned by the node.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Upload ID.
    pub id: String,
    /// Smallest accepted chunk size.
    pub min: u64,
    /// Largest accepted chunk size.
    pub max: u64,
    /// Chunk size fixed for an existing session.
    #[serde(default)]
    pub size: Option<u64>,
    /// Already-accepted `[offset, size]` pairs; offsets are decimal strings.
    #[serde(default)]
    pub chunks: Vec<(String, u64)>,
}

impl SessionInfo {
    /// The presence list, sorted by offset.
    pub fn presence(&self) -> UploadResult<Vec<PresenceRange>> {
        let mut ranges = self
            .chunks
            .iter()
            .map(|(offset, size)| {
                let offset = offset.parse::<u64>().map_err(|e| {
                    UploadError::InvalidResponse(format!("invalid chunk offset {offset:?}: {e}"))
                })?;
                Ok(PresenceRange {
                    offset,
                    size: *size,
                })
            })
            .collect::<UploadResult<Vec<_>>>()?;
        ranges.sort_by_key(|r| r.offset);
        Ok(ranges)
    }
}

/// A byte range the node already holds for a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PresenceRange {
    pub offset: u64,
    pub size: u64,
}

impl PresenceRange {
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.size)
    }
}

/// Result of posting a complete envelope in one request.
#[derive(Clone, Debug)]
pub enum ItemPostOutcome {
    /// The node accepted the envelope and issued a receipt.
    Accepted(UploadReceipt),
    /// The node already had this envelope.
    AlreadyReceived,
}

/// Node operations used by the uploaders.
///
/// Implementations map HTTP statuses onto [`UploadError`]: `402` is
/// `InsufficientFunds`, a `404` on session lookup is `SessionExpired`,
/// finalize failures are `Reconstruction`, other failures are `Http`.
#[async_trait]
pub trait BundlerTransport: Send + Sync {
    /// Allocate a new chunk session.
    async fn create_session(&self, token: &str) -> UploadResult<SessionInfo>;

    /// Fetch an existing session, including its presence list.
    async fn session_info(&self, token: &str, upload_id: &str) -> UploadResult<SessionInfo>;

    /// Upload one chunk at `offset`.
    async fn post_chunk(
        &self,
        token: &str,
        upload_id: &str,
        offset: u64,
        chunk: Bytes,
    ) -> UploadResult<()>;

    /// Ask the node to reconstruct the envelope from its chunks.
    async fn finalize(&self, token: &str, upload_id: &str) -> UploadResult<UploadReceipt>;

    /// Post a complete signed envelope.
    async fn post_item(&self, token: &str, item: Bytes) -> UploadResult<ItemPostOutcome>;
}
