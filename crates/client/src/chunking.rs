//! Resumable chunked uploads.
//!
//! An envelope is streamed to the node in fixed-size windows at known
//! offsets, with a bounded number of chunk requests in flight. For payloads
//! signed here, the header is prepended to the data stream and the first
//! window (which holds the signature field) is withheld while the payload is
//! deep-hashed alongside the upload. Once the digest is signed the signature
//! is patched into that window, which is posted last, and the node is asked
//! to reconstruct the envelope. A resumed session whose node already holds
//! the head skips it like any other held range.

use crate::error::{UploadError, UploadResult};
use crate::events::{UploadController, UploadEvent};
use crate::receipt::UploadResponse;
use crate::retry::{RetryPolicy, retry};
use crate::stream::{self, DEFAULT_CHANNEL_CAPACITY, StreamReader, Tee};
use crate::transport::{BundlerTransport, PresenceRange, SessionInfo};
use bundler_core::item::{signing_input, write_signature};
use bundler_core::{
    ByteStream, ClientConfig, DataItem, DataItemOptions, DeepHashChunk, Digest, ItemId, deep_hash,
};
use bundler_signer::{Signer, Verifier, sign_digest};
use bytes::{Bytes, BytesMut};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Lifecycle of a chunk session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Unstarted,
    Active,
    Finalizing,
    Done,
    /// Failed mid-session; the upload ID is kept so the upload can resume.
    Aborted,
}

/// What a caller persists to resume an interrupted upload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeData {
    pub token: String,
    pub upload_id: String,
    pub chunk_size: u64,
}

/// The next stretch of the payload to handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Window {
    /// The node already holds this many bytes at the current offset.
    Skip(u64),
    /// Read and post up to this many bytes.
    Read(u64),
}

/// Decide what to do at `offset` given the node's sorted presence list.
///
/// A range already held at `offset` is skipped. A range starting inside the
/// next window shortens it so chunks never overlap held data.
pub(crate) fn plan_window(offset: u64, chunk_size: u64, presence: &[PresenceRange]) -> Window {
    let window_end = offset.saturating_add(chunk_size);
    for range in presence {
        if range.end() <= offset {
            continue;
        }
        if range.offset <= offset {
            return Window::Skip(range.end() - offset);
        }
        if range.offset < window_end {
            return Window::Read(range.offset - offset);
        }
        break;
    }
    Window::Read(chunk_size)
}

struct ChunkOutcome {
    id: u64,
    offset: u64,
    size: u64,
    result: UploadResult<()>,
}

/// Spawned chunk uploads; any still running are aborted when dropped.
struct InFlight(FuturesUnordered<JoinHandle<ChunkOutcome>>);

impl InFlight {
    fn new() -> Self {
        Self(FuturesUnordered::new())
    }

    fn len(&self) -> usize {
        self.0.len()
    }

    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn push(&mut self, upload: impl Future<Output = ChunkOutcome> + Send + 'static) {
        self.0.push(tokio::spawn(upload));
    }

    async fn next(&mut self) -> Option<UploadResult<ChunkOutcome>> {
        self.0.next().await.map(|joined| joined.map_err(UploadError::from))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        for handle in self.0.iter() {
            handle.abort();
        }
    }
}

struct Dispatched {
    head: Option<Bytes>,
    /// Bytes confirmed so far, including skipped ranges.
    uploaded: u64,
    /// Bytes read from the payload stream.
    len: u64,
}

/// A single resumable upload against one node session.
pub struct ChunkingUploader {
    transport: Arc<dyn BundlerTransport>,
    token: String,
    chunk_size: u64,
    batch_size: usize,
    channel_capacity: usize,
    retry: RetryPolicy,
    upload_id: Option<String>,
    state: SessionState,
    controller: UploadController,
    receipt_verifier: Option<Arc<dyn Verifier>>,
    receipt_signature_type: u16,
    response: Option<UploadResponse>,
}

impl ChunkingUploader {
    pub fn new(transport: Arc<dyn BundlerTransport>, token: impl Into<String>) -> Self {
        let config = ClientConfig {
            token: token.into(),
            ..ClientConfig::default()
        };
        Self::from_config(transport, &config)
    }

    pub fn from_config(transport: Arc<dyn BundlerTransport>, config: &ClientConfig) -> Self {
        Self {
            transport,
            token: config.token.clone(),
            chunk_size: config.chunk_size.max(1),
            batch_size: config.batch_size.max(1),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            retry: RetryPolicy::from(&config.retry),
            upload_id: None,
            state: SessionState::Unstarted,
            controller: UploadController::new(),
            receipt_verifier: None,
            receipt_signature_type: config.receipt_signature_type,
            response: None,
        }
    }

    /// Verify receipts from this upload with `verifier`.
    pub fn with_receipt_verifier(mut self, verifier: Arc<dyn Verifier>) -> Self {
        self.receipt_verifier = Some(verifier);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Continue a previous upload instead of creating a new session.
    pub fn with_resume_data(mut self, data: ResumeData) -> UploadResult<Self> {
        if data.token != self.token {
            return Err(UploadError::Validation(format!(
                "resume data is for token {}, uploader uses {}",
                data.token, self.token
            )));
        }
        if data.upload_id.is_empty() {
            return Err(UploadError::Validation("resume data has no upload ID".to_string()));
        }
        self.set_chunk_size(data.chunk_size)?;
        self.upload_id = Some(data.upload_id);
        Ok(self)
    }

    /// Everything needed to resume this upload later, once a session exists.
    pub fn resume_data(&self) -> Option<ResumeData> {
        self.upload_id.as_ref().map(|upload_id| ResumeData {
            token: self.token.clone(),
            upload_id: upload_id.clone(),
            chunk_size: self.chunk_size,
        })
    }

    pub fn set_chunk_size(&mut self, chunk_size: u64) -> UploadResult<()> {
        if chunk_size == 0 {
            return Err(UploadError::Validation("chunk size must be positive".to_string()));
        }
        self.chunk_size = chunk_size;
        Ok(())
    }

    pub fn set_batch_size(&mut self, batch_size: usize) -> UploadResult<()> {
        if batch_size == 0 {
            return Err(UploadError::Validation("batch size must be positive".to_string()));
        }
        self.batch_size = batch_size;
        Ok(())
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn upload_id(&self) -> Option<&str> {
        self.upload_id.as_deref()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// A handle for pausing and observing this upload from another task.
    pub fn controller(&self) -> UploadController {
        self.controller.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UploadEvent> {
        self.controller.subscribe()
    }

    pub fn pause(&self) {
        self.controller.pause();
    }

    pub fn resume(&self) {
        self.controller.resume();
    }

    /// Build, sign and upload an envelope around a streamed payload.
    #[tracing::instrument(skip_all, fields(token = %self.token))]
    pub async fn upload_data(
        &mut self,
        data: ByteStream,
        signer: &dyn Signer,
        opts: &DataItemOptions,
    ) -> UploadResult<UploadResponse> {
        self.check_startable()?;
        let header = DataItem::build_header(signer.signature_type(), signer.public_key(), opts)?;
        if header.header_len() as u64 > self.chunk_size {
            return Err(UploadError::Validation(format!(
                "chunk size {} cannot hold the {}-byte envelope header",
                self.chunk_size,
                header.header_len()
            )));
        }

        let presence = self.acquire_session().await?;

        // A head chunk is only ever posted once signed, so a held one already
        // carries a signature over this payload.
        if let Window::Skip(held) = plan_window(0, self.chunk_size, &presence) {
            if held < header.header_len() as u64 {
                return Err(self.abort(UploadError::Validation(format!(
                    "node holds {held} bytes at offset 0, less than the {}-byte envelope header",
                    header.header_len()
                ))));
            }
            tracing::info!(held, "node already holds the signed head chunk");
            let (pump, reader) = stream::pipe(data, self.channel_capacity);
            let reader = reader.with_prefix(Bytes::copy_from_slice(header.raw()));
            self.transfer_signed(pump, reader, &presence).await?;
            return self.finalize().await;
        }

        let (pump, upload_reader, hash_reader) = stream::tee(data, self.channel_capacity);
        let upload_reader = upload_reader.with_prefix(Bytes::copy_from_slice(header.raw()));
        let hash_input = signing_input(&header, DeepHashChunk::Stream(hash_reader.into_stream()));
        let hashing = async move {
            match deep_hash(hash_input).await {
                Ok(digest) => Ok(Some(digest)),
                Err(bundler_core::Error::Io(err)) => Err(UploadError::Stream(err)),
                Err(err) => Err(err.into()),
            }
        };

        let transferred = self
            .transfer(pump, upload_reader, &presence, true, hashing)
            .await;
        let (dispatched, digest) = match transferred {
            Ok(done) => done,
            Err(err) => return Err(self.abort(err)),
        };
        let (Some(head), Some(digest)) = (dispatched.head, digest) else {
            return Err(self.abort(UploadError::Validation(
                "payload produced no head chunk".to_string(),
            )));
        };

        let signature = match sign_digest(signer, &digest) {
            Ok(signature) => signature,
            Err(err) => return Err(self.abort(err.into())),
        };
        let mut head = BytesMut::from(&head[..]);
        if let Err(err) = write_signature(&mut head, signer.signature_type(), &signature) {
            return Err(self.abort(err.into()));
        }
        let id = ItemId::from_signature(&signature);
        tracing::debug!(%id, len = dispatched.len, "payload signed, posting head chunk");

        let upload_id = self.active_upload_id()?;
        let outcome = self.send_chunk(&upload_id, 0, 0, head.freeze()).await;
        let mut uploaded = dispatched.uploaded;
        if let Err(err) = self.record(outcome, &mut uploaded) {
            return Err(self.abort(err));
        }

        let response = self.finalize().await?;
        if response.id() != id.to_string() {
            tracing::warn!(local = %id, node = response.id(), "node reported a different envelope ID");
        }
        Ok(response)
    }

    /// Upload an already-signed envelope streamed as raw bytes.
    #[tracing::instrument(skip_all, fields(token = %self.token))]
    pub async fn upload_transaction(&mut self, envelope: ByteStream) -> UploadResult<UploadResponse> {
        self.check_startable()?;
        let presence = self.acquire_session().await?;

        let (pump, reader) = stream::pipe(envelope, self.channel_capacity);
        if self.transfer_signed(pump, reader, &presence).await? == 0 {
            return Err(self.abort(UploadError::Validation("envelope is empty".to_string())));
        }
        self.finalize().await
    }

    /// Upload a signed envelope held in memory.
    pub async fn upload_item(&mut self, item: &DataItem) -> UploadResult<UploadResponse> {
        if !item.is_signed() {
            return Err(UploadError::Validation("envelope is not signed".to_string()));
        }
        let piece = usize::try_from(self.chunk_size).unwrap_or(usize::MAX);
        let envelope = stream::stream_from_bytes(Bytes::copy_from_slice(item.raw()), piece);
        self.upload_transaction(envelope).await
    }

    /// Ask the node to reconstruct the envelope.
    ///
    /// Once a session is done, later calls return the same response without
    /// contacting the node.
    #[tracing::instrument(skip_all, fields(upload_id = ?self.upload_id))]
    pub async fn finalize(&mut self) -> UploadResult<UploadResponse> {
        if let Some(response) = &self.response {
            return Ok(response.clone());
        }
        let upload_id = self.active_upload_id()?;
        self.state = SessionState::Finalizing;

        let transport = Arc::clone(&self.transport);
        let token = self.token.clone();
        let result = retry(&self.retry, "finalize", || {
            transport.finalize(&token, &upload_id)
        })
        .await;
        let receipt = match result {
            Ok(receipt) => receipt,
            Err(err) => return Err(self.abort(err)),
        };

        self.state = SessionState::Done;
        tracing::info!(id = %receipt.id, "upload finalized");
        self.controller.emit(UploadEvent::Done {
            id: receipt.id.clone(),
        });
        let response = UploadResponse::new(
            receipt,
            self.receipt_verifier.clone(),
            self.receipt_signature_type,
        );
        self.response = Some(response.clone());
        Ok(response)
    }

    fn check_startable(&self) -> UploadResult<()> {
        if self.state == SessionState::Done {
            return Err(UploadError::Validation(
                "upload already finalized; use a new uploader".to_string(),
            ));
        }
        Ok(())
    }

    fn active_upload_id(&self) -> UploadResult<String> {
        self.upload_id
            .clone()
            .ok_or_else(|| UploadError::Validation("no upload session".to_string()))
    }

    fn abort(&mut self, err: UploadError) -> UploadError {
        self.state = SessionState::Aborted;
        tracing::warn!(upload_id = ?self.upload_id, error = %err, "upload aborted");
        err
    }

    fn check_range(&self, info: &SessionInfo) -> UploadResult<()> {
        if self.chunk_size < info.min || self.chunk_size > info.max {
            return Err(UploadError::ChunkSizeOutOfRange {
                size: self.chunk_size,
                min: info.min,
                max: info.max,
            });
        }
        Ok(())
    }

    /// Create a session, or look up the one being resumed, and return the
    /// ranges the node already holds.
    async fn acquire_session(&mut self) -> UploadResult<Vec<PresenceRange>> {
        let transport = Arc::clone(&self.transport);
        let token = self.token.clone();

        let result = match self.upload_id.clone() {
            None => {
                let info = retry(&self.retry, "session creation", || {
                    transport.create_session(&token)
                })
                .await;
                info.and_then(|info| {
                    self.check_range(&info)?;
                    tracing::info!(upload_id = %info.id, min = info.min, max = info.max, "created upload session");
                    Ok(info)
                })
            }
            Some(upload_id) => {
                let info = retry(&self.retry, "session lookup", || {
                    transport.session_info(&token, &upload_id)
                })
                .await;
                info.and_then(|info| {
                    if let Some(size) = info.size
                        && size != self.chunk_size
                    {
                        return Err(UploadError::ChunkSizeMismatch {
                            upload_id: upload_id.clone(),
                            session: size,
                            configured: self.chunk_size,
                        });
                    }
                    self.check_range(&info)?;
                    tracing::info!(%upload_id, held = info.chunks.len(), "resuming upload session");
                    Ok(info)
                })
            }
        };

        let info = match result {
            Ok(info) => info,
            Err(err) => return Err(self.abort(err)),
        };
        let presence = match info.presence() {
            Ok(presence) => presence,
            Err(err) => return Err(self.abort(err)),
        };
        if self.upload_id.is_none() {
            self.upload_id = Some(info.id);
        }
        self.state = SessionState::Active;
        Ok(presence)
    }

    /// Upload bytes whose head needs no signing, returning how many were read.
    async fn transfer_signed(
        &mut self,
        pump: Tee,
        reader: StreamReader,
        presence: &[PresenceRange],
    ) -> UploadResult<u64> {
        let no_digest = async { Ok::<_, UploadError>(None::<Digest>) };
        let transferred = self.transfer(pump, reader, presence, false, no_digest).await;
        match transferred {
            Ok((dispatched, _)) => Ok(dispatched.len),
            Err(err) => Err(self.abort(err)),
        }
    }

    /// Drive the payload pump, the chunk dispatcher and the hasher together.
    async fn transfer<H>(
        &self,
        pump: Tee,
        reader: StreamReader,
        presence: &[PresenceRange],
        withhold_head: bool,
        hashing: H,
    ) -> UploadResult<(Dispatched, Option<Digest>)>
    where
        H: Future<Output = UploadResult<Option<Digest>>>,
    {
        let upload_id = self.active_upload_id()?;
        let pumping = async move { pump.run().await.map_err(UploadError::Stream) };
        let dispatching = self.dispatch(reader, presence, withhold_head, &upload_id);
        let (_, dispatched, digest) = tokio::try_join!(pumping, dispatching, hashing)?;
        Ok((dispatched, digest))
    }

    async fn dispatch(
        &self,
        mut reader: StreamReader,
        presence: &[PresenceRange],
        withhold_head: bool,
        upload_id: &str,
    ) -> UploadResult<Dispatched> {
        let chunk_size = self.chunk_size;
        let mut in_flight = InFlight::new();
        let mut head = None;
        let mut offset = 0u64;
        let mut next_id = 0u64;
        let mut uploaded = 0u64;

        loop {
            let is_head = withhold_head && offset == 0;
            let window = if is_head {
                Window::Read(chunk_size)
            } else {
                plan_window(offset, chunk_size, presence)
            };

            match window {
                Window::Skip(len) => {
                    let skipped = reader.skip(len).await?;
                    if skipped < len {
                        return Err(UploadError::Validation(format!(
                            "node holds {len} bytes at offset {offset}, past the end of the payload"
                        )));
                    }
                    tracing::debug!(offset, len, "skipping range held by node");
                    offset += len;
                    uploaded += len;
                }
                Window::Read(len) => {
                    let want = usize::try_from(len).unwrap_or(usize::MAX);
                    let chunk = reader.read_up_to(want).await?;
                    if chunk.is_empty() {
                        break;
                    }
                    let size = chunk.len() as u64;
                    let id = next_id;
                    next_id += 1;

                    if is_head {
                        head = Some(chunk);
                    } else {
                        while self.controller.is_paused() {
                            tokio::select! {
                                () = self.controller.resumed() => {}
                                Some(done) = in_flight.next(), if !in_flight.is_empty() => {
                                    self.record(done?, &mut uploaded)?;
                                }
                            }
                        }
                        if in_flight.len() >= self.batch_size
                            && let Some(done) = in_flight.next().await
                        {
                            self.record(done?, &mut uploaded)?;
                        }
                        in_flight.push(self.send_chunk(upload_id, id, offset, chunk));
                    }
                    offset += size;
                }
            }
        }

        while let Some(done) = in_flight.next().await {
            self.record(done?, &mut uploaded)?;
        }
        if let Some(range) = presence.iter().find(|r| r.size > 0 && r.end() > offset) {
            return Err(UploadError::Validation(format!(
                "node holds bytes {}..{} but the payload ends at {offset}",
                range.offset,
                range.end()
            )));
        }
        Ok(Dispatched {
            head,
            uploaded,
            len: offset,
        })
    }

    fn send_chunk(
        &self,
        upload_id: &str,
        id: u64,
        offset: u64,
        chunk: Bytes,
    ) -> impl Future<Output = ChunkOutcome> + Send + use<> {
        let transport = Arc::clone(&self.transport);
        let token = self.token.clone();
        let upload_id = upload_id.to_string();
        let policy = self.retry.clone();
        async move {
            let size = chunk.len() as u64;
            let result = retry(&policy, "chunk upload", || {
                transport.post_chunk(&token, &upload_id, offset, chunk.clone())
            })
            .await;
            ChunkOutcome {
                id,
                offset,
                size,
                result,
            }
        }
    }

    fn record(&self, done: ChunkOutcome, uploaded: &mut u64) -> UploadResult<()> {
        let ChunkOutcome {
            id,
            offset,
            size,
            result,
        } = done;
        match result {
            Ok(()) => {
                *uploaded += size;
                tracing::debug!(id, offset, size, uploaded = *uploaded, "chunk uploaded");
                self.controller.emit(UploadEvent::ChunkUpload {
                    id,
                    offset,
                    size,
                    total_uploaded: *uploaded,
                });
                Ok(())
            }
            Err(err) => {
                tracing::error!(id, offset, error = %err, "chunk upload failed");
                self.controller.emit(UploadEvent::ChunkError {
                    id,
                    offset,
                    error: err.to_string(),
                });
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn held(ranges: &[(u64, u64)]) -> Vec<PresenceRange> {
        ranges
            .iter()
            .map(|&(offset, size)| PresenceRange { offset, size })
            .collect()
    }

    #[test]
    fn test_plan_window_without_presence() {
        assert_eq!(plan_window(0, 250, &[]), Window::Read(250));
        assert_eq!(plan_window(1000, 250, &[]), Window::Read(250));
    }

    #[test]
    fn test_plan_window_skips_held_ranges() {
        let presence = held(&[(0, 250), (250, 250), (500, 250)]);
        assert_eq!(plan_window(0, 250, &presence), Window::Skip(250));
        assert_eq!(plan_window(250, 250, &presence), Window::Skip(250));
        assert_eq!(plan_window(750, 250, &presence), Window::Read(250));
    }

    #[test]
    fn test_plan_window_shortens_before_held_range() {
        let presence = held(&[(300, 100)]);
        assert_eq!(plan_window(250, 250, &presence), Window::Read(50));
        assert_eq!(plan_window(300, 250, &presence), Window::Skip(100));
        assert_eq!(plan_window(400, 250, &presence), Window::Read(250));
    }

    #[test]
    fn test_plan_window_partial_overlap() {
        let presence = held(&[(200, 100)]);
        assert_eq!(plan_window(250, 250, &presence), Window::Skip(50));
    }

    #[test]
    fn test_plan_window_ignores_empty_ranges() {
        let presence = held(&[(0, 0)]);
        assert_eq!(plan_window(0, 250, &presence), Window::Read(250));
    }

    #[test]
    fn test_resume_data_round_trip() {
        struct NoTransport;
        #[async_trait::async_trait]
        impl BundlerTransport for NoTransport {
            async fn create_session(&self, _: &str) -> UploadResult<SessionInfo> {
                unimplemented!()
            }
            async fn session_info(&self, _: &str, _: &str) -> UploadResult<SessionInfo> {
                unimplemented!()
            }
            async fn post_chunk(&self, _: &str, _: &str, _: u64, _: Bytes) -> UploadResult<()> {
                unimplemented!()
            }
            async fn finalize(
                &self,
                _: &str,
                _: &str,
            ) -> UploadResult<crate::receipt::UploadReceipt> {
                unimplemented!()
            }
            async fn post_item(
                &self,
                _: &str,
                _: Bytes,
            ) -> UploadResult<crate::transport::ItemPostOutcome> {
                unimplemented!()
            }
        }

        let transport: Arc<dyn BundlerTransport> = Arc::new(NoTransport);
        let fresh = ChunkingUploader::new(transport.clone(), "arweave");
        assert!(fresh.resume_data().is_none());

        let data = ResumeData {
            token: "arweave".to_string(),
            upload_id: "abc".to_string(),
            chunk_size: 500,
        };
        let resumed = ChunkingUploader::new(transport.clone(), "arweave")
            .with_resume_data(data.clone())
            .unwrap();
        assert_eq!(resumed.resume_data(), Some(data.clone()));
        assert_eq!(resumed.chunk_size(), 500);

        let wrong_token = ChunkingUploader::new(transport, "solana").with_resume_data(data);
        assert!(matches!(wrong_token, Err(UploadError::Validation(_))));
    }
}
