//! Upload entry point that picks single-shot or chunked transfer.

use crate::api::NodeApi;
use crate::chunking::ChunkingUploader;
use crate::error::{UploadError, UploadResult};
use crate::receipt::{UploadReceipt, UploadResponse};
use crate::retry::{RetryPolicy, retry};
use crate::stream;
use crate::transport::{BundlerTransport, ItemPostOutcome};
use bundler_core::{ByteStream, ClientConfig, DataItem, DataItemOptions};
use bundler_signer::{Signer, Verifier, VerifierRegistry, create_signed};
use bytes::Bytes;
use std::sync::Arc;

/// Uploads payloads to one node under one token.
pub struct Uploader {
    transport: Arc<dyn BundlerTransport>,
    signer: Arc<dyn Signer>,
    verifiers: Arc<VerifierRegistry>,
    config: ClientConfig,
}

impl Uploader {
    /// Connect to the node named in `config`.
    pub fn new(config: ClientConfig, signer: Arc<dyn Signer>) -> UploadResult<Self> {
        let api = NodeApi::from_config(&config)?;
        Self::with_transport(config, Arc::new(api), signer)
    }

    pub fn with_transport(
        config: ClientConfig,
        transport: Arc<dyn BundlerTransport>,
        signer: Arc<dyn Signer>,
    ) -> UploadResult<Self> {
        config.validate()?;
        Ok(Self {
            transport,
            signer,
            verifiers: Arc::new(VerifierRegistry::with_defaults()),
            config,
        })
    }

    /// Replace the verifiers used for receipts.
    pub fn with_verifiers(mut self, verifiers: VerifierRegistry) -> Self {
        self.verifiers = Arc::new(verifiers);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn signer(&self) -> &dyn Signer {
        self.signer.as_ref()
    }

    /// A chunked uploader configured like this one, for callers that need
    /// events, pause/resume or resume data.
    pub fn chunked(&self) -> ChunkingUploader {
        let uploader = ChunkingUploader::from_config(Arc::clone(&self.transport), &self.config);
        match self.receipt_verifier() {
            Some(verifier) => uploader.with_receipt_verifier(verifier),
            None => uploader,
        }
    }

    /// Sign and upload `data`, chunking at or above the configured threshold.
    pub async fn upload(&self, data: Bytes, opts: &DataItemOptions) -> UploadResult<UploadResponse> {
        self.upload_with(data, opts, false).await
    }

    /// Sign and upload `data`; `force_chunking` selects the chunked protocol
    /// regardless of size.
    #[tracing::instrument(skip_all, fields(len = data.len(), token = %self.config.token))]
    pub async fn upload_with(
        &self,
        data: Bytes,
        opts: &DataItemOptions,
        force_chunking: bool,
    ) -> UploadResult<UploadResponse> {
        if force_chunking || data.len() as u64 >= self.config.chunking_threshold {
            let piece = usize::try_from(self.config.chunk_size).unwrap_or(usize::MAX);
            return self
                .upload_stream(stream::stream_from_bytes(data, piece), opts)
                .await;
        }

        let item = create_signed(&data, self.signer.as_ref(), opts).await?;
        self.post_signed(&item).await
    }

    /// Sign and upload a payload of unknown length; always chunked.
    pub async fn upload_stream(
        &self,
        data: ByteStream,
        opts: &DataItemOptions,
    ) -> UploadResult<UploadResponse> {
        self.chunked()
            .upload_data(data, self.signer.as_ref(), opts)
            .await
    }

    /// Upload an envelope that is already signed.
    pub async fn upload_item(&self, item: &DataItem) -> UploadResult<UploadResponse> {
        if !item.is_signed() {
            return Err(UploadError::Validation("envelope is not signed".to_string()));
        }
        if item.len() as u64 >= self.config.chunking_threshold {
            return self.chunked().upload_item(item).await;
        }
        self.post_signed(item).await
    }

    async fn post_signed(&self, item: &DataItem) -> UploadResult<UploadResponse> {
        let body = Bytes::copy_from_slice(item.raw());
        let token = &self.config.token;
        let policy = RetryPolicy::from(&self.config.retry);
        let outcome = retry(&policy, "upload", || {
            self.transport.post_item(token, body.clone())
        })
        .await?;

        let receipt = match outcome {
            ItemPostOutcome::Accepted(receipt) => receipt,
            ItemPostOutcome::AlreadyReceived => {
                tracing::info!(id = %item.id(), "node already has this envelope");
                UploadReceipt::id_only(item.id().to_string())
            }
        };
        Ok(UploadResponse::new(
            receipt,
            self.receipt_verifier(),
            self.config.receipt_signature_type,
        ))
    }

    fn receipt_verifier(&self) -> Option<Arc<dyn Verifier>> {
        self.verifiers.get(self.config.receipt_signature_type).ok()
    }
}
