//! Node receipts and the response handed back to callers.

use crate::error::{UploadError, UploadResult};
use bundler_core::hash::decode_base64url;
use bundler_core::{DeepHashChunk, deep_hash};
use bundler_signer::Verifier;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A validator's co-signature on a receipt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorSignature {
    pub address: String,
    pub signature: String,
}

/// The node's signed promise to include an envelope.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReceipt {
    /// Envelope ID (base64url).
    pub id: String,
    /// Milliseconds since the epoch at which the node accepted the envelope.
    #[serde(default)]
    pub timestamp: u64,
    #[serde(default)]
    pub version: String,
    /// Node public key (base64url).
    #[serde(default)]
    pub public: String,
    /// Node signature over the receipt digest (base64url).
    #[serde(default)]
    pub signature: String,
    /// Block height by which the envelope will be settled.
    #[serde(default)]
    pub deadline_height: Option<u64>,
    #[serde(default)]
    pub validator_signatures: Vec<ValidatorSignature>,
}

impl UploadReceipt {
    /// A receipt carrying only an ID, for envelopes the node already had.
    pub fn id_only(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Whether the node signed this receipt at all.
    pub fn is_signed(&self) -> bool {
        !self.signature.is_empty() && !self.public.is_empty() && self.deadline_height.is_some()
    }

    /// The digest the node signs.
    pub async fn digest(&self) -> UploadResult<bundler_core::Digest> {
        let deadline = self.deadline_height.unwrap_or_default();
        let input = DeepHashChunk::list([
            "Bundlr".into(),
            self.version.clone().into(),
            self.id.clone().into(),
            deadline.to_string().into(),
            self.timestamp.to_string().into(),
        ]);
        Ok(deep_hash(input).await?)
    }

    /// Check the node's signature with `verifier`.
    ///
    /// Unsigned receipts and undecodable keys or signatures verify as `false`.
    pub async fn verify_with(&self, verifier: &dyn Verifier) -> UploadResult<bool> {
        if !self.is_signed() {
            return Ok(false);
        }
        let (Ok(public), Ok(signature)) = (
            decode_base64url(&self.public),
            decode_base64url(&self.signature),
        ) else {
            return Ok(false);
        };
        let digest = self.digest().await?;
        Ok(verifier.verify(&public, digest.as_bytes(), &signature)?)
    }
}

/// What a successful upload returns: the receipt plus a verifier bound to it.
#[derive(Clone)]
pub struct UploadResponse {
    receipt: UploadReceipt,
    verifier: Option<Arc<dyn Verifier>>,
    receipt_signature_type: u16,
}

impl UploadResponse {
    pub fn new(
        receipt: UploadReceipt,
        verifier: Option<Arc<dyn Verifier>>,
        receipt_signature_type: u16,
    ) -> Self {
        Self {
            receipt,
            verifier,
            receipt_signature_type,
        }
    }

    pub fn id(&self) -> &str {
        &self.receipt.id
    }

    pub fn timestamp(&self) -> u64 {
        self.receipt.timestamp
    }

    pub fn deadline_height(&self) -> Option<u64> {
        self.receipt.deadline_height
    }

    pub fn signature(&self) -> &str {
        &self.receipt.signature
    }

    pub fn public_key(&self) -> &str {
        &self.receipt.public
    }

    pub fn receipt(&self) -> &UploadReceipt {
        &self.receipt
    }

    pub fn into_receipt(self) -> UploadReceipt {
        self.receipt
    }

    /// Verify the receipt with the verifier bound at construction.
    pub async fn verify(&self) -> UploadResult<bool> {
        let verifier = self.verifier.as_deref().ok_or(UploadError::Signer(
            bundler_signer::SignerError::UnsupportedSignatureType(self.receipt_signature_type),
        ))?;
        self.receipt.verify_with(verifier).await
    }
}

impl fmt::Debug for UploadResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadResponse")
            .field("receipt", &self.receipt)
            .field("verifiable", &self.verifier.is_some())
            .finish()
    }
}
