//! Hash primitives, digests and envelope identifiers.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest as _, Sha256, Sha384};
use std::fmt;

/// Width of a deep-hash digest in bytes (SHA-384).
pub const DIGEST_LEN: usize = 48;

/// A SHA-384 digest, the output of every deep-hash step.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest([u8; DIGEST_LEN]);

impl Digest {
    /// Create a digest from raw bytes.
    pub fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Compute the SHA-384 of `data`.
    pub fn compute(data: &[u8]) -> Self {
        Self(Sha384::digest(data).into())
    }

    /// Compute the SHA-384 of two concatenated byte strings without copying them.
    pub fn compute_pair(left: &[u8], right: &[u8]) -> Self {
        let mut hasher = Sha384::new();
        hasher.update(left);
        hasher.update(right);
        Self(hasher.finalize().into())
    }

    /// Create an incremental hasher.
    pub fn hasher() -> DigestHasher {
        DigestHasher::default()
    }

    /// Encode as lowercase hex string.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl AsRef<[u8]> for Digest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", &self.to_hex()[..16])
    }
}

/// Incremental SHA-384 hasher that also counts the bytes it has seen.
#[derive(Default)]
pub struct DigestHasher {
    inner: Sha384,
    len: u64,
}

impl DigestHasher {
    /// Update the hasher with data.
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
        self.len += data.len() as u64;
    }

    /// Number of bytes hashed so far.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether no bytes have been hashed yet.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Finalize and return the digest and total byte count.
    pub fn finalize(self) -> (Digest, u64) {
        (Digest(self.inner.finalize().into()), self.len)
    }
}

/// The content ID of a signed envelope: SHA-256 of its signature.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ItemId([u8; 32]);

impl ItemId {
    /// Create an ID from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Derive the ID from a signature.
    pub fn from_signature(signature: &[u8]) -> Self {
        Self(Sha256::digest(signature).into())
    }

    /// Parse from unpadded base64url.
    pub fn from_base64url(s: &str) -> crate::Result<Self> {
        let bytes = decode_base64url(s)?;
        let arr: [u8; 32] = bytes.try_into().map_err(|bytes: Vec<u8>| {
            crate::Error::InvalidHash(format!("expected 32 bytes, got {}", bytes.len()))
        })?;
        Ok(Self(arr))
    }

    /// Encode as unpadded base64url, the form the node reports.
    pub fn to_base64url(&self) -> String {
        encode_base64url(&self.0)
    }
}

impl fmt::Debug for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ItemId({})", self.to_base64url())
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base64url())
    }
}

impl Serialize for ItemId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64url())
    }
}

impl<'de> Deserialize<'de> for ItemId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_base64url(&s).map_err(serde::de::Error::custom)
    }
}

/// Encode bytes as unpadded base64url.
pub fn encode_base64url(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode unpadded (or padded) base64url.
pub fn decode_base64url(s: &str) -> crate::Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(s.trim_end_matches('='))
        .map_err(|e| crate::Error::InvalidHash(format!("invalid base64url: {e}")))
}
