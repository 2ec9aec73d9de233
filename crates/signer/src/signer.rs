//! Signer and verifier capabilities, keyed by signature type code.

use crate::error::{SignerError, SignerResult};
use crate::key::{KeyPair, PublicKey};
use bundler_core::SignatureType;
use ed25519_dalek::Signer as _;
use ed25519_dalek::Verifier as _;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A key that can sign envelope digests.
pub trait Signer: Send + Sync {
    /// The signature scheme, which fixes the signature and owner lengths.
    fn signature_type(&self) -> SignatureType;

    /// The public key written into the envelope's owner field.
    fn public_key(&self) -> &[u8];

    /// Sign `message` (a deep-hash digest).
    fn sign(&self, message: &[u8]) -> SignerResult<Vec<u8>>;
}

/// Signature verification for one signature scheme.
pub trait Verifier: Send + Sync {
    /// Check `signature` over `message` against `public_key`.
    ///
    /// Malformed keys or signatures verify as `false`.
    fn verify(&self, public_key: &[u8], message: &[u8], signature: &[u8]) -> SignerResult<bool>;
}

/// An Ed25519 signer (signature type 2, or 4 for Solana keys).
pub struct Ed25519Signer {
    keypair: KeyPair,
    signature_type: SignatureType,
}

impl Ed25519Signer {
    /// Create a new signer from a key pair.
    pub fn new(keypair: KeyPair) -> Self {
        Self {
            keypair,
            signature_type: SignatureType::Ed25519,
        }
    }

    /// Create from a base64(secret || public) key string.
    pub fn from_base64(s: &str) -> SignerResult<Self> {
        Ok(Self::new(KeyPair::from_base64(s)?))
    }

    /// Generate a new signer with a random key.
    pub fn generate() -> Self {
        Self::new(KeyPair::generate())
    }

    /// Tag envelopes with another Ed25519-based signature type.
    pub fn with_signature_type(mut self, signature_type: SignatureType) -> SignerResult<Self> {
        if signature_type.signature_length() != ed25519_dalek::SIGNATURE_LENGTH
            || signature_type.owner_length() != ed25519_dalek::PUBLIC_KEY_LENGTH
        {
            return Err(SignerError::Signing(format!(
                "{signature_type} is not an ed25519 layout"
            )));
        }
        self.signature_type = signature_type;
        Ok(self)
    }

    pub fn key(&self) -> &PublicKey {
        &self.keypair.public
    }
}

impl Signer for Ed25519Signer {
    fn signature_type(&self) -> SignatureType {
        self.signature_type
    }

    fn public_key(&self) -> &[u8] {
        self.keypair.public.as_bytes()
    }

    fn sign(&self, message: &[u8]) -> SignerResult<Vec<u8>> {
        let sig = self.keypair.secret.signing_key().sign(message);
        Ok(sig.to_bytes().to_vec())
    }
}

impl fmt::Debug for Ed25519Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ed25519Signer")
            .field("signature_type", &self.signature_type)
            .field("public", &self.keypair.public)
            .finish()
    }
}

/// Ed25519 signature verification.
#[derive(Debug, Default, Clone, Copy)]
pub struct Ed25519Verifier;

impl Verifier for Ed25519Verifier {
    fn verify(&self, public_key: &[u8], message: &[u8], signature: &[u8]) -> SignerResult<bool> {
        let Ok(key) = PublicKey::from_bytes(public_key) else {
            return Ok(false);
        };
        let Ok(signature) = ed25519_dalek::Signature::from_slice(signature) else {
            return Ok(false);
        };
        Ok(key.verifying_key().verify(message, &signature).is_ok())
    }
}

/// Verifiers keyed by signature type code.
///
/// Passed explicitly to whatever needs to check signatures; nothing is
/// registered globally.
#[derive(Clone, Default)]
pub struct VerifierRegistry {
    verifiers: HashMap<u16, Arc<dyn Verifier>>,
}

impl VerifierRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in Ed25519 verifier for types 2 and 4.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        let ed25519: Arc<dyn Verifier> = Arc::new(Ed25519Verifier);
        registry.register(SignatureType::Ed25519, ed25519.clone());
        registry.register(SignatureType::Solana, ed25519);
        registry
    }

    /// Register (or replace) the verifier for a signature type.
    pub fn register(&mut self, signature_type: SignatureType, verifier: Arc<dyn Verifier>) {
        self.verifiers.insert(signature_type.code(), verifier);
    }

    /// Look up the verifier for a signature type code.
    pub fn get(&self, code: u16) -> SignerResult<Arc<dyn Verifier>> {
        self.verifiers
            .get(&code)
            .cloned()
            .ok_or(SignerError::UnsupportedSignatureType(code))
    }

    /// Verify with the verifier registered for `code`.
    pub fn verify(
        &self,
        code: u16,
        public_key: &[u8],
        message: &[u8],
        signature: &[u8],
    ) -> SignerResult<bool> {
        self.get(code)?.verify(public_key, message, signature)
    }

    pub fn supports(&self, code: u16) -> bool {
        self.verifiers.contains_key(&code)
    }
}

impl fmt::Debug for VerifierRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut codes: Vec<_> = self.verifiers.keys().copied().collect();
        codes.sort_unstable();
        f.debug_struct("VerifierRegistry")
            .field("signature_types", &codes)
            .finish()
    }
}
