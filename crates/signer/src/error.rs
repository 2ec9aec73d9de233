//! Signer error types.

use thiserror::Error;

/// Signing operation errors.
#[derive(Debug, Error)]
pub enum SignerError {
    #[error("key parsing error: {0}")]
    KeyParsing(String),

    #[error("signing error: {0}")]
    Signing(String),

    #[error("invalid signature format: {0}")]
    InvalidSignature(String),

    #[error("no verifier registered for signature type {0}")]
    UnsupportedSignatureType(u16),

    #[error("data item error: {0}")]
    Item(#[from] bundler_core::Error),
}

/// Result type for signing operations.
pub type SignerResult<T> = std::result::Result<T, SignerError>;
