//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown signature type: {0}")]
    UnknownSignatureType(u16),

    #[error("invalid owner length: expected {expected}, got {actual}")]
    InvalidOwnerLength { expected: usize, actual: usize },

    #[error("invalid signature length: expected {expected}, got {actual}")]
    InvalidSignatureLength { expected: usize, actual: usize },

    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("invalid anchor: {0}")]
    InvalidAnchor(String),

    #[error("invalid tags: {0}")]
    InvalidTags(String),

    #[error("malformed data item: {0}")]
    Malformed(String),

    #[error("invalid hash: {0}")]
    InvalidHash(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error while hashing: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
