//! Upload error types.

use thiserror::Error;

/// Upload errors.
///
/// Every variant that can happen mid-session carries the upload ID so a
/// caller can resume by hand.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("chunk size {size} outside the node's allowed range {min}..={max}")]
    ChunkSizeOutOfRange { size: u64, min: u64, max: u64 },

    #[error(
        "chunk size for upload {upload_id} is fixed at {session}, configured {configured}"
    )]
    ChunkSizeMismatch {
        upload_id: String,
        session: u64,
        configured: u64,
    },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("upload session {upload_id} has expired")]
    SessionExpired { upload_id: String },

    #[error("insufficient funds (upload {upload_id:?}, offset {offset:?})")]
    InsufficientFunds {
        upload_id: Option<String>,
        offset: Option<u64>,
    },

    #[error("HTTP {status} (upload {upload_id:?}, offset {offset:?}): {body}")]
    Http {
        status: u16,
        upload_id: Option<String>,
        offset: Option<u64>,
        body: String,
    },

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("reconstruction of upload {upload_id} failed ({status}): {body}")]
    Reconstruction {
        upload_id: String,
        status: u16,
        body: String,
    },

    #[error("payload stream failed: {0}")]
    Stream(#[from] std::io::Error),

    #[error("invalid node response: {0}")]
    InvalidResponse(String),

    #[error("chunk upload task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Core(#[from] bundler_core::Error),

    #[error(transparent)]
    Signer(#[from] bundler_signer::SignerError),

    #[error("configuration error: {0}")]
    Config(#[from] Box<figment::Error>),
}

impl UploadError {
    /// Whether a retry could succeed.
    ///
    /// Only transport failures and non-402 HTTP errors qualify.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { status, .. } => *status != 402,
            Self::Request(_) => true,
            _ => false,
        }
    }

    /// The HTTP status behind this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } | Self::Reconstruction { status, .. } => Some(*status),
            Self::InsufficientFunds { .. } => Some(402),
            Self::SessionExpired { .. } => Some(404),
            _ => None,
        }
    }
}

impl From<figment::Error> for UploadError {
    fn from(err: figment::Error) -> Self {
        Self::Config(Box::new(err))
    }
}

/// Result type for upload operations.
pub type UploadResult<T> = std::result::Result<T, UploadError>;
