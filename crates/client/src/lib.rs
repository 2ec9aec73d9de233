//! Client for uploading data items to a bundler node.
//!
//! Small payloads are signed in memory and posted in one request. Large or
//! streamed payloads go through the chunked protocol: a resumable session
//! with bounded parallel chunk uploads, deep-hashed and signed while they
//! stream, then reconstructed by the node.

pub mod api;
pub mod chunking;
pub mod config;
pub mod error;
pub mod events;
pub mod receipt;
pub mod retry;
pub mod stream;
pub mod transport;
pub mod uploader;

pub use api::NodeApi;
pub use chunking::{ChunkingUploader, ResumeData, SessionState};
pub use config::load_config;
pub use error::{UploadError, UploadResult};
pub use events::{UploadController, UploadEvent};
pub use receipt::{UploadReceipt, UploadResponse};
pub use retry::RetryPolicy;
pub use stream::{StreamReader, stream_from_bytes, stream_from_reader};
pub use transport::{BundlerTransport, ItemPostOutcome, PresenceRange, SessionInfo};
pub use uploader::Uploader;
