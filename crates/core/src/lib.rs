//! Core types for bundler node clients.
//!
//! This crate defines the data model shared by the signer and the client:
//! - The binary data item envelope and its tag encoding
//! - Deep hashing, the digest that envelopes are signed over
//! - Signature type codes and their field lengths
//! - Client configuration

pub mod config;
pub mod deep_hash;
pub mod error;
pub mod hash;
pub mod item;
pub mod signature_type;
pub mod tags;

pub use config::{ClientConfig, RetryConfig};
pub use deep_hash::{ByteStream, DeepHashChunk, deep_hash};
pub use error::{Error, Result};
pub use hash::{Digest, ItemId};
pub use item::{DataItem, DataItemOptions};
pub use signature_type::SignatureType;
pub use tags::Tag;

/// Default chunk size: 25 MB
pub const DEFAULT_CHUNK_SIZE: u64 = 25_000_000;

/// Payloads of at least this many bytes always use the chunked protocol: 50 MB
pub const CHUNKING_THRESHOLD: u64 = 50_000_000;
