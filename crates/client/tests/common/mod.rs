pub mod node;

#[allow(unused_imports)]
pub use node::{MemoryNode, Request};

use bundler_client::Uploader;
use bundler_core::{ClientConfig, DataItem, RetryConfig, SignatureType};
use bundler_signer::{Ed25519Signer, Signer, create_data};
use bytes::Bytes;
use std::sync::Arc;

/// Ed25519 envelope header with an anchor, no target and no tags.
#[allow(dead_code)]
pub const HEADER_LEN: usize = 148;

#[allow(dead_code)]
pub fn test_config(chunk_size: u64, batch_size: usize) -> ClientConfig {
    ClientConfig {
        url: "http://127.0.0.1:1".to_string(),
        token: "arweave".to_string(),
        chunk_size,
        batch_size,
        chunking_threshold: 1_000,
        receipt_signature_type: SignatureType::Ed25519.code(),
        retry: RetryConfig {
            retries: 3,
            min_delay_ms: 1,
            max_delay_ms: 2,
        },
        ..ClientConfig::default()
    }
}

/// Deterministic payload bytes.
#[allow(dead_code)]
pub fn payload(len: usize) -> Bytes {
    (0..len).map(|i| (i % 251) as u8).collect::<Vec<_>>().into()
}

/// Envelope bytes `signer` would produce for `data`, apart from the
/// signature and anchor; used to seed chunks a node already holds.
#[allow(dead_code)]
pub fn reference_envelope(signer: &dyn Signer, data: &[u8]) -> DataItem {
    create_data(data, signer, &Default::default()).unwrap()
}

#[allow(dead_code)]
pub fn uploader(node: &Arc<MemoryNode>, config: ClientConfig, signer: &Arc<Ed25519Signer>) -> Uploader {
    Uploader::with_transport(config, node.clone(), signer.clone()).unwrap()
}
