mod common;

use bundler_client::stream::stream_from_bytes;
use bundler_client::{UploadError, Uploader};
use bundler_core::{DataItemOptions, Tag};
use bundler_signer::{Ed25519Signer, Signer, VerifierRegistry, create_signed};
use common::{MemoryNode, Request, payload, test_config, uploader};
use std::sync::Arc;

#[tokio::test]
async fn test_small_payload_single_request() {
    let node = MemoryNode::new(1, 10_000);
    let signer = Arc::new(Ed25519Signer::generate());
    let uploader = uploader(&node, test_config(250, 5), &signer);

    let opts = DataItemOptions::with_tags(vec![Tag::new("Content-Type", "text/plain")]);
    let response = uploader
        .upload(payload(100), &opts)
        .await
        .unwrap();

    let requests = node.requests();
    assert_eq!(requests.len(), 1);
    assert!(matches!(requests[0], Request::PostItem(_)));

    let item = node.stored_item(response.id()).unwrap();
    assert_eq!(item.data(), &payload(100)[..]);
    assert_eq!(item.owner(), signer.public_key());
    assert!(response.verify().await.unwrap());
}

#[tokio::test]
async fn test_threshold_selects_chunked_protocol() {
    let node = MemoryNode::new(1, 10_000);
    let signer = Arc::new(Ed25519Signer::generate());
    let uploader = uploader(&node, test_config(250, 5), &signer);

    // threshold is 1000 bytes
    let response = uploader
        .upload(payload(1_000), &DataItemOptions::default())
        .await
        .unwrap();

    let requests = node.requests();
    assert_eq!(requests[0], Request::CreateSession);
    assert!(!requests.iter().any(|r| matches!(r, Request::PostItem(_))));
    assert_eq!(node.stored_item(response.id()).unwrap().data(), &payload(1_000)[..]);
}

#[tokio::test]
async fn test_force_chunking_small_payload() {
    let node = MemoryNode::new(1, 10_000);
    let signer = Arc::new(Ed25519Signer::generate());
    let uploader = uploader(&node, test_config(250, 5), &signer);

    uploader
        .upload_with(payload(10), &DataItemOptions::default(), true)
        .await
        .unwrap();

    assert_eq!(node.chunk_posts(), vec![(0, 158)]);
}

#[tokio::test]
async fn test_stream_upload_always_chunked() {
    let node = MemoryNode::new(1, 10_000);
    let signer = Arc::new(Ed25519Signer::generate());
    let uploader = uploader(&node, test_config(250, 5), &signer);

    let response = uploader
        .upload_stream(stream_from_bytes(payload(600), 64), &DataItemOptions::default())
        .await
        .unwrap();

    assert_eq!(node.requests()[0], Request::CreateSession);
    assert!(response.verify().await.unwrap());
}

#[tokio::test]
async fn test_already_received_item_keeps_local_id() {
    let node = MemoryNode::new(1, 10_000);
    let signer = Arc::new(Ed25519Signer::generate());
    let uploader = uploader(&node, test_config(250, 5), &signer);

    let item = create_signed(&payload(64), signer.as_ref(), &DataItemOptions::default())
        .await
        .unwrap();
    let first = uploader.upload_item(&item).await.unwrap();
    let second = uploader.upload_item(&item).await.unwrap();

    assert_eq!(first.id(), item.id().to_string());
    assert_eq!(second.id(), first.id());
    assert!(second.signature().is_empty());
    assert!(!second.verify().await.unwrap());
}

#[tokio::test]
async fn test_single_shot_insufficient_funds() {
    let node = MemoryNode::new(1, 10_000);
    let signer = Arc::new(Ed25519Signer::generate());
    let uploader = uploader(&node, test_config(250, 5), &signer);
    node.fail_post_item(402);

    let err = uploader
        .upload(payload(10), &DataItemOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::InsufficientFunds { .. }));
    assert_eq!(node.requests().len(), 1);
}

#[tokio::test]
async fn test_single_shot_retries_server_errors() {
    let node = MemoryNode::new(1, 10_000);
    let signer = Arc::new(Ed25519Signer::generate());
    let uploader = uploader(&node, test_config(250, 5), &signer);
    node.fail_post_item(503);

    let err = uploader
        .upload(payload(10), &DataItemOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::Http { status: 503, .. }));
    assert_eq!(node.requests().len(), 4);
}

#[tokio::test]
async fn test_receipt_without_registered_verifier() {
    let node = MemoryNode::new(1, 10_000);
    let signer = Arc::new(Ed25519Signer::generate());
    let uploader = uploader(&node, test_config(250, 5), &signer).with_verifiers(VerifierRegistry::new());

    let response = uploader
        .upload(payload(10), &DataItemOptions::default())
        .await
        .unwrap();
    assert!(response.verify().await.is_err());
}

#[tokio::test]
async fn test_chunked_handle_shares_config() {
    let node = MemoryNode::new(1, 10_000);
    let signer = Arc::new(Ed25519Signer::generate());
    let uploader = uploader(&node, test_config(300, 2), &signer);

    let chunked = uploader.chunked();
    assert_eq!(chunked.chunk_size(), 300);
    assert_eq!(chunked.batch_size(), 2);
}

#[test]
fn test_invalid_config_rejected() {
    let node = MemoryNode::new(1, 10_000);
    let signer: Arc<dyn Signer> = Arc::new(Ed25519Signer::generate());
    let result = Uploader::with_transport(test_config(0, 5), node, signer);
    assert!(matches!(result, Err(UploadError::Core(_))));
}
