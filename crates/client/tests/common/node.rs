//! In-memory bundler node for exercising the upload protocols.

use async_trait::async_trait;
use bundler_client::transport::{BundlerTransport, ItemPostOutcome, SessionInfo};
use bundler_client::{UploadError, UploadReceipt, UploadResult};
use bundler_core::DataItem;
use bundler_core::hash::encode_base64url;
use bundler_signer::{Ed25519Signer, Signer, VerifierRegistry, verify_item};
use bytes::Bytes;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

/// Requests in the order the node received them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Request {
    CreateSession,
    SessionInfo(String),
    Chunk { offset: u64, len: u64 },
    Finalize(String),
    PostItem(u64),
}

#[derive(Default)]
struct Session {
    chunk_size: Option<u64>,
    chunks: BTreeMap<u64, Bytes>,
    receipt: Option<UploadReceipt>,
}

#[derive(Default)]
struct NodeState {
    log: Vec<Request>,
    sessions: HashMap<String, Session>,
    next_session: u64,
    /// offset -> (remaining failures, status)
    chunk_failures: HashMap<u64, (u32, u16)>,
    finalize_status: Option<u16>,
    post_item_status: Option<u16>,
    items: HashMap<String, Vec<u8>>,
}

pub struct MemoryNode {
    min: u64,
    max: u64,
    signer: Ed25519Signer,
    state: Mutex<NodeState>,
}

#[allow(dead_code)]
impl MemoryNode {
    pub fn new(min: u64, max: u64) -> Arc<Self> {
        Arc::new(Self {
            min,
            max,
            signer: Ed25519Signer::generate(),
            state: Mutex::new(NodeState::default()),
        })
    }

    /// Seed a session as if an earlier upload had posted `chunks`.
    pub fn insert_session(&self, id: &str, chunk_size: u64, chunks: Vec<(u64, Bytes)>) {
        let session = Session {
            chunk_size: Some(chunk_size),
            chunks: chunks.into_iter().collect(),
            receipt: None,
        };
        self.lock().sessions.insert(id.to_string(), session);
    }

    /// Fail the next `times` posts at `offset` with `status`.
    pub fn fail_chunk(&self, offset: u64, times: u32, status: u16) {
        self.lock().chunk_failures.insert(offset, (times, status));
    }

    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.chunk_failures.clear();
        state.finalize_status = None;
        state.post_item_status = None;
    }

    pub fn fail_finalize(&self, status: u16) {
        self.lock().finalize_status = Some(status);
    }

    pub fn fail_post_item(&self, status: u16) {
        self.lock().post_item_status = Some(status);
    }

    pub fn requests(&self) -> Vec<Request> {
        self.lock().log.clone()
    }

    /// `(offset, len)` of every chunk post, in arrival order.
    pub fn chunk_posts(&self) -> Vec<(u64, u64)> {
        self.lock()
            .log
            .iter()
            .filter_map(|r| match r {
                Request::Chunk { offset, len } => Some((*offset, *len)),
                _ => None,
            })
            .collect()
    }

    pub fn finalize_count(&self) -> usize {
        self.lock()
            .log
            .iter()
            .filter(|r| matches!(r, Request::Finalize(_)))
            .count()
    }

    pub fn clear_log(&self) {
        self.lock().log.clear();
    }

    /// Offsets the node holds for a session.
    pub fn held_offsets(&self, upload_id: &str) -> Vec<u64> {
        self.lock()
            .sessions
            .get(upload_id)
            .map(|s| s.chunks.keys().copied().collect())
            .unwrap_or_default()
    }

    /// The reconstructed envelope stored under `id`.
    pub fn stored_item(&self, id: &str) -> Option<DataItem> {
        let raw = self.lock().items.get(id).cloned()?;
        DataItem::from_bytes(raw).ok()
    }

    pub fn public_key(&self) -> &[u8] {
        self.signer.public_key()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, NodeState> {
        self.state.lock().unwrap()
    }

    async fn accept(&self, raw: Vec<u8>) -> Result<UploadReceipt, String> {
        let item = DataItem::from_bytes(raw).map_err(|e| e.to_string())?;
        let valid = verify_item(&item, &VerifierRegistry::with_defaults())
            .await
            .map_err(|e| e.to_string())?;
        if !valid {
            return Err("invalid signature".to_string());
        }
        let id = item.id().to_string();

        let mut receipt = UploadReceipt {
            id: id.clone(),
            timestamp: 1_700_000_000_000,
            version: "1.0.0".to_string(),
            public: encode_base64url(self.signer.public_key()),
            signature: String::new(),
            deadline_height: Some(1_000),
            validator_signatures: Vec::new(),
        };
        let digest = receipt.digest().await.map_err(|e| e.to_string())?;
        let signature = self.signer.sign(digest.as_bytes()).map_err(|e| e.to_string())?;
        receipt.signature = encode_base64url(&signature);

        self.lock().items.insert(id, item.raw().to_vec());
        Ok(receipt)
    }
}

fn assemble(chunks: &BTreeMap<u64, Bytes>) -> Result<Vec<u8>, String> {
    let mut raw = Vec::new();
    for (offset, chunk) in chunks {
        if *offset != raw.len() as u64 {
            return Err(format!(
                "chunk at {offset} does not follow {} assembled bytes",
                raw.len()
            ));
        }
        raw.extend_from_slice(chunk);
    }
    Ok(raw)
}

#[async_trait]
impl BundlerTransport for MemoryNode {
    async fn create_session(&self, _token: &str) -> UploadResult<SessionInfo> {
        let mut state = self.lock();
        state.log.push(Request::CreateSession);
        state.next_session += 1;
        let id = format!("upload-{}", state.next_session);
        state.sessions.insert(id.clone(), Session::default());
        Ok(SessionInfo {
            id,
            min: self.min,
            max: self.max,
            size: None,
            chunks: Vec::new(),
        })
    }

    async fn session_info(&self, _token: &str, upload_id: &str) -> UploadResult<SessionInfo> {
        let mut state = self.lock();
        state.log.push(Request::SessionInfo(upload_id.to_string()));
        let session = state
            .sessions
            .get(upload_id)
            .ok_or_else(|| UploadError::SessionExpired {
                upload_id: upload_id.to_string(),
            })?;
        Ok(SessionInfo {
            id: upload_id.to_string(),
            min: self.min,
            max: self.max,
            size: session.chunk_size,
            chunks: session
                .chunks
                .iter()
                .map(|(offset, chunk)| (offset.to_string(), chunk.len() as u64))
                .collect(),
        })
    }

    async fn post_chunk(
        &self,
        _token: &str,
        upload_id: &str,
        offset: u64,
        chunk: Bytes,
    ) -> UploadResult<()> {
        let mut state = self.lock();
        state.log.push(Request::Chunk {
            offset,
            len: chunk.len() as u64,
        });

        if let Some((remaining, status)) = state.chunk_failures.get_mut(&offset)
            && *remaining > 0
        {
            *remaining -= 1;
            let status = *status;
            if status == 402 {
                return Err(UploadError::InsufficientFunds {
                    upload_id: Some(upload_id.to_string()),
                    offset: Some(offset),
                });
            }
            return Err(UploadError::Http {
                status,
                upload_id: Some(upload_id.to_string()),
                offset: Some(offset),
                body: "injected failure".to_string(),
            });
        }

        let session = state
            .sessions
            .get_mut(upload_id)
            .ok_or_else(|| UploadError::Http {
                status: 404,
                upload_id: Some(upload_id.to_string()),
                offset: Some(offset),
                body: "no such session".to_string(),
            })?;
        let len = chunk.len() as u64;
        session.chunk_size = Some(session.chunk_size.map_or(len, |size| size.max(len)));
        session.chunks.insert(offset, chunk);
        Ok(())
    }

    async fn finalize(&self, _token: &str, upload_id: &str) -> UploadResult<UploadReceipt> {
        let reconstruction = |status: u16, body: String| UploadError::Reconstruction {
            upload_id: upload_id.to_string(),
            status,
            body,
        };

        let raw = {
            let mut state = self.lock();
            state.log.push(Request::Finalize(upload_id.to_string()));
            if let Some(status) = state.finalize_status {
                if status == 402 {
                    return Err(UploadError::InsufficientFunds {
                        upload_id: Some(upload_id.to_string()),
                        offset: None,
                    });
                }
                return Err(reconstruction(status, "injected failure".to_string()));
            }
            let session = state
                .sessions
                .get(upload_id)
                .ok_or_else(|| reconstruction(404, "no such session".to_string()))?;
            if let Some(receipt) = &session.receipt {
                return Ok(receipt.clone());
            }
            assemble(&session.chunks).map_err(|e| reconstruction(400, e))?
        };

        let receipt = self.accept(raw).await.map_err(|e| reconstruction(400, e))?;
        if let Some(session) = self.lock().sessions.get_mut(upload_id) {
            session.receipt = Some(receipt.clone());
        }
        Ok(receipt)
    }

    async fn post_item(&self, _token: &str, item: Bytes) -> UploadResult<ItemPostOutcome> {
        {
            let mut state = self.lock();
            state.log.push(Request::PostItem(item.len() as u64));
            if let Some(status) = state.post_item_status {
                if status == 402 {
                    return Err(UploadError::InsufficientFunds {
                        upload_id: None,
                        offset: None,
                    });
                }
                return Err(UploadError::Http {
                    status,
                    upload_id: None,
                    offset: None,
                    body: "injected failure".to_string(),
                });
            }
            if let Ok(parsed) = DataItem::from_bytes(item.to_vec())
                && state.items.contains_key(&parsed.id().to_string())
            {
                return Ok(ItemPostOutcome::AlreadyReceived);
            }
        }

        match self.accept(item.to_vec()).await {
            Ok(receipt) => Ok(ItemPostOutcome::Accepted(receipt)),
            Err(body) => Err(UploadError::Http {
                status: 400,
                upload_id: None,
                offset: None,
                body,
            }),
        }
    }
}
