//! Upload progress events and pause/resume control.

use std::sync::Arc;
use tokio::sync::{broadcast, watch};

const EVENT_CAPACITY: usize = 256;

/// Progress notifications from a chunked upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UploadEvent {
    /// A chunk was accepted by the node.
    ChunkUpload {
        id: u64,
        offset: u64,
        size: u64,
        /// Bytes accepted so far, including ranges skipped on resume.
        total_uploaded: u64,
    },
    /// A chunk failed after exhausting its retries.
    ChunkError { id: u64, offset: u64, error: String },
    Pause,
    Resume,
    /// The node reconstructed the envelope.
    Done { id: String },
}

/// Handle for pausing, resuming and observing an upload from another task.
#[derive(Clone)]
pub struct UploadController {
    paused: Arc<watch::Sender<bool>>,
    events: broadcast::Sender<UploadEvent>,
}

impl UploadController {
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            paused: Arc::new(paused),
            events,
        }
    }

    /// Stop dispatching new chunks. In-flight chunks still complete.
    pub fn pause(&self) {
        if !self.paused.send_replace(true) {
            self.emit(UploadEvent::Pause);
        }
    }

    pub fn resume(&self) {
        if self.paused.send_replace(false) {
            self.emit(UploadEvent::Resume);
        }
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    /// Receive events emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<UploadEvent> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, event: UploadEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Resolve once the upload is not paused.
    pub(crate) async fn resumed(&self) {
        let mut rx = self.paused.subscribe();
        let _ = rx.wait_for(|paused| !*paused).await;
    }
}

impl Default for UploadController {
    fn default() -> Self {
        Self::new()
    }
}
