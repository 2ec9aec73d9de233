//! Pull-based reading over push-based byte sources.
//!
//! A [`Tee`] pump drives a source stream and fans every chunk out to bounded
//! channels, one per consumer. Each consumer owns a [`StreamReader`] with its
//! own cursor; a full channel stalls the pump, so the slowest consumer sets
//! the pace.

use bundler_core::ByteStream;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use std::io;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_util::io::ReaderStream;

/// Chunks buffered per consumer before the pump stalls.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 16;

/// Reader lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadState {
    /// Nothing buffered; the next read waits on the source.
    NotReadable,
    /// Buffered bytes are available without waiting.
    Readable,
    /// The source finished and everything has been read.
    Ended,
    /// The source failed; every later read repeats the error.
    Errored,
}

/// A pull-based cursor over chunks pushed through a channel.
pub struct StreamReader {
    rx: Option<mpsc::Receiver<io::Result<Bytes>>>,
    pending: Bytes,
    state: ReadState,
    error: Option<(io::ErrorKind, String)>,
}

impl StreamReader {
    pub fn new(rx: mpsc::Receiver<io::Result<Bytes>>) -> Self {
        Self {
            rx: Some(rx),
            pending: Bytes::new(),
            state: ReadState::NotReadable,
            error: None,
        }
    }

    /// Serve `prefix` before anything from the channel.
    pub fn with_prefix(mut self, prefix: Bytes) -> Self {
        if !prefix.is_empty() {
            let mut joined = BytesMut::with_capacity(prefix.len() + self.pending.len());
            joined.extend_from_slice(&prefix);
            joined.extend_from_slice(&self.pending);
            self.pending = joined.freeze();
            if self.state == ReadState::NotReadable {
                self.state = ReadState::Readable;
            }
        }
        self
    }

    pub fn state(&self) -> ReadState {
        self.state
    }

    /// Whether the underlying channel has been released.
    pub fn is_released(&self) -> bool {
        self.rx.is_none()
    }

    /// Next bytes from the source, at most `max_len` if given.
    ///
    /// Returns `Ok(None)` once the source has ended and every byte has been
    /// read. A zero `max_len` is treated as one.
    pub async fn next(&mut self, max_len: Option<usize>) -> io::Result<Option<Bytes>> {
        loop {
            if !self.pending.is_empty() {
                let available = self.pending.len();
                let take = max_len.map_or(available, |max| max.clamp(1, available));
                let out = self.pending.split_to(take);
                if self.pending.is_empty() && self.state == ReadState::Readable {
                    self.state = ReadState::NotReadable;
                }
                return Ok(Some(out));
            }

            match self.state {
                ReadState::Ended => return Ok(None),
                ReadState::Errored => return Err(self.replay_error()),
                ReadState::NotReadable | ReadState::Readable => {}
            }

            let Some(rx) = self.rx.as_mut() else {
                self.state = ReadState::Ended;
                return Ok(None);
            };
            match rx.recv().await {
                Some(Ok(chunk)) if chunk.is_empty() => continue,
                Some(Ok(chunk)) => {
                    self.pending = chunk;
                    self.state = ReadState::Readable;
                }
                Some(Err(err)) => {
                    self.state = ReadState::Errored;
                    self.error = Some((err.kind(), err.to_string()));
                    self.release();
                    return Err(err);
                }
                None => {
                    self.state = ReadState::Ended;
                    self.release();
                    return Ok(None);
                }
            }
        }
    }

    /// Read exactly `len` bytes, or fewer only when the source ends first.
    pub async fn read_up_to(&mut self, len: usize) -> io::Result<Bytes> {
        let Some(first) = self.next(Some(len)).await? else {
            return Ok(Bytes::new());
        };
        if first.len() == len {
            return Ok(first);
        }
        let mut window = BytesMut::with_capacity(len);
        window.extend_from_slice(&first);
        while window.len() < len {
            match self.next(Some(len - window.len())).await? {
                Some(chunk) => window.extend_from_slice(&chunk),
                None => break,
            }
        }
        Ok(window.freeze())
    }

    /// Discard up to `len` bytes; returns how many were discarded.
    pub async fn skip(&mut self, len: u64) -> io::Result<u64> {
        let mut skipped = 0u64;
        while skipped < len {
            let want = usize::try_from(len - skipped).unwrap_or(usize::MAX);
            match self.next(Some(want)).await? {
                Some(chunk) => skipped += chunk.len() as u64,
                None => break,
            }
        }
        Ok(skipped)
    }

    /// Stop reading and release the channel; repeated calls are no-ops.
    pub fn close(&mut self) {
        self.pending = Bytes::new();
        if self.state != ReadState::Errored {
            self.state = ReadState::Ended;
        }
        self.release();
    }

    /// Turn the remaining bytes into a stream that ends after the first error.
    pub fn into_stream(self) -> ByteStream {
        futures::stream::unfold(Some(self), |reader| async move {
            let mut reader = reader?;
            match reader.next(None).await {
                Ok(Some(chunk)) => Some((Ok(chunk), Some(reader))),
                Ok(None) => None,
                Err(err) => Some((Err(err), None)),
            }
        })
        .boxed()
    }

    fn release(&mut self) {
        if let Some(mut rx) = self.rx.take() {
            rx.close();
        }
    }

    fn replay_error(&self) -> io::Error {
        match &self.error {
            Some((kind, msg)) => io::Error::new(*kind, msg.clone()),
            None => io::Error::other("stream failed"),
        }
    }
}

impl Drop for StreamReader {
    fn drop(&mut self) {
        self.release();
    }
}

/// Drives a source stream into per-consumer channels.
pub struct Tee {
    source: ByteStream,
    outputs: Vec<Option<mpsc::Sender<io::Result<Bytes>>>>,
}

impl Tee {
    /// Pump the source until it ends, fails, or every consumer has gone.
    ///
    /// Returns the number of bytes read from the source. A source error is
    /// forwarded to every live consumer and then returned.
    pub async fn run(mut self) -> io::Result<u64> {
        let mut total = 0u64;
        while let Some(item) = self.source.next().await {
            match item {
                Ok(chunk) => {
                    total += chunk.len() as u64;
                    for output in &mut self.outputs {
                        if let Some(tx) = output
                            && tx.send(Ok(chunk.clone())).await.is_err()
                        {
                            *output = None;
                        }
                    }
                    if self.outputs.iter().all(Option::is_none) {
                        tracing::debug!(total, "all stream consumers closed");
                        break;
                    }
                }
                Err(err) => {
                    for tx in self.outputs.iter().flatten() {
                        // A closed consumer has nothing left to report to.
                        let _ = tx
                            .send(Err(io::Error::new(err.kind(), err.to_string())))
                            .await;
                    }
                    return Err(err);
                }
            }
        }
        Ok(total)
    }
}

/// A single reader over `source`.
pub fn pipe(source: ByteStream, capacity: usize) -> (Tee, StreamReader) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let pump = Tee {
        source,
        outputs: vec![Some(tx)],
    };
    (pump, StreamReader::new(rx))
}

/// Split `source` into two independent readers.
pub fn tee(source: ByteStream, capacity: usize) -> (Tee, StreamReader, StreamReader) {
    let capacity = capacity.max(1);
    let (left_tx, left_rx) = mpsc::channel(capacity);
    let (right_tx, right_rx) = mpsc::channel(capacity);
    let pump = Tee {
        source,
        outputs: vec![Some(left_tx), Some(right_tx)],
    };
    (pump, StreamReader::new(left_rx), StreamReader::new(right_rx))
}

/// A stream over an in-memory payload, yielded in pieces of `piece_len` bytes.
pub fn stream_from_bytes(data: Bytes, piece_len: usize) -> ByteStream {
    let piece_len = piece_len.max(1);
    let pieces: Vec<io::Result<Bytes>> = (0..data.len())
        .step_by(piece_len)
        .map(|start| Ok(data.slice(start..(start + piece_len).min(data.len()))))
        .collect();
    futures::stream::iter(pieces).boxed()
}

/// A stream over any async reader (a file, a socket).
pub fn stream_from_reader<R>(reader: R) -> ByteStream
where
    R: AsyncRead + Send + 'static,
{
    ReaderStream::new(reader).boxed()
}
