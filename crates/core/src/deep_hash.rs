//! Domain-separated recursive hashing over nested byte structures.
//!
//! - Bytes `b`: `H(H("blob" ++ len(b)) ++ H(b))`
//! - List `[x1..xn]`: `acc = H("list" ++ n)`, then `acc = H(acc ++ deep(xi))` for each item
//! - Stream: same as bytes, but hashed incrementally as chunks arrive
//!
//! `H` is SHA-384 and lengths are rendered as decimal ASCII. The fold is
//! evaluated with an explicit stack so arbitrarily nested lists cannot
//! exhaust the call stack.

use crate::hash::{Digest, DigestHasher};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::fmt;
use std::io;
use std::pin::Pin;

/// A boxed stream of byte chunks that can be fed to [`deep_hash`].
pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// One node of a deep-hash input.
pub enum DeepHashChunk {
    /// A fully materialized byte string.
    Bytes(Bytes),
    /// An ordered list of nested inputs.
    List(Vec<DeepHashChunk>),
    /// A byte string delivered incrementally.
    Stream(ByteStream),
}

impl DeepHashChunk {
    /// Wrap a byte string.
    pub fn bytes(data: impl Into<Bytes>) -> Self {
        Self::Bytes(data.into())
    }

    /// Wrap a list of nested inputs.
    pub fn list(items: impl IntoIterator<Item = DeepHashChunk>) -> Self {
        Self::List(items.into_iter().collect())
    }

    /// Wrap a byte stream.
    pub fn stream<S>(stream: S) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        Self::Stream(Box::pin(stream))
    }
}

impl From<&'static str> for DeepHashChunk {
    fn from(value: &'static str) -> Self {
        Self::Bytes(Bytes::from_static(value.as_bytes()))
    }
}

impl From<String> for DeepHashChunk {
    fn from(value: String) -> Self {
        Self::Bytes(Bytes::from(value))
    }
}

impl From<Vec<u8>> for DeepHashChunk {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(value))
    }
}

impl From<Bytes> for DeepHashChunk {
    fn from(value: Bytes) -> Self {
        Self::Bytes(value)
    }
}

impl fmt::Debug for DeepHashChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            Self::List(items) => f.debug_list().entries(items).finish(),
            Self::Stream(_) => write!(f, "Stream(..)"),
        }
    }
}

struct ListFrame {
    acc: Digest,
    items: std::vec::IntoIter<DeepHashChunk>,
}

/// Compute the deep hash of `root`.
///
/// Streams are consumed exactly once; an error from any stream aborts the
/// whole computation.
pub async fn deep_hash(root: DeepHashChunk) -> crate::Result<Digest> {
    let mut stack: Vec<ListFrame> = Vec::new();
    let mut next = root;

    'descend: loop {
        // Walk down the leftmost path until a leaf (or an empty list) yields a digest.
        let mut digest = loop {
            match next {
                DeepHashChunk::Bytes(data) => break hash_blob(&data),
                DeepHashChunk::Stream(stream) => break hash_stream(stream).await?,
                DeepHashChunk::List(items) => {
                    let mut frame = ListFrame {
                        acc: tagged(b"list", items.len() as u64),
                        items: items.into_iter(),
                    };
                    match frame.items.next() {
                        Some(child) => {
                            stack.push(frame);
                            next = child;
                        }
                        None => break frame.acc,
                    }
                }
            }
        };

        // Fold the digest into its parents until one of them has more items.
        loop {
            let Some(frame) = stack.last_mut() else {
                return Ok(digest);
            };
            frame.acc = Digest::compute_pair(frame.acc.as_bytes(), digest.as_bytes());
            match frame.items.next() {
                Some(child) => {
                    next = child;
                    continue 'descend;
                }
                None => {
                    digest = frame.acc;
                    stack.pop();
                }
            }
        }
    }
}

/// Hash a fully materialized byte string.
pub fn hash_blob(data: &[u8]) -> Digest {
    finish_blob(Digest::compute(data), data.len() as u64)
}

/// Hash a byte stream with constant memory.
pub async fn hash_stream<S>(mut stream: S) -> crate::Result<Digest>
where
    S: Stream<Item = io::Result<Bytes>> + Unpin,
{
    let mut hasher = DigestHasher::default();
    while let Some(chunk) = stream.next().await {
        hasher.update(&chunk?);
    }
    let (content, len) = hasher.finalize();
    Ok(finish_blob(content, len))
}

fn finish_blob(content: Digest, len: u64) -> Digest {
    let tag = tagged(b"blob", len);
    Digest::compute_pair(tag.as_bytes(), content.as_bytes())
}

fn tagged(kind: &[u8], n: u64) -> Digest {
    Digest::compute_pair(kind, n.to_string().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn chunked(data: &'static [u8], size: usize) -> DeepHashChunk {
        let parts: Vec<io::Result<Bytes>> = data
            .chunks(size)
            .map(|c| Ok(Bytes::from_static(c)))
            .collect();
        DeepHashChunk::stream(stream::iter(parts))
    }

    #[tokio::test]
    async fn test_blob_definition() {
        let data = b"hello";
        let expected = Digest::compute_pair(
            Digest::compute(b"blob5").as_bytes(),
            Digest::compute(data).as_bytes(),
        );
        assert_eq!(
            deep_hash(DeepHashChunk::bytes(&data[..])).await.unwrap(),
            expected
        );
    }

    #[tokio::test]
    async fn test_list_definition() {
        let a = hash_blob(b"a");
        let b = hash_blob(b"bc");
        let mut acc = Digest::compute(b"list2");
        acc = Digest::compute_pair(acc.as_bytes(), a.as_bytes());
        acc = Digest::compute_pair(acc.as_bytes(), b.as_bytes());

        let got = deep_hash(DeepHashChunk::list(["a".into(), "bc".into()]))
            .await
            .unwrap();
        assert_eq!(got, acc);
    }

    #[tokio::test]
    async fn test_golden_vectors() {
        let nested = deep_hash(DeepHashChunk::list([
            "a".into(),
            DeepHashChunk::list(["b".into(), "".into()]),
        ]))
        .await
        .unwrap();
        assert_eq!(
            nested.to_hex(),
            "f6836f1d993d04b1a1c4add3023cb851638df615b6a2c194af97d855d79d1c0e\
             111d21f17f7d06f01b5f790ca494cf51"
        );

        let receipt = deep_hash(DeepHashChunk::list([
            "Bundlr".into(),
            "1".into(),
            "abc".into(),
            "1000".into(),
            "1700000000000".into(),
        ]))
        .await
        .unwrap();
        assert_eq!(
            receipt.to_hex(),
            "62b7e476f691ab502469e3e48d6d116e6b8cec0b3ccabfb8f4b570018bbcdfd2\
             93531210de6465d045754e5ff3f0675b"
        );
    }

    #[tokio::test]
    async fn test_empty_list_is_seed() {
        let got = deep_hash(DeepHashChunk::list([])).await.unwrap();
        assert_eq!(got, Digest::compute(b"list0"));
    }

    #[tokio::test]
    async fn test_stream_matches_buffered() {
        let data: &'static [u8] = b"the quick brown fox jumps over the lazy dog";
        let buffered = deep_hash(DeepHashChunk::bytes(data)).await.unwrap();
        for size in [1, 3, 7, 64] {
            let streamed = deep_hash(chunked(data, size)).await.unwrap();
            assert_eq!(streamed, buffered, "chunk size {size}");
        }

        let empty = deep_hash(DeepHashChunk::stream(stream::empty::<io::Result<Bytes>>()))
            .await
            .unwrap();
        assert_eq!(empty, hash_blob(b""));
    }

    #[tokio::test]
    async fn test_nested_stream_matches_buffered() {
        let data: &'static [u8] = b"payload";
        let streamed = deep_hash(DeepHashChunk::list([
            "dataitem".into(),
            DeepHashChunk::list(["x".into()]),
            chunked(data, 2),
        ]))
        .await
        .unwrap();
        let buffered = deep_hash(DeepHashChunk::list([
            "dataitem".into(),
            DeepHashChunk::list(["x".into()]),
            DeepHashChunk::bytes(data),
        ]))
        .await
        .unwrap();
        assert_eq!(streamed, buffered);
    }

    #[tokio::test]
    async fn test_domain_separation_and_order() {
        let x = deep_hash("x".into()).await.unwrap();
        let wrapped = deep_hash(DeepHashChunk::list(["x".into()])).await.unwrap();
        assert_ne!(x, wrapped);

        let xy = deep_hash(DeepHashChunk::list(["x".into(), "y".into()]))
            .await
            .unwrap();
        let yx = deep_hash(DeepHashChunk::list(["y".into(), "x".into()]))
            .await
            .unwrap();
        assert_ne!(xy, yx);

        let joined = deep_hash(DeepHashChunk::list(["xy".into()])).await.unwrap();
        assert_ne!(xy, joined);
    }

    #[tokio::test]
    async fn test_deep_nesting_does_not_recurse() {
        let mut node: DeepHashChunk = "leaf".into();
        for _ in 0..100_000 {
            node = DeepHashChunk::List(vec![node]);
        }
        let digest = deep_hash(node).await.unwrap();
        assert_ne!(digest, hash_blob(b"leaf"));
    }

    #[tokio::test]
    async fn test_stream_error_propagates() {
        let items: Vec<io::Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"ok")),
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "source failed")),
        ];
        let result = deep_hash(DeepHashChunk::stream(stream::iter(items))).await;
        assert!(matches!(result, Err(crate::Error::Io(_))));
    }
}
