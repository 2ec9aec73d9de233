//! The signed binary envelope ("data item").
//!
//! Layout, in order:
//!
//! ```text
//! signature type   u16 LE
//! signature        signature_length(type) bytes, zero until signed
//! owner            owner_length(type) bytes
//! target flag      u8, then 32 bytes if 1
//! anchor flag      u8, then 32 bytes if 1
//! tag count        u64 LE
//! tag bytes length u64 LE
//! tags             tag bytes length bytes
//! data             rest of the envelope
//! ```

use crate::deep_hash::{DeepHashChunk, deep_hash};
use crate::hash::{Digest, ItemId, encode_base64url};
use crate::signature_type::SignatureType;
use crate::tags::{Tag, decode_tags, encode_tags};
use bytes::Bytes;
use rand::RngCore;
use std::fmt;

/// Length of the target field when present.
pub const TARGET_LENGTH: usize = 32;

/// Length of the anchor field when present.
pub const ANCHOR_LENGTH: usize = 32;

/// Byte offset of the signature field.
pub const SIGNATURE_OFFSET: usize = 2;

/// Optional envelope fields supplied by the caller.
#[derive(Clone, Debug, Default)]
pub struct DataItemOptions {
    /// 32-byte target address.
    pub target: Option<Vec<u8>>,
    /// 32-byte anchor; a random one is generated when absent.
    pub anchor: Option<Vec<u8>>,
    pub tags: Vec<Tag>,
}

impl DataItemOptions {
    pub fn with_tags(tags: Vec<Tag>) -> Self {
        Self {
            tags,
            ..Self::default()
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Layout {
    signature_type: SignatureType,
    target_start: usize,
    target_present: bool,
    anchor_start: usize,
    anchor_present: bool,
    tag_count: u64,
    tags_start: usize,
    data_start: usize,
}

impl Layout {
    fn owner_start(&self) -> usize {
        SIGNATURE_OFFSET + self.signature_type.signature_length()
    }
}

/// A data item envelope backed by its raw bytes.
#[derive(Clone)]
pub struct DataItem {
    raw: Vec<u8>,
    layout: Layout,
}

impl DataItem {
    /// Build an unsigned envelope around `data`.
    pub fn build(
        signature_type: SignatureType,
        owner: &[u8],
        data: &[u8],
        opts: &DataItemOptions,
    ) -> crate::Result<Self> {
        if owner.len() != signature_type.owner_length() {
            return Err(crate::Error::InvalidOwnerLength {
                expected: signature_type.owner_length(),
                actual: owner.len(),
            });
        }
        if let Some(target) = &opts.target
            && target.len() != TARGET_LENGTH
        {
            return Err(crate::Error::InvalidTarget(format!(
                "expected {TARGET_LENGTH} bytes, got {}",
                target.len()
            )));
        }
        let anchor = match &opts.anchor {
            Some(anchor) if anchor.len() != ANCHOR_LENGTH => {
                return Err(crate::Error::InvalidAnchor(format!(
                    "expected {ANCHOR_LENGTH} bytes, got {}",
                    anchor.len()
                )));
            }
            Some(anchor) => anchor.clone(),
            None => default_anchor(),
        };
        let tag_bytes = encode_tags(&opts.tags)?;

        let sig_len = signature_type.signature_length();
        let target_len = opts.target.as_ref().map_or(0, |t| t.len());
        let header_len =
            SIGNATURE_OFFSET + sig_len + owner.len() + 1 + target_len + 1 + ANCHOR_LENGTH + 16;
        let mut raw = Vec::with_capacity(header_len + tag_bytes.len() + data.len());

        raw.extend_from_slice(&signature_type.code().to_le_bytes());
        raw.resize(SIGNATURE_OFFSET + sig_len, 0);
        raw.extend_from_slice(owner);
        match &opts.target {
            Some(target) => {
                raw.push(1);
                raw.extend_from_slice(target);
            }
            None => raw.push(0),
        }
        raw.push(1);
        raw.extend_from_slice(&anchor);
        raw.extend_from_slice(&(opts.tags.len() as u64).to_le_bytes());
        raw.extend_from_slice(&(tag_bytes.len() as u64).to_le_bytes());
        raw.extend_from_slice(&tag_bytes);
        raw.extend_from_slice(data);

        Self::from_bytes(raw)
    }

    /// Build the header of an unsigned envelope: everything except the data.
    ///
    /// Data appended to these bytes forms a complete envelope, which is how
    /// streamed uploads prepend the header to the payload.
    pub fn build_header(
        signature_type: SignatureType,
        owner: &[u8],
        opts: &DataItemOptions,
    ) -> crate::Result<Self> {
        Self::build(signature_type, owner, &[], opts)
    }

    /// Parse and validate an envelope.
    pub fn from_bytes(raw: impl Into<Vec<u8>>) -> crate::Result<Self> {
        let raw = raw.into();
        let layout = parse_layout(&raw)?;
        Ok(Self { raw, layout })
    }

    pub fn signature_type(&self) -> SignatureType {
        self.layout.signature_type
    }

    pub fn signature(&self) -> &[u8] {
        &self.raw[SIGNATURE_OFFSET..self.layout.owner_start()]
    }

    pub fn owner(&self) -> &[u8] {
        &self.raw[self.layout.owner_start()..self.layout.target_start - 1]
    }

    pub fn target(&self) -> Option<&[u8]> {
        self.layout
            .target_present
            .then(|| &self.raw[self.layout.target_start..self.layout.target_start + TARGET_LENGTH])
    }

    pub fn anchor(&self) -> Option<&[u8]> {
        self.layout
            .anchor_present
            .then(|| &self.raw[self.layout.anchor_start..self.layout.anchor_start + ANCHOR_LENGTH])
    }

    /// Number of tags declared in the header.
    pub fn tag_count(&self) -> u64 {
        self.layout.tag_count
    }

    /// The encoded tag bytes, exactly as they are signed.
    pub fn raw_tags(&self) -> &[u8] {
        &self.raw[self.layout.tags_start..self.layout.data_start]
    }

    pub fn tags(&self) -> crate::Result<Vec<Tag>> {
        decode_tags(self.raw_tags())
    }

    pub fn data(&self) -> &[u8] {
        &self.raw[self.layout.data_start..]
    }

    /// Length of everything before the data.
    pub fn header_len(&self) -> usize {
        self.layout.data_start
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn into_bytes(self) -> Bytes {
        Bytes::from(self.raw)
    }

    /// Whether a (non-zero) signature has been written.
    pub fn is_signed(&self) -> bool {
        self.signature().iter().any(|b| *b != 0)
    }

    /// The envelope ID: SHA-256 of the signature.
    pub fn id(&self) -> ItemId {
        ItemId::from_signature(self.signature())
    }

    /// Write `signature` into the signature field in place.
    pub fn set_signature(&mut self, signature: &[u8]) -> crate::Result<()> {
        write_signature(&mut self.raw, self.layout.signature_type, signature)
    }

    /// The deep-hash input whose digest is signed.
    pub fn signing_input(&self) -> DeepHashChunk {
        signing_input(
            self,
            DeepHashChunk::bytes(Bytes::copy_from_slice(self.data())),
        )
    }

    /// The digest that is signed.
    pub async fn signature_digest(&self) -> crate::Result<Digest> {
        deep_hash(self.signing_input()).await
    }
}

impl fmt::Debug for DataItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataItem")
            .field("signature_type", &self.layout.signature_type)
            .field("signed", &self.is_signed())
            .field("tags", &self.layout.tag_count)
            .field("header_len", &self.header_len())
            .field("data_len", &self.data().len())
            .finish()
    }
}

/// The signable deep-hash input for an envelope whose header fields come
/// from `header` and whose data is supplied separately (possibly streamed).
pub fn signing_input(header: &DataItem, data: DeepHashChunk) -> DeepHashChunk {
    let copy = |b: &[u8]| DeepHashChunk::bytes(Bytes::copy_from_slice(b));
    DeepHashChunk::list([
        "dataitem".into(),
        "1".into(),
        header.signature_type().code().to_string().into(),
        copy(header.owner()),
        copy(header.target().unwrap_or_default()),
        copy(header.anchor().unwrap_or_default()),
        copy(header.raw_tags()),
        data,
    ])
}

/// Write `signature` at the signature offset of an envelope (or of the
/// head chunk of one).
pub fn write_signature(
    buf: &mut [u8],
    signature_type: SignatureType,
    signature: &[u8],
) -> crate::Result<()> {
    let expected = signature_type.signature_length();
    if signature.len() != expected {
        return Err(crate::Error::InvalidSignatureLength {
            expected,
            actual: signature.len(),
        });
    }
    let end = SIGNATURE_OFFSET + expected;
    if buf.len() < end {
        return Err(crate::Error::Malformed(format!(
            "buffer of {} bytes cannot hold a signature ending at {end}",
            buf.len()
        )));
    }
    buf[SIGNATURE_OFFSET..end].copy_from_slice(signature);
    Ok(())
}

/// A fresh anchor: 32 random bytes, base64url-encoded and truncated to 32 characters.
pub fn default_anchor() -> Vec<u8> {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    let mut encoded = encode_base64url(&bytes).into_bytes();
    encoded.truncate(ANCHOR_LENGTH);
    encoded
}

fn parse_layout(raw: &[u8]) -> crate::Result<Layout> {
    let malformed = |msg: String| crate::Error::Malformed(msg);
    let need = |end: usize, what: &str| {
        if raw.len() < end {
            Err(malformed(format!(
                "truncated {what}: need {end} bytes, have {}",
                raw.len()
            )))
        } else {
            Ok(())
        }
    };

    need(SIGNATURE_OFFSET, "signature type")?;
    let signature_type = SignatureType::from_code(u16::from_le_bytes([raw[0], raw[1]]))?;
    let target_flag_at =
        SIGNATURE_OFFSET + signature_type.signature_length() + signature_type.owner_length();
    need(target_flag_at + 1, "owner")?;

    let target_present = read_flag(raw[target_flag_at], "target")?;
    let target_start = target_flag_at + 1;
    let anchor_flag_at = target_start + if target_present { TARGET_LENGTH } else { 0 };
    need(anchor_flag_at + 1, "target")?;

    let anchor_present = read_flag(raw[anchor_flag_at], "anchor")?;
    let anchor_start = anchor_flag_at + 1;
    let counts_at = anchor_start + if anchor_present { ANCHOR_LENGTH } else { 0 };
    need(counts_at + 16, "tag header")?;

    let tag_count = read_u64(&raw[counts_at..counts_at + 8]);
    let tag_bytes_len = read_u64(&raw[counts_at + 8..counts_at + 16]);
    let tags_start = counts_at + 16;
    let data_start = usize::try_from(tag_bytes_len)
        .ok()
        .and_then(|len| tags_start.checked_add(len))
        .ok_or_else(|| malformed(format!("tag bytes length {tag_bytes_len} overflows")))?;
    need(data_start, "tags")?;

    let tags = decode_tags(&raw[tags_start..data_start])?;
    if tags.len() as u64 != tag_count {
        return Err(malformed(format!(
            "header declares {tag_count} tags, found {}",
            tags.len()
        )));
    }

    Ok(Layout {
        signature_type,
        target_start,
        target_present,
        anchor_start,
        anchor_present,
        tag_count,
        tags_start,
        data_start,
    })
}

fn read_flag(byte: u8, field: &str) -> crate::Result<bool> {
    match byte {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(crate::Error::Malformed(format!(
            "invalid {field} presence byte {other}"
        ))),
    }
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}
