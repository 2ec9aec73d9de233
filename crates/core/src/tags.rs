//! Envelope tags and their binary encoding.
//!
//! Tags are encoded as an Avro array of `{ name: bytes, value: bytes }`
//! records: zig-zag varint block counts, length-prefixed fields and a
//! zero-count terminator.

use serde::{Deserialize, Serialize};

/// Maximum number of tags on one envelope.
pub const MAX_TAG_COUNT: usize = 128;

/// Maximum tag name length in bytes.
pub const MAX_TAG_NAME_LEN: usize = 1024;

/// Maximum tag value length in bytes.
pub const MAX_TAG_VALUE_LEN: usize = 3072;

/// A name/value pair attached to an envelope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub value: String,
}

impl Tag {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Check the tag list against the node's limits.
pub fn validate_tags(tags: &[Tag]) -> crate::Result<()> {
    if tags.len() > MAX_TAG_COUNT {
        return Err(crate::Error::InvalidTags(format!(
            "too many tags: {} (max {MAX_TAG_COUNT})",
            tags.len()
        )));
    }
    for (i, tag) in tags.iter().enumerate() {
        if tag.name.is_empty() || tag.name.len() > MAX_TAG_NAME_LEN {
            return Err(crate::Error::InvalidTags(format!(
                "tag {i}: name must be 1..={MAX_TAG_NAME_LEN} bytes, got {}",
                tag.name.len()
            )));
        }
        if tag.value.is_empty() || tag.value.len() > MAX_TAG_VALUE_LEN {
            return Err(crate::Error::InvalidTags(format!(
                "tag {i}: value must be 1..={MAX_TAG_VALUE_LEN} bytes, got {}",
                tag.value.len()
            )));
        }
    }
    Ok(())
}

/// Encode tags. An empty list encodes to no bytes at all.
pub fn encode_tags(tags: &[Tag]) -> crate::Result<Vec<u8>> {
    validate_tags(tags)?;
    if tags.is_empty() {
        return Ok(Vec::new());
    }

    let mut out = Vec::new();
    write_long(&mut out, tags.len() as i64);
    for tag in tags {
        write_bytes(&mut out, tag.name.as_bytes());
        write_bytes(&mut out, tag.value.as_bytes());
    }
    write_long(&mut out, 0);
    Ok(out)
}

/// Decode tags previously produced by [`encode_tags`] (or any Avro writer).
pub fn decode_tags(bytes: &[u8]) -> crate::Result<Vec<Tag>> {
    if bytes.is_empty() {
        return Ok(Vec::new());
    }

    let mut reader = Reader { bytes, pos: 0 };
    let mut tags = Vec::new();
    loop {
        let mut count = reader.read_long()?;
        if count == 0 {
            break;
        }
        if count < 0 {
            // Negative counts are followed by the block's byte size.
            count = count
                .checked_neg()
                .ok_or_else(|| crate::Error::InvalidTags("block count out of range".to_string()))?;
            reader.read_long()?;
        }
        for _ in 0..count {
            let name = reader.read_string()?;
            let value = reader.read_string()?;
            tags.push(Tag { name, value });
            if tags.len() > MAX_TAG_COUNT {
                return Err(crate::Error::InvalidTags("too many tags".to_string()));
            }
        }
    }
    if reader.pos != bytes.len() {
        return Err(crate::Error::InvalidTags(format!(
            "{} trailing bytes after tags",
            bytes.len() - reader.pos
        )));
    }
    Ok(tags)
}

fn write_long(out: &mut Vec<u8>, n: i64) {
    let mut z = ((n << 1) ^ (n >> 63)) as u64;
    while z >= 0x80 {
        out.push((z as u8 & 0x7f) | 0x80);
        z >>= 7;
    }
    out.push(z as u8);
}

fn write_bytes(out: &mut Vec<u8>, data: &[u8]) {
    write_long(out, data.len() as i64);
    out.extend_from_slice(data);
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl Reader<'_> {
    fn read_long(&mut self) -> crate::Result<i64> {
        let mut z: u64 = 0;
        let mut shift = 0;
        loop {
            let byte = *self
                .bytes
                .get(self.pos)
                .ok_or_else(|| crate::Error::InvalidTags("truncated varint".to_string()))?;
            self.pos += 1;
            if shift >= 64 {
                return Err(crate::Error::InvalidTags("varint overflow".to_string()));
            }
            z |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
        }
        Ok((z >> 1) as i64 ^ -((z & 1) as i64))
    }

    fn read_string(&mut self) -> crate::Result<String> {
        let len = self.read_long()?;
        let len = usize::try_from(len)
            .map_err(|_| crate::Error::InvalidTags(format!("negative length {len}")))?;
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| crate::Error::InvalidTags("truncated tag field".to_string()))?;
        let s = std::str::from_utf8(&self.bytes[self.pos..end])
            .map_err(|e| crate::Error::InvalidTags(format!("tag is not UTF-8: {e}")))?;
        self.pos = end;
        Ok(s.to_string())
    }
}
