//! Multi-part blob wire format for persistent records.
//!
//! A blob is a sequence of `(tag: u32, length: u32, bytes)` parts in
//! little-endian byte order, terminated by a bare `END` tag. Readers look up
//! the part they want by tag and skip everything else, so unknown tags are
//! forward compatible. A blob is only trusted after [`Blob::check`] has
//! walked the whole sequence.

use std::fmt;

/// Identifies the contents of a blob part.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag(pub u32);

impl Tag {
    /// Terminates the part sequence. Carries no length or payload.
    pub const END: Tag = Tag(0);
    /// Executable artifact bytes.
    pub const ARTIFACT: Tag = Tag(1);
    /// Sidecar metadata describing how to invoke the artifact.
    pub const SIDECAR: Tag = Tag(2);
    /// Normalized key the record was stored under.
    pub const KEY: Tag = Tag(3);
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Tag::END => f.write_str("END"),
            Tag::ARTIFACT => f.write_str("ARTIFACT"),
            Tag::SIDECAR => f.write_str("SIDECAR"),
            Tag::KEY => f.write_str("KEY"),
            Tag(other) => write!(f, "Tag({other})"),
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One tagged section of a blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Part<'a> {
    /// What the bytes contain.
    pub tag: Tag,
    /// The payload.
    pub bytes: &'a [u8],
}

impl<'a> Part<'a> {
    /// Creates a part.
    pub fn new(tag: Tag, bytes: &'a [u8]) -> Self {
        Self { tag, bytes }
    }
}

/// Structural problems found while writing or validating a blob.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BlobDefect {
    /// Fewer than four bytes remained where a tag was expected.
    #[error("truncated tag at offset {offset}")]
    TruncatedTag {
        /// Byte offset of the partial tag.
        offset: usize,
    },

    /// Fewer than four bytes remained where a part length was expected.
    #[error("truncated length for {tag} at offset {offset}")]
    TruncatedLength {
        /// Tag of the part.
        tag: Tag,
        /// Byte offset of the partial length.
        offset: usize,
    },

    /// A part's declared length runs past the end of the blob.
    #[error("{tag} part at offset {offset} declares {len} bytes past the end of the blob")]
    Overrun {
        /// Tag of the part.
        tag: Tag,
        /// Byte offset of the part header.
        offset: usize,
        /// Declared payload length.
        len: usize,
    },

    /// The same tag appeared twice.
    #[error("duplicate {0} part")]
    DuplicateTag(Tag),

    /// The sequence ended without an `END` tag.
    #[error("missing END tag")]
    MissingEnd,

    /// Bytes follow the `END` tag.
    #[error("{trailing} trailing bytes after END at offset {offset}")]
    TrailingBytes {
        /// Byte offset of the `END` tag.
        offset: usize,
        /// Number of bytes after it.
        trailing: usize,
    },

    /// A writer tried to emit `END` as a payload part.
    #[error("END cannot be used as a part tag")]
    ReservedTag,

    /// A payload does not fit the 32-bit length field.
    #[error("{tag} part of {len} bytes exceeds the 32-bit length field")]
    TooLarge {
        /// Tag of the part.
        tag: Tag,
        /// Payload length.
        len: usize,
    },
}

/// Serializes parts in the given order followed by `END`.
pub fn encode(parts: &[Part<'_>]) -> Result<Vec<u8>, BlobDefect> {
    let mut seen = Vec::with_capacity(parts.len());
    let mut total = 4;
    for part in parts {
        if part.tag == Tag::END {
            return Err(BlobDefect::ReservedTag);
        }
        if seen.contains(&part.tag) {
            return Err(BlobDefect::DuplicateTag(part.tag));
        }
        if u32::try_from(part.bytes.len()).is_err() {
            return Err(BlobDefect::TooLarge {
                tag: part.tag,
                len: part.bytes.len(),
            });
        }
        seen.push(part.tag);
        total += 8 + part.bytes.len();
    }

    let mut out = Vec::with_capacity(total);
    for part in parts {
        out.extend_from_slice(&part.tag.0.to_le_bytes());
        out.extend_from_slice(&(part.bytes.len() as u32).to_le_bytes());
        out.extend_from_slice(part.bytes);
    }
    out.extend_from_slice(&Tag::END.0.to_le_bytes());
    Ok(out)
}

fn read_u32(bytes: &[u8], offset: usize) -> Option<u32> {
    let end = offset.checked_add(4)?;
    let raw: [u8; 4] = bytes.get(offset..end)?.try_into().ok()?;
    Some(u32::from_le_bytes(raw))
}

/// A serialized record as read back from the persistent store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    bytes: Vec<u8>,
}

impl Blob {
    /// Wraps raw record bytes. Nothing is validated until [`check`](Self::check).
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Encodes parts into a new blob.
    pub fn encode(parts: &[Part<'_>]) -> Result<Self, BlobDefect> {
        encode(parts).map(Self::from_bytes)
    }

    /// The raw serialized bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Serialized size in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` for a zero-length blob (which is never well-formed).
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Walks the whole part sequence and reports the first structural defect.
    ///
    /// A blob is well-formed iff every part can be skipped using its declared
    /// length without reading past the end, no tag repeats, and the sequence
    /// ends exactly at `END`.
    pub fn check(&self) -> Result<(), BlobDefect> {
        let bytes = &self.bytes;
        let mut seen: Vec<Tag> = Vec::new();
        let mut pos = 0;
        loop {
            if pos == bytes.len() {
                return Err(BlobDefect::MissingEnd);
            }
            let tag = Tag(read_u32(bytes, pos).ok_or(BlobDefect::TruncatedTag { offset: pos })?);
            if tag == Tag::END {
                let trailing = bytes.len() - (pos + 4);
                if trailing != 0 {
                    return Err(BlobDefect::TrailingBytes {
                        offset: pos,
                        trailing,
                    });
                }
                return Ok(());
            }
            let len = read_u32(bytes, pos + 4).ok_or(BlobDefect::TruncatedLength {
                tag,
                offset: pos + 4,
            })? as usize;
            let end = (pos + 8)
                .checked_add(len)
                .filter(|end| *end <= bytes.len())
                .ok_or(BlobDefect::Overrun {
                    tag,
                    offset: pos,
                    len,
                })?;
            if seen.contains(&tag) {
                return Err(BlobDefect::DuplicateTag(tag));
            }
            seen.push(tag);
            pos = end;
        }
    }

    /// Returns `true` if [`check`](Self::check) finds no defect.
    pub fn is_well_formed(&self) -> bool {
        self.check().is_ok()
    }

    /// Iterates over the parts up to `END`, stopping early at the first defect.
    pub fn parts(&self) -> Parts<'_> {
        Parts {
            bytes: &self.bytes,
            pos: 0,
        }
    }

    /// Returns the payload of the part with the given tag, if present.
    pub fn part(&self, tag: Tag) -> Option<&[u8]> {
        self.parts().find(|p| p.tag == tag).map(|p| p.bytes)
    }
}

/// Iterator over the parts of a [`Blob`].
pub struct Parts<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for Parts<'a> {
    type Item = Part<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let tag = Tag(read_u32(self.bytes, self.pos)?);
        if tag == Tag::END {
            self.pos = self.bytes.len();
            return None;
        }
        let len = read_u32(self.bytes, self.pos + 4)? as usize;
        let start = self.pos + 8;
        let end = start.checked_add(len)?;
        let payload = self.bytes.get(start..end)?;
        self.pos = end;
        Some(Part::new(tag, payload))
    }
}
