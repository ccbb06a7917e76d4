//! Content deduplication for freshly produced artifacts.
//!
//! Different keys frequently compile to byte-identical machine code. Before
//! copying a new artifact into the arena, the index is searched for an entry
//! of the same category whose artifact bytes match, and its range is shared.

use kiln_common::Category;

use crate::arena::{Arena, ArenaRange};
use crate::error::CacheError;
use crate::index::KeyedHashIndex;

/// Where an artifact ended up in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    /// Range holding the artifact bytes.
    pub range: ArenaRange,
    /// `true` if the range belongs to an existing entry.
    pub reused: bool,
}

/// Returns the range of an existing artifact with identical content, if any.
pub fn find_duplicate(
    index: &KeyedHashIndex,
    arena: &Arena,
    category: Category,
    artifact: &[u8],
) -> Option<ArenaRange> {
    index
        .find_by_content(arena, category, artifact)
        .map(|entry| entry.artifact)
}

/// Places an artifact, sharing an identical existing range when possible.
pub fn place_artifact(
    index: &KeyedHashIndex,
    arena: &mut Arena,
    category: Category,
    artifact: &[u8],
) -> Result<Placement, CacheError> {
    if let Some(range) = find_duplicate(index, arena, category, artifact) {
        return Ok(Placement {
            range,
            reused: true,
        });
    }
    Ok(Placement {
        range: arena.insert(artifact)?,
        reused: false,
    })
}
