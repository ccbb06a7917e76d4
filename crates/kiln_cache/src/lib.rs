//! Compiled-artifact cache for code-generating toolchains.
//!
//! Maps `(category, key bytes)` pairs to compiled artifacts and their sidecar
//! metadata. Artifacts live in a single growable [`Arena`] indexed by a
//! chained [`KeyedHashIndex`], with byte-identical artifacts shared between
//! keys. A persistent [`DiskStore`] keyed by a 160-bit digest lets later
//! processes skip code generation entirely. [`CacheManager`] orchestrates the
//! memory → disk → build lookup order.

#![warn(missing_docs)]

pub mod arena;
pub mod blob;
pub mod dedup;
pub mod disk;
pub mod error;
pub mod index;
pub mod manager;
pub mod manifest;
pub mod stats;

pub use arena::{Arena, ArenaRange, GrowableBuffer, HeapBuffer, MmapBuffer, ARENA_ALIGNMENT};
pub use blob::{Blob, BlobDefect, Part, Tag};
pub use disk::{DiskStore, StoreUsage};
pub use error::{BuildError, CacheError};
pub use index::{CacheEntry, KeyedHashIndex};
pub use manager::{ArtifactHandle, BuiltArtifact, CacheManager, CodeGenerator, EntryInfo, Source};
pub use manifest::{manifest_text, normalize_key, store_digest};
pub use stats::CacheStats;
