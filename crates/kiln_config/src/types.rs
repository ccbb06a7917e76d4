//! Configuration types deserialized from `kiln.toml`.

use serde::Deserialize;
use std::path::PathBuf;

/// Default initial arena capacity in bytes.
pub const DEFAULT_INITIAL_ARENA_SIZE: usize = 16 * 1024;

/// Default number of index entries that triggers a full eviction.
pub const DEFAULT_MAX_ENTRIES: usize = 2000;

/// The top-level cache configuration parsed from `kiln.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CacheConfig {
    /// In-memory arena and index settings.
    #[serde(default)]
    pub memory: MemoryConfig,
    /// Persistent store settings.
    #[serde(default)]
    pub disk: DiskConfig,
}

/// Settings for the in-memory arena and hash index.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Initial arena capacity in bytes (rounded up to the arena alignment).
    pub initial_arena_size: usize,
    /// Entry count above which the whole in-memory cache is cleared.
    pub max_entries: usize,
    /// Hard cap on the arena capacity; growth beyond it fails with out-of-memory.
    pub arena_limit: Option<usize>,
    /// Backing storage for the arena.
    pub backing: ArenaBacking,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            initial_arena_size: DEFAULT_INITIAL_ARENA_SIZE,
            max_entries: DEFAULT_MAX_ENTRIES,
            arena_limit: None,
            backing: ArenaBacking::default(),
        }
    }
}

/// Backing storage used by the arena.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArenaBacking {
    /// Plain heap allocation (default).
    #[default]
    Heap,
    /// Anonymous memory mapping.
    Mmap,
}

/// Settings for the persistent content-addressed store.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DiskConfig {
    /// Whether the persistent store is consulted and written at all.
    pub enabled: bool,
    /// Store root directory. Resolved from the environment when absent.
    pub path: Option<PathBuf>,
    /// When freshly built artifacts are written to disk.
    pub write_policy: WritePolicy,
}

impl Default for DiskConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
            write_policy: WritePolicy::default(),
        }
    }
}

/// When freshly built artifacts are written to the persistent store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WritePolicy {
    /// Queue writes until the caller flushes a complete build unit (default).
    #[default]
    Deferred,
    /// Write each artifact as soon as it is built.
    Immediate,
}
