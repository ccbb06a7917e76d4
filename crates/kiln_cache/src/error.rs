//! Error types for cache operations.

use std::path::PathBuf;

use kiln_common::{Category, Digest};

/// Errors that can occur during cache operations.
///
/// Most variants never reach callers of
/// [`CacheManager::lookup_or_build`](crate::CacheManager::lookup_or_build):
/// disk I/O failures and corrupt records are recovered inside the manager by
/// falling back to the next lookup stage. Only `BuildFailed`, `OutOfMemory`
/// and `StaleHandle` are surfaced.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// An I/O error occurred while reading or writing the persistent store.
    #[error("cache I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The arena could not grow to hold a new allocation.
    #[error("arena out of memory: {requested} bytes requested with capacity {capacity}")]
    OutOfMemory {
        /// Capacity the arena tried to reach.
        requested: usize,
        /// Capacity before the failed growth.
        capacity: usize,
    },

    /// A persistent record failed validation.
    #[error("corrupt cache record {digest}: {reason}")]
    CorruptBlob {
        /// Digest of the offending record.
        digest: Digest,
        /// Description of the defect.
        reason: String,
    },

    /// The code generator failed to produce an artifact.
    #[error("failed to build {category} artifact: {source}")]
    BuildFailed {
        /// Category of the requested artifact.
        category: Category,
        /// The generator's error.
        source: BuildError,
    },

    /// A handle from before a bulk clear was dereferenced.
    #[error("stale artifact handle: generation {handle_generation}, cache is at {current_generation}")]
    StaleHandle {
        /// Generation recorded in the handle.
        handle_generation: u64,
        /// Current arena generation.
        current_generation: u64,
    },
}

/// Error reported by a [`CodeGenerator`](crate::CodeGenerator).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct BuildError {
    /// Description of the failure.
    pub message: String,
}

impl BuildError {
    /// Creates a new build error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for BuildError {
    fn from(message: String) -> Self {
        Self { message }
    }
}
