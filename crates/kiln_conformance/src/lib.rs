//! Conformance test helpers for the Kiln artifact cache.
//!
//! Provides a deterministic fake code generator and small constructors for
//! configurations, keys and stores, for use by the integration tests under
//! `tests/`.

#![warn(missing_docs)]

use std::path::Path;

use kiln_cache::{BuildError, BuiltArtifact, CacheManager, CodeGenerator, DiskStore};
use kiln_common::{Category, Digest};
use kiln_config::{load_config_from_str, MemoryConfig, WritePolicy};

/// Deterministic stand-in for a compiler.
///
/// The artifact for a key is its SHA-1 repeated to `artifact_len` bytes, so
/// equal keys always produce equal bytes and different keys (almost surely)
/// do not. Keys starting with a registered shared prefix all produce the
/// artifact of the prefix itself, which exercises deduplication.
pub struct FakeGenerator {
    program: Digest,
    artifact_len: usize,
    shared_prefix: Option<Vec<u8>>,
    fail_keys: Vec<Vec<u8>>,
    reject_cached: bool,
    builds: usize,
}

impl FakeGenerator {
    /// Creates a generator for the program with the given source text.
    pub fn new(program_source: &str) -> Self {
        Self {
            program: Digest::of(program_source.as_bytes()),
            artifact_len: 48,
            shared_prefix: None,
            fail_keys: Vec::new(),
            reject_cached: false,
            builds: 0,
        }
    }

    /// Sets the length of every produced artifact.
    pub fn with_artifact_len(mut self, len: usize) -> Self {
        self.artifact_len = len;
        self
    }

    /// Makes all keys starting with `prefix` compile to identical bytes.
    pub fn with_shared_prefix(mut self, prefix: &[u8]) -> Self {
        self.shared_prefix = Some(prefix.to_vec());
        self
    }

    /// Makes building `key` fail.
    pub fn fail_on(mut self, key: &[u8]) -> Self {
        self.fail_keys.push(key.to_vec());
        self
    }

    /// Makes [`CodeGenerator::validate_cached`] reject everything.
    pub fn rejecting_cached(mut self) -> Self {
        self.reject_cached = true;
        self
    }

    /// Number of successful builds so far.
    pub fn builds(&self) -> usize {
        self.builds
    }

    /// The artifact bytes this generator produces for `key`.
    pub fn expected_artifact(&self, key: &[u8]) -> Vec<u8> {
        let seed = match &self.shared_prefix {
            Some(prefix) if key.starts_with(prefix) => prefix.as_slice(),
            _ => key,
        };
        let digest = Digest::of(seed);
        digest
            .as_bytes()
            .iter()
            .copied()
            .cycle()
            .take(self.artifact_len)
            .collect()
    }

    /// The sidecar bytes this generator produces for `key`.
    pub fn expected_sidecar(&self, category: Category, key: &[u8]) -> Vec<u8> {
        format!("{category}:{}", key.len()).into_bytes()
    }
}

impl CodeGenerator for FakeGenerator {
    fn program_digest(&self) -> Digest {
        self.program
    }

    fn build(&mut self, category: Category, key: &[u8]) -> Result<BuiltArtifact, BuildError> {
        if self.fail_keys.iter().any(|k| k == key) {
            return Err(BuildError::new(format!("cannot compile {category} key")));
        }
        self.builds += 1;
        Ok(BuiltArtifact {
            artifact: self.expected_artifact(key),
            sidecar: self.expected_sidecar(category, key),
        })
    }

    fn validate_cached(&self, _category: Category, _artifact: &[u8], _sidecar: &[u8]) -> bool {
        !self.reject_cached
    }
}

/// Builds a stage key: 32-bit program id followed by option bytes.
pub fn stage_key(program_id: u32, options: &[u8]) -> Vec<u8> {
    let mut key = program_id.to_le_bytes().to_vec();
    key.extend_from_slice(options);
    key
}

/// Parses memory settings the way a `kiln.toml` would carry them.
pub fn memory_config(initial_arena_size: usize, max_entries: usize) -> MemoryConfig {
    let toml_str = format!(
        r#"
[memory]
initial_arena_size = {initial_arena_size}
max_entries = {max_entries}
"#
    );
    load_config_from_str(&toml_str).unwrap().memory
}

/// Creates a memory-only manager.
pub fn memory_manager(initial_arena_size: usize, max_entries: usize) -> CacheManager {
    CacheManager::new(
        &memory_config(initial_arena_size, max_entries),
        None,
        WritePolicy::Deferred,
    )
    .unwrap()
}

/// Creates a manager backed by a store rooted at `dir`.
pub fn disk_manager(dir: &Path, policy: WritePolicy) -> CacheManager {
    CacheManager::new(
        &memory_config(4096, 2000),
        Some(DiskStore::open(dir).unwrap()),
        policy,
    )
    .unwrap()
}

/// Overwrites the record for `digest` with raw bytes.
pub fn write_raw_record(store: &DiskStore, digest: &Digest, bytes: &[u8]) {
    let path = store.record_path(digest);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, bytes).unwrap();
}
