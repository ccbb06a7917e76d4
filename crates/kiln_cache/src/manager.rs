//! Lookup orchestration: memory, then disk, then the code generator.
//!
//! A [`CacheManager`] owns the arena, the index and (optionally) a persistent
//! store. Each request walks the same pipeline:
//!
//! 1. look the exact key up in the in-memory index;
//! 2. on a miss, fetch the record for the key's digest from disk and copy its
//!    parts into the arena;
//! 3. on a second miss, run the [`CodeGenerator`], place the result in the
//!    arena (sharing identical artifacts) and queue it for the disk store.
//!
//! Only a failed build, an arena that cannot grow, or dereferencing an
//! invalidated handle are reported to the caller. Disk trouble of any kind is
//! logged and handled as a miss.

use std::collections::VecDeque;

use kiln_common::{Category, Digest};
use kiln_config::{ArenaBacking, MemoryConfig, ResolvedCache, WritePolicy};
use tracing::{debug, info, warn};

use crate::arena::{Arena, ArenaRange};
use crate::blob::{Part, Tag};
use crate::dedup;
use crate::disk::DiskStore;
use crate::error::{BuildError, CacheError};
use crate::index::{CacheEntry, KeyedHashIndex};
use crate::manifest::{normalize_key, store_digest};
use crate::stats::CacheStats;

/// Output of a successful code generator run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BuiltArtifact {
    /// Executable artifact bytes.
    pub artifact: Vec<u8>,
    /// Metadata describing how to invoke the artifact.
    pub sidecar: Vec<u8>,
}

/// The external collaborator that compiles keys into artifacts.
///
/// `build` must be a pure function of `(category, key)`: the cache relies on
/// identical keys producing identical bytes, both for sharing artifacts in
/// memory and for reusing records written by earlier processes.
pub trait CodeGenerator {
    /// Digest of the program the keys belong to (for example a hash of its
    /// source). Scopes every persistent record.
    fn program_digest(&self) -> Digest;

    /// Compiles the artifact for `key`.
    fn build(&mut self, category: Category, key: &[u8]) -> Result<BuiltArtifact, BuildError>;

    /// Checks that artifact bytes read back from disk are usable.
    ///
    /// Returning `false` makes the manager delete the record and rebuild.
    fn validate_cached(&self, _category: Category, _artifact: &[u8], _sidecar: &[u8]) -> bool {
        true
    }
}

/// Which pipeline stage satisfied a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    /// Found in the in-memory index.
    Memory,
    /// Loaded from the persistent store.
    Disk,
    /// Produced by the code generator.
    Built,
}

/// Reference to a cached artifact and its sidecar.
///
/// A handle stays valid until the next bulk clear, whether triggered by
/// [`CacheManager::invalidate_all`] or by eviction. Reading through a handle
/// from before the clear fails with [`CacheError::StaleHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactHandle {
    artifact: ArenaRange,
    sidecar: ArenaRange,
    source: Source,
}

impl ArtifactHandle {
    /// Where the artifact came from.
    pub fn source(&self) -> Source {
        self.source
    }

    /// Arena generation the handle belongs to.
    pub fn generation(&self) -> u64 {
        self.artifact.generation
    }

    /// Artifact length in bytes.
    pub fn artifact_size(&self) -> usize {
        self.artifact.size
    }

    /// Sidecar length in bytes.
    pub fn sidecar_size(&self) -> usize {
        self.sidecar.size
    }
}

/// Summary of one in-memory entry, for debugging dumps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    /// Category of the key.
    pub category: Category,
    /// 32-bit index hash.
    pub hash: u32,
    /// Key length in bytes.
    pub key_len: usize,
    /// Arena offset of the artifact.
    pub artifact_offset: usize,
    /// Artifact length in bytes.
    pub artifact_size: usize,
    /// Arena offset of the sidecar.
    pub sidecar_offset: usize,
    /// Sidecar length in bytes.
    pub sidecar_size: usize,
}

impl From<&CacheEntry> for EntryInfo {
    fn from(entry: &CacheEntry) -> Self {
        Self {
            category: entry.category,
            hash: entry.hash,
            key_len: entry.key.len(),
            artifact_offset: entry.artifact.offset,
            artifact_size: entry.artifact.size,
            sidecar_offset: entry.sidecar.offset,
            sidecar_size: entry.sidecar.size,
        }
    }
}

/// A built artifact waiting to be written to disk.
#[derive(Debug)]
struct PendingWrite {
    digest: Digest,
    category: Category,
    normalized_key: Vec<u8>,
    artifact: Vec<u8>,
    sidecar: Vec<u8>,
}

/// Owner of one in-memory cache and its optional persistent store.
pub struct CacheManager {
    arena: Arena,
    index: KeyedHashIndex,
    disk: Option<DiskStore>,
    max_entries: usize,
    write_policy: WritePolicy,
    pending: VecDeque<PendingWrite>,
    stats: CacheStats,
    invalidated: bool,
}

impl CacheManager {
    /// Creates a manager with the given memory settings and store.
    ///
    /// Pass `None` for `disk` to run purely in memory.
    pub fn new(
        memory: &MemoryConfig,
        disk: Option<DiskStore>,
        write_policy: WritePolicy,
    ) -> Result<Self, CacheError> {
        let arena = match memory.backing {
            ArenaBacking::Heap => Arena::with_heap(memory.initial_arena_size, memory.arena_limit)?,
            ArenaBacking::Mmap => Arena::with_mmap(memory.initial_arena_size, memory.arena_limit)?,
        };
        Ok(Self {
            arena,
            index: KeyedHashIndex::new(),
            disk,
            max_entries: memory.max_entries.max(1),
            write_policy,
            pending: VecDeque::new(),
            stats: CacheStats::default(),
            invalidated: false,
        })
    }

    /// Creates a manager from a resolved configuration.
    ///
    /// If the store directory cannot be opened the manager runs in memory
    /// only; that is logged, not returned.
    pub fn from_resolved(resolved: &ResolvedCache) -> Result<Self, CacheError> {
        let disk = resolved
            .disk_dir
            .as_ref()
            .and_then(|dir| match DiskStore::open(dir) {
                Ok(store) => Some(store),
                Err(e) => {
                    warn!("persistent cache disabled: {e}");
                    None
                }
            });
        Self::new(&resolved.memory, disk, resolved.write_policy)
    }

    /// Returns the artifact for `(category, key)`, building it if necessary.
    ///
    /// Under [`WritePolicy::Deferred`] every built artifact is copied into a
    /// queue until [`flush_pending_disk_writes`](Self::flush_pending_disk_writes)
    /// or [`discard_pending_disk_writes`](Self::discard_pending_disk_writes).
    /// The queue holds at most `max_entries` artifacts; past that the oldest
    /// queued write is dropped.
    pub fn lookup_or_build<G>(
        &mut self,
        generator: &mut G,
        category: Category,
        key: &[u8],
    ) -> Result<ArtifactHandle, CacheError>
    where
        G: CodeGenerator + ?Sized,
    {
        if let Some(handle) = self.lookup(category, key) {
            self.stats.memory_hits += 1;
            return Ok(handle);
        }
        self.stats.memory_misses += 1;

        let digest = self
            .disk
            .is_some()
            .then(|| store_digest(&generator.program_digest(), category, key));

        if let Some(digest) = &digest {
            let rehydrated = self
                .rehydrate(&*generator, category, key, digest)
                .inspect_err(|_| self.stats.out_of_memory += 1)?;
            if let Some(handle) = rehydrated {
                self.stats.disk_hits += 1;
                debug!("{category} key {digest} loaded from disk");
                return Ok(handle);
            }
            self.stats.disk_misses += 1;
        }

        let built = match generator.build(category, key) {
            Ok(built) => built,
            Err(source) => {
                self.stats.build_failures += 1;
                return Err(CacheError::BuildFailed { category, source });
            }
        };

        let handle = self
            .store_memory(
                category,
                key,
                &built.artifact,
                &built.sidecar,
                Source::Built,
            )
            .inspect_err(|_| self.stats.out_of_memory += 1)?;
        self.stats.builds += 1;
        debug!(
            "{category} artifact built ({} bytes, sidecar {} bytes)",
            built.artifact.len(),
            built.sidecar.len()
        );

        if let Some(digest) = digest {
            if self.pending.len() >= self.max_entries {
                if let Some(dropped) = self.pending.pop_front() {
                    debug!("write queue full, dropping queued {} artifact", dropped.category);
                }
            }
            self.pending.push_back(PendingWrite {
                digest,
                category,
                normalized_key: normalize_key(category, key).into_owned(),
                artifact: built.artifact,
                sidecar: built.sidecar,
            });
            if self.write_policy == WritePolicy::Immediate {
                self.flush_pending_disk_writes();
            }
        }
        Ok(handle)
    }

    /// Looks `(category, key)` up in memory only, without touching disk or
    /// building. Does not update statistics.
    pub fn lookup(&self, category: Category, key: &[u8]) -> Option<ArtifactHandle> {
        self.index
            .lookup(category, key)
            .map(|entry| ArtifactHandle {
                artifact: entry.artifact,
                sidecar: entry.sidecar,
                source: Source::Memory,
            })
    }

    /// Loads the record for `digest` into memory.
    ///
    /// `Ok(None)` means fall through to building. Records that are malformed,
    /// were stored under a different key, or are rejected by the generator are
    /// deleted first.
    fn rehydrate<G>(
        &mut self,
        generator: &G,
        category: Category,
        key: &[u8],
        digest: &Digest,
    ) -> Result<Option<ArtifactHandle>, CacheError>
    where
        G: CodeGenerator + ?Sized,
    {
        let Some(disk) = &self.disk else {
            return Ok(None);
        };
        let blob = match disk.get(digest) {
            Ok(Some(blob)) => blob,
            Ok(None) => return Ok(None),
            Err(e) => {
                warn!("{e}");
                return Ok(None);
            }
        };

        if let Err(defect) = blob.check() {
            self.discard_corrupt(digest, defect.to_string());
            return Ok(None);
        }
        if let Some(stored) = blob.part(Tag::KEY) {
            if stored != &*normalize_key(category, key) {
                self.discard_corrupt(digest, format!("stored {category} key does not match"));
                return Ok(None);
            }
        }
        let (Some(artifact), Some(sidecar)) = (blob.part(Tag::ARTIFACT), blob.part(Tag::SIDECAR))
        else {
            debug!("record {digest} lacks artifact or sidecar, rebuilding");
            return Ok(None);
        };
        if !generator.validate_cached(category, artifact, sidecar) {
            self.discard_corrupt(digest, "artifact rejected by code generator".to_string());
            return Ok(None);
        }

        self.store_memory(category, key, artifact, sidecar, Source::Disk)
            .map(Some)
    }

    fn discard_corrupt(&mut self, digest: &Digest, reason: String) {
        let err = CacheError::CorruptBlob {
            digest: *digest,
            reason,
        };
        warn!("{err}; removing record");
        if let Some(disk) = &self.disk {
            if let Err(e) = disk.remove(digest) {
                warn!("{e}");
            }
        }
        self.stats.corrupt_removed += 1;
    }

    /// Copies an artifact and sidecar into the arena and registers the key.
    ///
    /// A full cache is cleared first, so the returned handle is always live.
    /// If the sidecar does not fit, the artifact allocation is released again
    /// and every existing entry is left untouched.
    fn store_memory(
        &mut self,
        category: Category,
        key: &[u8],
        artifact: &[u8],
        sidecar: &[u8],
        source: Source,
    ) -> Result<ArtifactHandle, CacheError> {
        if self.index.len() >= self.max_entries {
            info!(
                "cache reached {} entries, clearing {} bytes",
                self.index.len(),
                self.arena.used()
            );
            self.stats.evictions += 1;
            self.clear_memory();
        }

        let mark = self.arena.used();
        let placement = dedup::place_artifact(&self.index, &mut self.arena, category, artifact)?;
        let sidecar_range = match self.arena.insert(sidecar) {
            Ok(range) => range,
            Err(e) => {
                self.arena.rollback(mark);
                return Err(e);
            }
        };
        if placement.reused {
            self.stats.dedup_reuses += 1;
        }
        self.index
            .insert(CacheEntry::new(category, key, placement.range, sidecar_range));

        Ok(ArtifactHandle {
            artifact: placement.range,
            sidecar: sidecar_range,
            source,
        })
    }

    fn clear_memory(&mut self) {
        self.index.clear();
        self.arena.clear();
        self.invalidated = true;
    }

    /// Drops every in-memory entry and invalidates all outstanding handles.
    ///
    /// Queued disk writes are kept; they hold their own copies of the bytes.
    pub fn invalidate_all(&mut self) {
        info!("invalidating {} cached entries", self.index.len());
        self.clear_memory();
    }

    /// Returns `true` once after each bulk clear, then `false` until the next.
    ///
    /// Callers that cache handles use this to know they must re-resolve them.
    pub fn take_invalidation(&mut self) -> bool {
        std::mem::take(&mut self.invalidated)
    }

    /// Writes every queued artifact to the persistent store.
    ///
    /// Call this once all artifacts of a build unit have been produced.
    /// Failed writes are logged and dropped. Returns the number written.
    pub fn flush_pending_disk_writes(&mut self) -> usize {
        let pending = std::mem::take(&mut self.pending);
        let Some(disk) = &self.disk else {
            return 0;
        };
        let mut written = 0;
        for write in pending {
            let parts = [
                Part::new(Tag::KEY, &write.normalized_key),
                Part::new(Tag::ARTIFACT, &write.artifact),
                Part::new(Tag::SIDECAR, &write.sidecar),
            ];
            match disk.put(&write.digest, &parts) {
                Ok(()) => {
                    written += 1;
                    self.stats.disk_writes += 1;
                }
                Err(e) => {
                    warn!("failed to persist {} artifact: {e}", write.category);
                    self.stats.disk_write_failures += 1;
                }
            }
        }
        if written > 0 {
            debug!("persisted {written} artifacts");
        }
        written
    }

    /// Drops queued disk writes without persisting them.
    ///
    /// Use this when a later stage of a build unit failed, so that a partial
    /// unit is never written. Returns the number discarded.
    pub fn discard_pending_disk_writes(&mut self) -> usize {
        let n = self.pending.len();
        self.pending.clear();
        n
    }

    /// Number of artifacts waiting to be written to disk.
    pub fn pending_disk_writes(&self) -> usize {
        self.pending.len()
    }

    /// Deletes every record in the persistent store.
    ///
    /// Returns the number removed, or 0 when there is no store.
    pub fn purge_disk(&mut self) -> Result<usize, CacheError> {
        self.pending.clear();
        match &self.disk {
            Some(disk) => disk.clear(),
            None => Ok(0),
        }
    }

    /// Reads the artifact bytes behind a handle.
    pub fn artifact(&self, handle: &ArtifactHandle) -> Result<&[u8], CacheError> {
        self.arena.read(handle.artifact)
    }

    /// Reads the sidecar bytes behind a handle.
    pub fn sidecar(&self, handle: &ArtifactHandle) -> Result<&[u8], CacheError> {
        self.arena.read(handle.sidecar)
    }

    /// Current handle generation. Advanced by every bulk clear.
    pub fn generation(&self) -> u64 {
        self.arena.generation()
    }

    /// Number of in-memory entries.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Returns `true` if no entries are cached in memory.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Entry count that triggers eviction.
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Lookup counters so far.
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Bytes allocated in the arena, including alignment padding.
    pub fn arena_used(&self) -> usize {
        self.arena.used()
    }

    /// Current arena capacity in bytes.
    pub fn arena_capacity(&self) -> usize {
        self.arena.capacity()
    }

    /// The persistent store, if one is attached.
    pub fn disk(&self) -> Option<&DiskStore> {
        self.disk.as_ref()
    }

    /// Per-entry summaries in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = EntryInfo> + '_ {
        self.index.iter().map(EntryInfo::from)
    }
}
