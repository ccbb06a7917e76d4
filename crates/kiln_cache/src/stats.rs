//! Counters describing how lookups were satisfied.

use serde::Serialize;

/// Running counters kept by a [`CacheManager`](crate::CacheManager).
///
/// Every call to `lookup_or_build` bumps exactly one of `memory_hits`,
/// `disk_hits`, `builds`, `build_failures` or `out_of_memory`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups answered from the in-memory index.
    pub memory_hits: u64,
    /// Lookups that missed the in-memory index.
    pub memory_misses: u64,
    /// Lookups answered from the persistent store.
    pub disk_hits: u64,
    /// Persistent-store lookups that found nothing usable.
    pub disk_misses: u64,
    /// Artifacts produced by the code generator and stored in memory.
    pub builds: u64,
    /// Code generator invocations that failed.
    pub build_failures: u64,
    /// Lookups that failed because the arena could not grow.
    pub out_of_memory: u64,
    /// Artifacts that shared an existing arena range instead of copying.
    pub dedup_reuses: u64,
    /// Times the cache was cleared because it reached its entry limit.
    pub evictions: u64,
    /// Records written to the persistent store.
    pub disk_writes: u64,
    /// Records that could not be written.
    pub disk_write_failures: u64,
    /// Malformed or mismatched records deleted from the persistent store.
    pub corrupt_removed: u64,
}

impl CacheStats {
    /// Fraction of lookups answered without running the code generator.
    ///
    /// Returns `None` before the first lookup.
    pub fn hit_rate(&self) -> Option<f64> {
        let hits = self.memory_hits + self.disk_hits;
        let total = hits + self.builds + self.build_failures + self.out_of_memory;
        (total > 0).then(|| hits as f64 / total as f64)
    }
}
