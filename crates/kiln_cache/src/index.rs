//! Chained hash index from `(category, key bytes)` to arena ranges.
//!
//! Entries live in a slab and each bucket holds the slab index of the head of
//! its chain. When the load factor passes 1.5 entries per bucket the bucket
//! array triples in size and every chain is relinked from the hash stored in
//! its entries, without rehashing any key bytes.

use kiln_common::{key_hash, Category};

use crate::arena::{Arena, ArenaRange};

/// Bucket count of a fresh index.
const INITIAL_BUCKETS: usize = 7;

/// A cached artifact registered in the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Category of the key.
    pub category: Category,
    /// 32-bit hash of category id and key bytes.
    pub hash: u32,
    /// Owned copy of the key bytes.
    pub key: Box<[u8]>,
    /// Range holding the artifact bytes. May be shared with other entries.
    pub artifact: ArenaRange,
    /// Range holding the sidecar metadata.
    pub sidecar: ArenaRange,
}

impl CacheEntry {
    /// Creates an entry, computing its hash from the key.
    pub fn new(category: Category, key: &[u8], artifact: ArenaRange, sidecar: ArenaRange) -> Self {
        Self {
            category,
            hash: key_hash(category, key),
            key: key.into(),
            artifact,
            sidecar,
        }
    }

    fn matches(&self, category: Category, hash: u32, key: &[u8]) -> bool {
        self.category == category
            && self.hash == hash
            && self.key.len() == key.len()
            && *self.key == *key
    }
}

#[derive(Debug)]
struct Slot {
    entry: CacheEntry,
    next: Option<usize>,
}

/// Hash table with separate chaining over [`CacheEntry`] values.
#[derive(Debug)]
pub struct KeyedHashIndex {
    buckets: Vec<Option<usize>>,
    slots: Vec<Slot>,
}

impl KeyedHashIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self {
            buckets: vec![None; INITIAL_BUCKETS],
            slots: Vec::new(),
        }
    }

    /// Number of registered entries.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if no entries are registered.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Current number of buckets.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Registers an entry at the head of its bucket's chain.
    ///
    /// The caller is responsible for not inserting a key that is already
    /// present; a lookup would return the newer entry.
    pub fn insert(&mut self, entry: CacheEntry) {
        let id = self.slots.len();
        let bucket = entry.hash as usize % self.buckets.len();
        self.slots.push(Slot {
            entry,
            next: self.buckets[bucket],
        });
        self.buckets[bucket] = Some(id);

        // More than 1.5 entries per bucket.
        if self.slots.len() * 2 > self.buckets.len() * 3 {
            self.rehash();
        }
    }

    fn rehash(&mut self) {
        let size = self.buckets.len() * 3;
        let mut buckets = vec![None; size];
        for (id, slot) in self.slots.iter_mut().enumerate() {
            let bucket = slot.entry.hash as usize % size;
            slot.next = buckets[bucket];
            buckets[bucket] = Some(id);
        }
        self.buckets = buckets;
    }

    /// Finds the entry for an exact `(category, key)` pair.
    ///
    /// Hash equality alone never counts as a match: category, key length and
    /// key bytes are all compared.
    pub fn lookup(&self, category: Category, key: &[u8]) -> Option<&CacheEntry> {
        let hash = key_hash(category, key);
        let mut cursor = self.buckets[hash as usize % self.buckets.len()];
        while let Some(id) = cursor {
            let slot = &self.slots[id];
            if slot.entry.matches(category, hash, key) {
                return Some(&slot.entry);
            }
            cursor = slot.next;
        }
        None
    }

    /// Finds an entry of `category` whose artifact bytes equal `artifact`.
    ///
    /// This is a linear scan over every entry. The eviction threshold bounds
    /// the entry count, which keeps the scan cheap next to code generation.
    pub fn find_by_content(
        &self,
        arena: &Arena,
        category: Category,
        artifact: &[u8],
    ) -> Option<&CacheEntry> {
        self.iter().find(|entry| {
            entry.category == category
                && entry.artifact.size == artifact.len()
                && arena.read(entry.artifact).is_ok_and(|bytes| bytes == artifact)
        })
    }

    /// Iterates over entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &CacheEntry> {
        self.slots.iter().map(|slot| &slot.entry)
    }

    /// Removes every entry and shrinks back to the initial bucket count.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.buckets = vec![None; INITIAL_BUCKETS];
    }

    #[cfg(test)]
    fn chain_len(&self, bucket: usize) -> usize {
        let mut n = 0;
        let mut cursor = self.buckets[bucket];
        while let Some(id) = cursor {
            n += 1;
            cursor = self.slots[id].next;
        }
        n
    }
}

impl Default for KeyedHashIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(offset: usize, size: usize) -> ArenaRange {
        ArenaRange {
            offset,
            size,
            generation: 0,
        }
    }

    fn entry(category: Category, key: &[u8], offset: usize) -> CacheEntry {
        CacheEntry::new(category, key, range(offset, 16), range(offset + 64, 0))
    }

    #[test]
    fn insert_and_lookup() {
        let mut index = KeyedHashIndex::new();
        index.insert(entry(Category::VERTEX, b"key-a", 0));
        index.insert(entry(Category::VERTEX, b"key-b", 128));

        assert_eq!(index.len(), 2);
        assert_eq!(
            index.lookup(Category::VERTEX, b"key-b").unwrap().artifact.offset,
            128
        );
        assert!(index.lookup(Category::VERTEX, b"key-c").is_none());
    }

    #[test]
    fn category_is_part_of_identity() {
        let mut index = KeyedHashIndex::new();
        index.insert(entry(Category::VERTEX, b"same", 0));
        assert!(index.lookup(Category::FRAGMENT, b"same").is_none());
    }

    #[test]
    fn forged_hash_collision_needs_key_bytes() {
        let mut index = KeyedHashIndex::new();
        let mut forged = entry(Category::VERTEX, b"real key", 0);
        // Same hash and length as the probe, different bytes.
        forged.hash = key_hash(Category::VERTEX, b"probe ke");
        index.insert(forged);
        assert!(index.lookup(Category::VERTEX, b"probe ke").is_none());
        assert!(index.lookup(Category::VERTEX, b"real key").is_none());
    }

    #[test]
    fn rehash_triples_buckets_and_keeps_entries() {
        let mut index = KeyedHashIndex::new();
        let keys: Vec<Vec<u8>> = (0u32..100).map(|i| i.to_le_bytes().to_vec()).collect();
        for (i, key) in keys.iter().enumerate() {
            index.insert(entry(Category::COMPUTE, key, i * 64));
        }
        assert!(index.bucket_count() > INITIAL_BUCKETS);
        assert_eq!(index.bucket_count() % INITIAL_BUCKETS, 0);
        assert!(index.len() * 2 <= index.bucket_count() * 3);
        for (i, key) in keys.iter().enumerate() {
            let found = index.lookup(Category::COMPUTE, key).unwrap();
            assert_eq!(found.artifact.offset, i * 64);
        }
        let chained: usize = (0..index.bucket_count()).map(|b| index.chain_len(b)).sum();
        assert_eq!(chained, 100);
    }

    #[test]
    fn first_rehash_happens_past_load_factor() {
        let mut index = KeyedHashIndex::new();
        for i in 0u8..10 {
            index.insert(entry(Category::VERTEX, &[i], 0));
        }
        assert_eq!(index.bucket_count(), 7);
        index.insert(entry(Category::VERTEX, &[10], 0));
        assert_eq!(index.bucket_count(), 21);
    }

    #[test]
    fn find_by_content_compares_bytes() {
        let mut arena = Arena::with_heap(256, None).unwrap();
        let a = arena.insert(b"code-a").unwrap();
        let b = arena.insert(b"code-b").unwrap();
        let empty = arena.insert(b"").unwrap();

        let mut index = KeyedHashIndex::new();
        index.insert(CacheEntry::new(Category::FRAGMENT, b"k1", a, empty));
        index.insert(CacheEntry::new(Category::FRAGMENT, b"k2", b, empty));

        let hit = index
            .find_by_content(&arena, Category::FRAGMENT, b"code-b")
            .unwrap();
        assert_eq!(&*hit.key, b"k2");
        assert!(index
            .find_by_content(&arena, Category::VERTEX, b"code-b")
            .is_none());
        assert!(index
            .find_by_content(&arena, Category::FRAGMENT, b"code-c")
            .is_none());
    }

    #[test]
    fn clear_resets() {
        let mut index = KeyedHashIndex::new();
        for i in 0u8..20 {
            index.insert(entry(Category::VERTEX, &[i], 0));
        }
        index.clear();
        assert!(index.is_empty());
        assert_eq!(index.bucket_count(), INITIAL_BUCKETS);
        assert!(index.lookup(Category::VERTEX, &[3]).is_none());
    }
}
