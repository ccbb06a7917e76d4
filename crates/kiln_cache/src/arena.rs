//! Single growable byte arena holding every cached artifact.
//!
//! Allocation is a bump of `next_free`, rounded to [`ARENA_ALIGNMENT`]. When
//! the backing buffer is full it is replaced by one of double the capacity
//! with the existing bytes copied over, so offsets stay valid across growth.
//! Only [`Arena::clear`] invalidates offsets, and it does so explicitly by
//! advancing a generation counter that every [`ArenaRange`] is checked against.

use memmap2::MmapMut;

use crate::error::CacheError;

/// Alignment of every arena allocation, in bytes.
pub const ARENA_ALIGNMENT: usize = 64;

/// Rounds `size` up to the arena alignment, or `None` on overflow.
pub(crate) fn align_up(size: usize) -> Option<usize> {
    size.checked_add(ARENA_ALIGNMENT - 1).map(|s| s & !(ARENA_ALIGNMENT - 1))
}

/// Backing storage for an [`Arena`].
///
/// Implementations own a contiguous, zero-initialized byte region. `grow`
/// must preserve the first `capacity()` bytes and fail with
/// [`CacheError::OutOfMemory`] rather than abort when memory is unavailable.
pub trait GrowableBuffer {
    /// Current size of the region in bytes.
    fn capacity(&self) -> usize;

    /// Replaces the region with a larger one, copying the existing contents.
    fn grow(&mut self, new_capacity: usize) -> Result<(), CacheError>;

    /// Read view of the whole region.
    fn bytes(&self) -> &[u8];

    /// Write view of the whole region.
    fn bytes_mut(&mut self) -> &mut [u8];
}

fn check_limit(limit: Option<usize>, requested: usize, capacity: usize) -> Result<(), CacheError> {
    match limit {
        Some(limit) if requested > limit => Err(CacheError::OutOfMemory {
            requested,
            capacity,
        }),
        _ => Ok(()),
    }
}

/// Heap-allocated arena storage with fallible growth.
pub struct HeapBuffer {
    data: Vec<u8>,
    limit: Option<usize>,
}

impl HeapBuffer {
    /// Allocates `capacity` zeroed bytes. Growth past `limit` fails.
    pub fn new(capacity: usize, limit: Option<usize>) -> Result<Self, CacheError> {
        check_limit(limit, capacity, 0)?;
        let data = zeroed_vec(capacity, 0)?;
        Ok(Self { data, limit })
    }
}

fn zeroed_vec(capacity: usize, current: usize) -> Result<Vec<u8>, CacheError> {
    let mut data = Vec::new();
    data.try_reserve_exact(capacity)
        .map_err(|_| CacheError::OutOfMemory {
            requested: capacity,
            capacity: current,
        })?;
    data.resize(capacity, 0);
    Ok(data)
}

impl GrowableBuffer for HeapBuffer {
    fn capacity(&self) -> usize {
        self.data.len()
    }

    fn grow(&mut self, new_capacity: usize) -> Result<(), CacheError> {
        let old = self.data.len();
        check_limit(self.limit, new_capacity, old)?;
        let mut next = zeroed_vec(new_capacity, old)?;
        next[..old].copy_from_slice(&self.data);
        self.data = next;
        Ok(())
    }

    fn bytes(&self) -> &[u8] {
        &self.data
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// Arena storage backed by an anonymous memory mapping.
pub struct MmapBuffer {
    map: MmapMut,
    limit: Option<usize>,
}

impl MmapBuffer {
    /// Maps `capacity` zeroed bytes. Growth past `limit` fails.
    pub fn new(capacity: usize, limit: Option<usize>) -> Result<Self, CacheError> {
        check_limit(limit, capacity, 0)?;
        let map = MmapMut::map_anon(capacity).map_err(|_| CacheError::OutOfMemory {
            requested: capacity,
            capacity: 0,
        })?;
        Ok(Self { map, limit })
    }
}

impl GrowableBuffer for MmapBuffer {
    fn capacity(&self) -> usize {
        self.map.len()
    }

    fn grow(&mut self, new_capacity: usize) -> Result<(), CacheError> {
        let old = self.map.len();
        check_limit(self.limit, new_capacity, old)?;
        let mut next = MmapMut::map_anon(new_capacity).map_err(|_| CacheError::OutOfMemory {
            requested: new_capacity,
            capacity: old,
        })?;
        next[..old].copy_from_slice(&self.map);
        self.map = next;
        Ok(())
    }

    fn bytes(&self) -> &[u8] {
        &self.map
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.map
    }
}

/// A byte range inside an [`Arena`], tagged with the generation it was
/// allocated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArenaRange {
    /// Start offset (always a multiple of [`ARENA_ALIGNMENT`]).
    pub offset: usize,
    /// Length of the stored data in bytes (before alignment padding).
    pub size: usize,
    /// Arena generation at allocation time.
    pub generation: u64,
}

/// Bump-allocating byte arena over a [`GrowableBuffer`].
pub struct Arena {
    buffer: Box<dyn GrowableBuffer>,
    next_free: usize,
    generation: u64,
    grow_count: u64,
}

impl Arena {
    /// Creates an arena over an existing buffer.
    pub fn new(buffer: Box<dyn GrowableBuffer>) -> Self {
        Self {
            buffer,
            next_free: 0,
            generation: 0,
            grow_count: 0,
        }
    }

    /// Creates a heap-backed arena with at least `initial` bytes of capacity.
    pub fn with_heap(initial: usize, limit: Option<usize>) -> Result<Self, CacheError> {
        let capacity = initial_capacity(initial)?;
        Ok(Self::new(Box::new(HeapBuffer::new(capacity, limit)?)))
    }

    /// Creates an mmap-backed arena with at least `initial` bytes of capacity.
    pub fn with_mmap(initial: usize, limit: Option<usize>) -> Result<Self, CacheError> {
        let capacity = initial_capacity(initial)?;
        Ok(Self::new(Box::new(MmapBuffer::new(capacity, limit)?)))
    }

    /// Reserves `size` bytes, growing the buffer by doubling when needed.
    ///
    /// On failure the arena is left exactly as it was.
    pub fn alloc(&mut self, size: usize) -> Result<ArenaRange, CacheError> {
        let capacity = self.buffer.capacity();
        let end = align_up(size)
            .and_then(|aligned| self.next_free.checked_add(aligned))
            .ok_or(CacheError::OutOfMemory {
                requested: usize::MAX,
                capacity,
            })?;

        if end > capacity {
            let mut new_capacity = capacity.max(ARENA_ALIGNMENT);
            while new_capacity < end {
                new_capacity = new_capacity
                    .checked_mul(2)
                    .ok_or(CacheError::OutOfMemory {
                        requested: end,
                        capacity,
                    })?;
            }
            self.buffer.grow(new_capacity)?;
            self.grow_count += 1;
        }

        let range = ArenaRange {
            offset: self.next_free,
            size,
            generation: self.generation,
        };
        self.next_free = end;
        Ok(range)
    }

    /// Allocates a range and copies `data` into it.
    pub fn insert(&mut self, data: &[u8]) -> Result<ArenaRange, CacheError> {
        let range = self.alloc(data.len())?;
        self.buffer.bytes_mut()[range.offset..range.offset + range.size].copy_from_slice(data);
        Ok(range)
    }

    /// Returns the bytes of a live range.
    ///
    /// Fails with [`CacheError::StaleHandle`] if the range was allocated
    /// before the most recent [`clear`](Self::clear).
    pub fn read(&self, range: ArenaRange) -> Result<&[u8], CacheError> {
        let stale = CacheError::StaleHandle {
            handle_generation: range.generation,
            current_generation: self.generation,
        };
        if range.generation != self.generation {
            return Err(stale);
        }
        match range.offset.checked_add(range.size) {
            Some(end) if end <= self.next_free => Ok(&self.buffer.bytes()[range.offset..end]),
            _ => Err(stale),
        }
    }

    /// Current allocation watermark, usable with [`rollback`](Self::rollback).
    pub fn used(&self) -> usize {
        self.next_free
    }

    /// Releases every allocation made after `mark` was taken from [`used`](Self::used).
    pub fn rollback(&mut self, mark: usize) {
        if mark <= self.next_free {
            self.next_free = mark;
        }
    }

    /// Current buffer capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// Number of times the buffer has been grown.
    pub fn grow_count(&self) -> u64 {
        self.grow_count
    }

    /// Current generation. Advanced by every [`clear`](Self::clear).
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Drops all allocations and invalidates every outstanding range.
    pub fn clear(&mut self) {
        let used = self.next_free;
        self.buffer.bytes_mut()[..used].fill(0);
        self.next_free = 0;
        self.generation += 1;
    }
}

fn initial_capacity(initial: usize) -> Result<usize, CacheError> {
    align_up(initial.max(ARENA_ALIGNMENT)).ok_or(CacheError::OutOfMemory {
        requested: initial,
        capacity: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_up_rounds_to_64() {
        assert_eq!(align_up(0), Some(0));
        assert_eq!(align_up(1), Some(64));
        assert_eq!(align_up(64), Some(64));
        assert_eq!(align_up(65), Some(128));
        assert_eq!(align_up(usize::MAX), None);
    }

    #[test]
    fn allocations_are_aligned_and_disjoint() {
        let mut arena = Arena::with_heap(1024, None).unwrap();
        let a = arena.alloc(10).unwrap();
        let b = arena.alloc(100).unwrap();
        let c = arena.alloc(1).unwrap();
        assert_eq!(a.offset, 0);
        assert_eq!(b.offset, 64);
        assert_eq!(c.offset, 192);
        assert_eq!(arena.used(), 256);
    }

    #[test]
    fn insert_then_read() {
        let mut arena = Arena::with_heap(256, None).unwrap();
        let range = arena.insert(b"machine code").unwrap();
        assert_eq!(arena.read(range).unwrap(), b"machine code");
    }

    #[test]
    fn growth_doubles_and_preserves_contents() {
        let mut arena = Arena::with_heap(128, None).unwrap();
        let first = arena.insert(&[0xAB; 100]).unwrap();
        let big = arena.insert(&[0xCD; 500]).unwrap();
        assert_eq!(arena.capacity(), 1024);
        assert_eq!(arena.grow_count(), 1);
        assert_eq!(arena.read(first).unwrap(), &[0xAB; 100][..]);
        assert_eq!(arena.read(big).unwrap(), &[0xCD; 500][..]);
    }

    #[test]
    fn limit_turns_growth_into_out_of_memory() {
        let mut arena = Arena::with_heap(128, Some(256)).unwrap();
        let kept = arena.insert(&[1; 128]).unwrap();
        let err = arena.insert(&[2; 300]).unwrap_err();
        assert!(matches!(err, CacheError::OutOfMemory { .. }));
        assert_eq!(arena.used(), 128);
        assert_eq!(arena.read(kept).unwrap(), &[1; 128][..]);
    }

    #[test]
    fn clear_invalidates_ranges() {
        let mut arena = Arena::with_heap(128, None).unwrap();
        let range = arena.insert(b"old").unwrap();
        arena.clear();
        assert_eq!(arena.used(), 0);
        assert_eq!(arena.generation(), 1);
        assert!(matches!(
            arena.read(range),
            Err(CacheError::StaleHandle {
                handle_generation: 0,
                current_generation: 1
            })
        ));

        let fresh = arena.insert(b"new").unwrap();
        assert_eq!(fresh.offset, 0);
        assert_eq!(arena.read(fresh).unwrap(), b"new");
    }

    #[test]
    fn rollback_releases_tail() {
        let mut arena = Arena::with_heap(256, None).unwrap();
        let keep = arena.insert(b"keep").unwrap();
        let mark = arena.used();
        let dropped = arena.insert(b"drop").unwrap();
        arena.rollback(mark);
        assert_eq!(arena.used(), 64);
        assert!(arena.read(keep).is_ok());
        assert!(arena.read(dropped).is_err());
    }

    #[test]
    fn mmap_backing_behaves_like_heap() {
        let mut arena = Arena::with_mmap(64, None).unwrap();
        let a = arena.insert(&[9; 64]).unwrap();
        let b = arena.insert(&[8; 200]).unwrap();
        assert!(arena.capacity() >= 320);
        assert_eq!(arena.read(a).unwrap(), &[9; 64][..]);
        assert_eq!(arena.read(b).unwrap(), &[8; 200][..]);
    }

    #[test]
    fn zero_initial_size_gets_minimum_capacity() {
        let arena = Arena::with_heap(0, None).unwrap();
        assert_eq!(arena.capacity(), ARENA_ALIGNMENT);
    }
}
