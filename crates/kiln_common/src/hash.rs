//! Non-cryptographic key hashing for the in-memory index.

use xxhash_rust::xxh32::Xxh32;

use crate::Category;

/// Computes the 32-bit index hash of a `(category, key)` pair.
///
/// The category id is fed to XXH32 as two little-endian bytes ahead of the
/// key bytes, so equal keys in different categories hash differently.
pub fn key_hash(category: Category, key: &[u8]) -> u32 {
    let mut hasher = Xxh32::new(0);
    hasher.update(&category.id().to_le_bytes());
    hasher.update(key);
    hasher.digest()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        let key = [1u8, 2, 3, 4, 5];
        assert_eq!(
            key_hash(Category::VERTEX, &key),
            key_hash(Category::VERTEX, &key)
        );
    }

    #[test]
    fn category_participates() {
        let key = [7u8; 16];
        assert_ne!(
            key_hash(Category::VERTEX, &key),
            key_hash(Category::FRAGMENT, &key)
        );
    }

    #[test]
    fn matches_one_shot_over_concatenation() {
        let key = b"key bytes";
        let mut joined = Category::GEOMETRY.id().to_le_bytes().to_vec();
        joined.extend_from_slice(key);
        assert_eq!(
            key_hash(Category::GEOMETRY, key),
            xxhash_rust::xxh32::xxh32(&joined, 0)
        );
    }
}
