//! Persistent-store digests computed over a short textual manifest.
//!
//! The manifest names the program the key belongs to and the SHA-1 of the
//! normalized key:
//!
//! ```text
//! program:<40 hex digits>\n
//! <category label>_key:<40 hex digits>\n
//! ```
//!
//! The store digest is the SHA-1 of that text. The format is reproduced
//! byte-for-byte so stores written by other implementations stay readable.

use std::borrow::Cow;

use kiln_common::{Category, Digest};

/// Zeroes the category's process-local identity field, if any.
///
/// Keys shorter than the field have only the overlapping bytes cleared.
/// Returns the key unchanged (borrowed) when there is nothing to clear.
pub fn normalize_key(category: Category, key: &[u8]) -> Cow<'_, [u8]> {
    let Some(field) = category.identity() else {
        return Cow::Borrowed(key);
    };
    let start = field.offset.min(key.len());
    let end = field.offset.saturating_add(field.len).min(key.len());
    if start == end || key[start..end].iter().all(|b| *b == 0) {
        return Cow::Borrowed(key);
    }
    let mut owned = key.to_vec();
    owned[start..end].fill(0);
    Cow::Owned(owned)
}

/// Builds the two-line manifest for an already-normalized key.
pub fn manifest_text(program: &Digest, category: Category, normalized_key: &[u8]) -> String {
    format!(
        "program:{}\n{}_key:{}\n",
        program.to_hex(),
        category.label(),
        Digest::of(normalized_key).to_hex()
    )
}

/// Computes the persistent-store digest for a raw key.
pub fn store_digest(program: &Digest, category: Category, key: &[u8]) -> Digest {
    let normalized = normalize_key(category, key);
    Digest::of(manifest_text(program, category, &normalized).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_with_program_id(id: u32, rest: &[u8]) -> Vec<u8> {
        let mut key = id.to_le_bytes().to_vec();
        key.extend_from_slice(rest);
        key
    }

    #[test]
    fn identity_field_is_zeroed() {
        let key = key_with_program_id(42, &[1, 2, 3]);
        assert_eq!(
            &*normalize_key(Category::VERTEX, &key),
            &[0, 0, 0, 0, 1, 2, 3]
        );
    }

    #[test]
    fn already_zero_identity_borrows() {
        let key = key_with_program_id(0, &[9]);
        assert!(matches!(
            normalize_key(Category::FRAGMENT, &key),
            Cow::Borrowed(_)
        ));
    }

    #[test]
    fn category_without_identity_is_untouched() {
        let blit = Category::new(30, "blit");
        let key = [5u8, 6, 7, 8, 9];
        assert_eq!(&*normalize_key(blit, &key), &key);
    }

    #[test]
    fn short_key_clears_overlap_only() {
        assert_eq!(&*normalize_key(Category::VERTEX, &[7, 7]), &[0, 0]);
        assert_eq!(&*normalize_key(Category::VERTEX, &[]), &[] as &[u8]);
    }

    #[test]
    fn manifest_format() {
        let program = Digest::from_raw([0xab; 20]);
        let text = manifest_text(&program, Category::FRAGMENT, b"abc");
        assert_eq!(
            text,
            format!(
                "program:{}\nfs_key:a9993e364706816aba3e25717850c26c9cd0d89d\n",
                "ab".repeat(20)
            )
        );
    }

    #[test]
    fn identity_field_does_not_affect_digest() {
        let program = Digest::of(b"shader source");
        let a = key_with_program_id(1, b"options");
        let b = key_with_program_id(9001, b"options");
        assert_eq!(
            store_digest(&program, Category::VERTEX, &a),
            store_digest(&program, Category::VERTEX, &b)
        );
    }

    #[test]
    fn other_fields_affect_digest() {
        let program = Digest::of(b"shader source");
        let a = key_with_program_id(1, b"options-a");
        let b = key_with_program_id(1, b"options-b");
        assert_ne!(
            store_digest(&program, Category::VERTEX, &a),
            store_digest(&program, Category::VERTEX, &b)
        );
    }

    #[test]
    fn program_and_category_affect_digest() {
        let key = key_with_program_id(1, b"k");
        let p1 = Digest::of(b"one");
        let p2 = Digest::of(b"two");
        assert_ne!(
            store_digest(&p1, Category::VERTEX, &key),
            store_digest(&p2, Category::VERTEX, &key)
        );
        assert_ne!(
            store_digest(&p1, Category::VERTEX, &key),
            store_digest(&p1, Category::GEOMETRY, &key)
        );
    }
}
