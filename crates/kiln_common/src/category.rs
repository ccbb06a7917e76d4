//! Artifact categories: which pipeline stage a cache key belongs to.

use std::fmt;

/// Location of a process-local identity field inside a key.
///
/// Identity fields (for example a program id assigned when the program object
/// was created) make two otherwise identical keys differ between process runs.
/// They are zeroed before a key is hashed into a persistent digest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct IdentityField {
    /// Byte offset of the field within the key.
    pub offset: usize,
    /// Length of the field in bytes.
    pub len: usize,
}

/// A discriminator identifying which class of artifact a key belongs to.
///
/// Each category has a small numeric id (hashed together with the key bytes),
/// a short label used in the persistent digest manifest, and optionally the
/// location of the identity field in its key layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Category {
    id: u16,
    label: &'static str,
    identity: Option<IdentityField>,
}

/// Every stage key starts with the 32-bit program id.
const PROGRAM_ID: IdentityField = IdentityField { offset: 0, len: 4 };

impl Category {
    /// Vertex shader stage.
    pub const VERTEX: Category = Category::new(0, "vs").with_identity(PROGRAM_ID);
    /// Tessellation control stage.
    pub const TESS_CTRL: Category = Category::new(1, "tcs").with_identity(PROGRAM_ID);
    /// Tessellation evaluation stage.
    pub const TESS_EVAL: Category = Category::new(2, "tes").with_identity(PROGRAM_ID);
    /// Geometry stage.
    pub const GEOMETRY: Category = Category::new(3, "gs").with_identity(PROGRAM_ID);
    /// Fragment stage.
    pub const FRAGMENT: Category = Category::new(4, "fs").with_identity(PROGRAM_ID);
    /// Compute stage.
    pub const COMPUTE: Category = Category::new(5, "cs").with_identity(PROGRAM_ID);

    /// All predefined stage categories, in id order.
    pub const STAGES: [Category; 6] = [
        Self::VERTEX,
        Self::TESS_CTRL,
        Self::TESS_EVAL,
        Self::GEOMETRY,
        Self::FRAGMENT,
        Self::COMPUTE,
    ];

    /// Declares a category with no identity field.
    pub const fn new(id: u16, label: &'static str) -> Self {
        Self {
            id,
            label,
            identity: None,
        }
    }

    /// Returns this category with the given identity field location.
    pub const fn with_identity(mut self, field: IdentityField) -> Self {
        self.identity = Some(field);
        self
    }

    /// Numeric discriminator.
    pub fn id(&self) -> u16 {
        self.id
    }

    /// Manifest label (e.g. `"fs"`).
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Identity field location, if the key layout has one.
    pub fn identity(&self) -> Option<IdentityField> {
        self.identity
    }

    /// Looks up a predefined stage category by its label.
    pub fn from_label(label: &str) -> Option<Category> {
        Self::STAGES.iter().copied().find(|c| c.label == label)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_ids_are_unique() {
        for (i, a) in Category::STAGES.iter().enumerate() {
            for b in &Category::STAGES[i + 1..] {
                assert_ne!(a.id(), b.id());
                assert_ne!(a.label(), b.label());
            }
        }
    }

    #[test]
    fn from_label_finds_stage() {
        assert_eq!(Category::from_label("fs"), Some(Category::FRAGMENT));
        assert_eq!(Category::from_label("cs"), Some(Category::COMPUTE));
        assert_eq!(Category::from_label("blit"), None);
    }

    #[test]
    fn custom_category_has_no_identity() {
        let blit = Category::new(40, "blit");
        assert!(blit.identity().is_none());
        assert_eq!(blit.to_string(), "blit");
    }

    #[test]
    fn stages_carry_program_id_field() {
        let field = Category::VERTEX.identity().unwrap();
        assert_eq!(field.offset, 0);
        assert_eq!(field.len, 4);
    }
}
