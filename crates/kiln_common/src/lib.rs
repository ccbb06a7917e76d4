//! Shared foundational types used across the kiln program cache.
//!
//! This crate provides the persistent-store digest, artifact categories with
//! their key layouts, and the 32-bit key hash used by the in-memory index.

#![warn(missing_docs)]

pub mod category;
pub mod digest;
pub mod hash;

pub use category::{Category, IdentityField};
pub use digest::{Digest, ParseDigestError};
pub use hash::key_hash;
