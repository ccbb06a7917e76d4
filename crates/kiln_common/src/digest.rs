//! 160-bit content digests keying the persistent artifact store.

use serde::{Deserialize, Serialize};
use sha1::{Digest as _, Sha1};
use std::fmt;
use std::str::FromStr;

/// A 160-bit SHA-1 digest.
///
/// Used both for the program-level source hash that scopes a cache key and
/// for the final store key computed over the textual manifest. Two inputs
/// with the same `Digest` are assumed to be identical.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Digest([u8; Digest::LEN]);

impl Digest {
    /// Length of a digest in bytes.
    pub const LEN: usize = 20;

    /// Computes the SHA-1 digest of a byte slice.
    pub fn of(data: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(data);
        let mut out = [0u8; Self::LEN];
        out.copy_from_slice(&hasher.finalize());
        Self(out)
    }

    /// Wraps raw digest bytes without hashing.
    pub const fn from_raw(bytes: [u8; Self::LEN]) -> Self {
        Self(bytes)
    }

    /// Returns the raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; Self::LEN] {
        &self.0
    }

    /// Returns the lowercase 40-character hex form.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

/// Error returned when parsing a [`Digest`] from its hex form fails.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseDigestError {
    /// The input was not exactly 40 characters long.
    #[error("digest must be {expected} hex characters, got {actual}")]
    Length {
        /// Required number of hex characters.
        expected: usize,
        /// Number of characters supplied.
        actual: usize,
    },

    /// The input contained a non-hex character.
    #[error("invalid hex digit in digest: {0}")]
    InvalidHex(String),
}

impl FromStr for Digest {
    type Err = ParseDigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != Self::LEN * 2 {
            return Err(ParseDigestError::Length {
                expected: Self::LEN * 2,
                actual: s.len(),
            });
        }
        let mut out = [0u8; Self::LEN];
        hex::decode_to_slice(s, &mut out)
            .map_err(|e| ParseDigestError::InvalidHex(e.to_string()))?;
        Ok(Self(out))
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({:02x}{:02x}{:02x}..)", self.0[0], self.0[1], self.0[2])
    }
}
