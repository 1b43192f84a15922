//! SHA-256 payload integrity.
//!
//! Every container records the digest of its database payload at creation
//! time. The same digest format (lowercase hex) is used by the hub index, so
//! both sides verify downloads and extracted payloads with this type.

use std::io::{self, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

/// A content hash (SHA-256 lowercase hex digest).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentHash(pub String);

impl ContentHash {
    /// Compute the SHA-256 hash of the given data.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentHash(hex::encode(hasher.finalize()))
    }

    /// Hash everything a reader yields.
    pub fn compute_reader<R: Read>(reader: &mut R) -> io::Result<Self> {
        let mut hasher = Sha256::new();
        io::copy(reader, &mut hasher)?;
        Ok(ContentHash(hex::encode(hasher.finalize())))
    }

    /// Hash a file on disk without loading it whole.
    pub fn compute_file(path: &Path) -> io::Result<Self> {
        let mut file = std::fs::File::open(path)?;
        Self::compute_reader(&mut file)
    }

    /// Finish an in-progress hasher.
    pub fn from_hasher(hasher: Sha256) -> Self {
        ContentHash(hex::encode(hasher.finalize()))
    }

    /// Get the hex string representation.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Verify that the given data matches this hash.
    pub fn verify(&self, data: &[u8]) -> bool {
        ContentHash::compute(data).matches(&self.0)
    }

    /// Compare against a recorded digest, ignoring hex case.
    pub fn matches(&self, recorded: &str) -> bool {
        self.0.eq_ignore_ascii_case(recorded.trim())
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
