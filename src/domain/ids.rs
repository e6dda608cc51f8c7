//! Domain identifier types with validation
//!
//! Newtype wrappers for the identifiers that cross module boundaries:
//! batch (association) ids and content hashes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Batch identifier newtype wrapper
///
/// The batch id doubles as the association id bound into every field's
/// associated data, and names the per-batch directory in the store, so it
/// must be a single safe path component.
///
/// # Examples
///
/// ```
/// use medvault::domain::ids::BatchId;
/// use std::str::FromStr;
///
/// let batch_id = BatchId::from_str("batch_1718000000").unwrap();
/// assert_eq!(batch_id.as_str(), "batch_1718000000");
/// assert!(BatchId::new("../escape").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchId(String);

impl BatchId {
    /// Creates a new BatchId from a string
    pub fn new(id: impl Into<String>) -> Result<Self, String> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err("Batch ID cannot be empty".to_string());
        }
        if id == "." || id == ".." || id.contains(['/', '\\']) {
            return Err(format!(
                "Batch ID must be a single path component, got: {id}"
            ));
        }
        Ok(Self(id))
    }

    /// Generates a batch id from the current wall-clock time (`batch_<unix seconds>`)
    pub fn generate() -> Self {
        Self(format!("batch_{}", chrono::Utc::now().timestamp()))
    }

    /// Returns the batch ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes self and returns the inner String
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BatchId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for BatchId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Hex-encoded SHA-256 content hash
///
/// Always 64 lowercase hex characters. Used as the address of a blob in the
/// content-addressable store.
///
/// # Examples
///
/// ```
/// use medvault::domain::ids::ContentHash;
///
/// let hash = ContentHash::of_bytes(b"hello");
/// assert_eq!(hash.as_str().len(), 64);
/// assert_eq!(hash.shard(), &hash.as_str()[..2]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash(String);

impl ContentHash {
    /// Parses a hex digest, normalizing to lower case
    pub fn new(hex_digest: impl Into<String>) -> Result<Self, String> {
        let digest = hex_digest.into().to_ascii_lowercase();
        if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(format!(
                "Content hash must be 64 hex characters, got: {digest}"
            ));
        }
        Ok(Self(digest))
    }

    /// Computes the SHA-256 content hash of a byte slice
    pub fn of_bytes(data: &[u8]) -> Self {
        Self(crate::protection::checksum::sha256_hex(data))
    }

    /// Returns the hash as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes self and returns the hex digest
    pub fn into_string(self) -> String {
        self.0
    }

    /// First two hex characters, used as the shard directory
    pub fn shard(&self) -> &str {
        &self.0[..2]
    }

    /// Remaining hex characters, used as the blob file name
    pub fn remainder(&self) -> &str {
        &self.0[2..]
    }

    /// Location of this blob under a CAS root (`<root>/<hh>/<rest>`)
    pub fn path_under(&self, cas_root: &Path) -> PathBuf {
        cas_root.join(self.shard()).join(self.remainder())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ContentHash {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ContentHash {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.0
    }
}

impl AsRef<str> for ContentHash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
