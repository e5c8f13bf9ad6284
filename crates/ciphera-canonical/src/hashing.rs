//! Domain-separated hashing.
//!
//! Content hashes are computed as `sha256(domain_separator || canonical_bytes(value))`
//! so a digest produced for one purpose can never be replayed as another.

use serde::Serialize;
use sha2::{Digest as Sha2Digest, Sha256};

use crate::canonicalizer::{canonical_bytes_of, CanonicalizationError};
use crate::digest::Digest;

/// Error during content hashing.
#[derive(thiserror::Error, Debug)]
pub enum HashError {
    /// Canonicalization failed.
    #[error("canonicalization failed: {0}")]
    Canonicalization(#[from] CanonicalizationError),
}

/// Hashes `bytes` under a domain separator.
pub fn hash_with_domain(domain: &[u8], bytes: &[u8]) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update(domain);
    hasher.update(bytes);
    Digest::from_bytes(hasher.finalize().into())
}

/// Hashes the canonical JSON of `value` under a domain separator.
///
/// # Example
///
/// ```rust
/// use ciphera_canonical::content_hash;
/// use serde_json::json;
///
/// let a = content_hash(b"ciphera:test:v1\0", &json!({"x": 1, "y": 2}))?;
/// let b = content_hash(b"ciphera:test:v1\0", &json!({"y": 2, "x": 1}))?;
/// assert_eq!(a, b);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn content_hash<T: Serialize>(domain: &[u8], value: &T) -> Result<Digest, HashError> {
    let bytes = canonical_bytes_of(value)?;
    Ok(hash_with_domain(domain, &bytes))
}
