use std::fmt;
use std::sync::OnceLock;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest as Sha2Digest, Sha256};

use crate::validation::ValidationError;

/// Length in bytes of a SHA-256 digest.
pub const DIGEST_LEN: usize = 32;

/// Supported digest algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DigestAlg {
    /// SHA-256 (the only algorithm in use).
    #[serde(rename = "sha-256")]
    Sha256,
}

/// Algorithm + bytes digest, encoded as base64url without padding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Digest {
    /// Digest algorithm (currently always `sha-256`).
    pub alg: DigestAlg,
    /// Base64URL (no padding) digest bytes.
    #[serde(rename = "b64")]
    pub b64: String,
}

fn b64_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{43}$").expect("invalid regex"))
}

impl Digest {
    /// Constructs a validated digest from its base64url text.
    pub fn new(alg: DigestAlg, b64: impl Into<String>) -> Result<Self, ValidationError> {
        let b64 = b64.into();
        if !b64_pattern().is_match(&b64) {
            return Err(ValidationError::PatternMismatch {
                field: "digest",
                value: b64,
            });
        }
        Ok(Digest { alg, b64 })
    }

    /// Wraps raw digest bytes.
    pub fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        Digest {
            alg: DigestAlg::Sha256,
            b64: URL_SAFE_NO_PAD.encode(bytes),
        }
    }

    /// SHA-256 of `bytes` with no domain separation.
    pub fn sha256(bytes: &[u8]) -> Self {
        Self::from_bytes(Sha256::digest(bytes).into())
    }

    /// The all-zero digest that the first ledger entry links to.
    pub fn genesis() -> Self {
        Self::from_bytes([0u8; DIGEST_LEN])
    }

    /// Decodes the digest back into raw bytes.
    pub fn to_bytes(&self) -> Result<[u8; DIGEST_LEN], ValidationError> {
        let decoded =
            URL_SAFE_NO_PAD
                .decode(&self.b64)
                .map_err(|_| ValidationError::PatternMismatch {
                    field: "digest",
                    value: self.b64.clone(),
                })?;
        <[u8; DIGEST_LEN]>::try_from(decoded.as_slice()).map_err(|_| {
            ValidationError::InvalidLength {
                field: "digest",
                expected: DIGEST_LEN,
                actual: decoded.len(),
            }
        })
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sha-256:{}", self.b64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_is_all_zero() {
        assert_eq!(Digest::genesis().to_bytes().unwrap(), [0u8; DIGEST_LEN]);
    }

    #[test]
    fn rejects_malformed_b64() {
        assert!(Digest::new(DigestAlg::Sha256, "not a digest").is_err());
        assert!(Digest::new(DigestAlg::Sha256, "A".repeat(44)).is_err());
    }

    #[test]
    fn sha256_matches_known_vector() {
        // sha256("abc")
        let d = Digest::sha256(b"abc");
        assert_eq!(d.b64, "ungWv48Bz-pBQUDeXa4iI7ADYaOWF3qctBD_YfIAFa0");
        assert!(Digest::new(DigestAlg::Sha256, d.b64.clone()).is_ok());
    }

    #[test]
    fn serializes_with_alg_tag() {
        let json = serde_json::to_value(Digest::genesis()).unwrap();
        assert_eq!(json["alg"], "sha-256");
    }
}
