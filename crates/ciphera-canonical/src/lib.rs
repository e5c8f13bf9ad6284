//! Canonical primitives for Ciphera credentials, revocations and audit entries.
//!
//! Every value that participates in hashing lives in this crate:
//! - [`Digest`] - algorithm-tagged SHA-256 digests encoded as base64url
//! - Identifier newtypes ([`CredentialId`], [`NodeId`], [`EventType`], ...)
//! - RFC 8785 canonical JSON via [`canonical_bytes`]
//! - Domain-separated hashing via [`hash_with_domain`] and [`content_hash`]
//!
#![deny(missing_docs)]

/// Canonical JSON encoding for deterministic hashing.
pub mod canonicalizer;
/// Digest primitives.
pub mod digest;
/// Domain-separated hashing helpers.
pub mod hashing;
/// Identifier newtypes.
pub mod identifiers;
/// Validation errors for canonical primitives.
pub mod validation;

pub use canonicalizer::{canonical_bytes, canonical_bytes_of, CanonicalizationError};
pub use digest::{Digest, DigestAlg};
pub use hashing::{content_hash, hash_with_domain, HashError};
pub use identifiers::{Actor, CredentialId, EventId, EventType, NodeId, SessionId, SubjectId};
pub use validation::ValidationError;
