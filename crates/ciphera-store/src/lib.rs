//! Credential record store for a single Ciphera node.
//!
//! This crate provides:
//! - [`CredentialStore`], holding credential records and the node's revoked set
//! - Mutations that commit together with their ledger entry
//! - Revocation tombstones for credentials that have not arrived yet
//! - Record filtering for listings
//!
//! Lock order is store, then ledger writer. Every successful mutation appends
//! exactly one ledger entry while the store lock is held, so a reader never
//! observes a status change whose entry is missing, or the reverse.

#![deny(missing_docs)]

/// Error types for store operations.
pub mod error;
/// Record filtering API.
pub mod filter;
/// Mutation outcomes.
pub mod outcome;
/// The store itself.
pub mod store;

pub use error::StoreError;
pub use filter::{AndFilter, OwnerFilter, RecordFilter, StatusFilter, SubjectFilter};
pub use outcome::{ExpireOutcome, PutOutcome, RevokeOutcome};
pub use store::CredentialStore;
