//! Session registry for Ciphera nodes.
//!
//! Sessions move from `ACTIVE` to `EXPIRED` (idle or absolute timeout) or to
//! `REVOKED` (credential revoked). Both are terminal. Expiry is evaluated on
//! every access through [`SessionRegistry::touch`] and
//! [`SessionRegistry::check`]; [`SessionRegistry::sweep`] only cleans up.

#![deny(missing_docs)]

/// Error types for session operations.
pub mod errors;
/// The registry.
pub mod registry;
/// Session record types.
pub mod types;

pub use errors::SessionError;
pub use registry::{SessionRegistry, SweepReport};
pub use types::{EndReason, Session, SessionState};
