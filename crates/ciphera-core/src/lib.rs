//! Domain model shared by Ciphera gateways and verifier nodes.
//!
//! This crate provides:
//! - Credential issuance records and their transition history
//! - Revocation events and the revoked sets exchanged during reconciliation
//! - Node views held by the health monitor
//! - The protocol error taxonomy, clock abstraction and core configuration
//!
//! Core invariants:
//! - Credentials are immutable after issuance; status changes are transitions
//! - Revocation events are created once and re-applied idempotently
//! - `REVOKED` and `EXPIRED` are terminal; revocation overrides expiry
//!
#![deny(missing_docs)]

/// Ledger event kinds written by the core.
pub mod audit;
/// Wall-clock abstraction.
pub mod clock;
/// Core configuration surface.
pub mod config;
/// Credential records and transitions.
pub mod credential;
/// Protocol error taxonomy.
pub mod errors;
/// Node views and reconciliation payloads.
pub mod node;
/// Revocation events.
pub mod revocation;
/// Serde helpers for durations.
pub mod serde_duration;

pub use audit::AuditKind;
pub use clock::{elapsed_exceeds, Clock, ManualClock, SharedClock, SystemClock};
pub use config::{BackoffSchedule, ConfigError, CoreConfig};
pub use credential::{Credential, CredentialRecord, CredentialStatus, Transition, VerifyStatus};
pub use errors::ProtocolError;
pub use node::{Ack, NodeView, RevokedSet};
pub use revocation::RevocationEvent;
