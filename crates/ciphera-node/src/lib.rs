//! Verifier node runtime for Ciphera.
//!
//! This crate provides:
//! - [`VerifierNode`], bundling a node's ledger, credential store and session registry
//! - The [`NodeTransport`] seam and an [`InMemoryNetwork`] with latency, push
//!   loss and partitions for tests and simulation
//! - [`HealthMonitor`], turning heartbeats into reachability
//! - [`Propagator`], the push/pull revocation protocol with deadlines
//!
//! Every revocation published at the origin reaches a reachable node within
//! `propagation_deadline + reconciliation_interval`, through a push or, if all
//! pushes are lost, through a reconciliation pull. Events that miss their
//! deadline stay visible as overdue and keep being retried.

#![deny(missing_docs)]

/// Error types for node, transport and propagation operations.
pub mod errors;
/// Node health monitoring.
pub mod health;
/// In-memory transport.
pub mod memory;
/// The verifier node.
pub mod node;
/// Revocation propagation.
pub mod propagator;
/// Retry with backoff.
pub mod retry;
/// Transport seam.
pub mod transport;

pub use errors::{NodeError, PropagationError};
pub use health::{HealthEvent, HealthMonitor};
pub use memory::InMemoryNetwork;
pub use node::VerifierNode;
pub use propagator::{
    DeliveryState, PropagationAlert, PropagationStatus, Propagator, ReconcileReport,
    RETAINED_CONVERGED,
};
pub use retry::{retry_with_backoff, RetryResult};
pub use transport::{Heartbeat, NodeTransport, SharedTransport};
