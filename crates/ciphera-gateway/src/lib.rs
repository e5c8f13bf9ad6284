//! Gateway coordinator for Ciphera.
//!
//! The gateway is the single entry point for credential lifecycle requests.
//! It runs its own [`VerifierNode`](ciphera_node::VerifierNode), which is the
//! origin of every revocation and the authoritative revoked set that
//! verifier nodes reconcile against.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use ciphera_canonical::{Actor, NodeId, SubjectId};
//! use ciphera_core::{CoreConfig, SystemClock};
//! use ciphera_gateway::{GatewayCoordinator, IssueDecision};
//! use ciphera_node::{InMemoryNetwork, VerifierNode};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CoreConfig::default();
//! let net = Arc::new(InMemoryNetwork::new(Duration::from_millis(35)));
//! let gateway = Arc::new(VerifierNode::in_memory(
//!     NodeId::parse("gateway")?,
//!     Arc::new(SystemClock),
//!     &config,
//! ));
//! net.register(gateway.clone());
//!
//! let coordinator = Arc::new(GatewayCoordinator::new(
//!     gateway,
//!     net.clone(),
//!     Arc::new(SystemClock),
//!     config,
//! ));
//! let _tasks = coordinator.start();
//!
//! if let IssueDecision::Issued { credential, .. } =
//!     coordinator.issue(SubjectId::parse("alice@example.org")?, true).await?
//! {
//!     coordinator.revoke(&credential.credential_id, Actor::parse("admin")?).await?;
//! }
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]

/// The coordinator.
pub mod coordinator;
/// Request outcomes.
pub mod decision;
/// Error types for gateway operations.
pub mod errors;
/// Rate limiting seam.
pub mod limiter;

pub use coordinator::{GatewayCoordinator, GatewayTasks};
pub use decision::{AuthDecision, BiometricVote, DenyReason, IssueDecision, RevokeDecision};
pub use errors::GatewayError;
pub use limiter::{RateLimiter, Unlimited};
