use ciphera_canonical::{EventId, NodeId};
use thiserror::Error;

/// Protocol-level failures shared by nodes, the propagator and the gateway.
///
/// `AlreadyRevoked`/`AlreadyExpired` are outcomes, not errors, and live on the
/// store's outcome enums instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Unknown credential or session.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// What was looked up (`credential`, `session`, `node`).
        kind: &'static str,
        /// Identifier that was not found.
        id: String,
    },
    /// Propagation missed its deadline; retries continue.
    #[error("revocation {event_id} is overdue on {} node(s)", pending.len())]
    Overdue {
        /// Revocation event past its deadline.
        event_id: EventId,
        /// Nodes that have not acknowledged it.
        pending: Vec<NodeId>,
    },
    /// Node is marked down by the health monitor.
    #[error("node {0} is unreachable")]
    Unreachable(NodeId),
    /// Ledger verification failed; the audit trail of this node must be re-derived.
    #[error("audit chain broken at index {index} on node {node_id}")]
    ChainBroken {
        /// Node whose ledger is broken.
        node_id: NodeId,
        /// First broken index.
        index: u64,
    },
    /// Transport-level timeout.
    #[error("request to {node_id} timed out")]
    Timeout {
        /// Target node.
        node_id: NodeId,
    },
    /// The remote node refused or failed the request.
    #[error("node {node_id} rejected request: {reason}")]
    Rejected {
        /// Target node.
        node_id: NodeId,
        /// Failure description.
        reason: String,
    },
}

impl ProtocolError {
    /// Whether the failure should be retried with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProtocolError::Timeout { .. } | ProtocolError::Unreachable(_) | ProtocolError::Rejected { .. }
        )
    }

    /// Whether the failure must be surfaced to an operator.
    pub fn is_operator_visible(&self) -> bool {
        matches!(self, ProtocolError::ChainBroken { .. } | ProtocolError::Overdue { .. })
    }
}
