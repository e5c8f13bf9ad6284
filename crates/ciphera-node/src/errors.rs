use ciphera_canonical::{EventId, NodeId};
use ciphera_core::ProtocolError;
use ciphera_sessions::SessionError;
use ciphera_store::StoreError;
use thiserror::Error;

/// Errors raised by a verifier node handling a request.
#[derive(Error, Debug)]
pub enum NodeError {
    /// Credential store failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Session registry failure.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Remote call failure.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl NodeError {
    /// Wire form of the error as seen by a remote caller.
    pub fn into_protocol(self, node_id: &NodeId) -> ProtocolError {
        match self {
            NodeError::Protocol(e) => e,
            other => ProtocolError::Rejected {
                node_id: node_id.clone(),
                reason: other.to_string(),
            },
        }
    }
}

/// Errors raised by the propagator.
#[derive(Error, Debug)]
pub enum PropagationError {
    /// The event was never published here.
    #[error("unknown revocation event: {0}")]
    UnknownEvent(EventId),

    /// Remote call failure.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The origin store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl PropagationError {
    /// Builds the operator-visible overdue error.
    pub fn overdue(event_id: EventId, pending: Vec<NodeId>) -> Self {
        PropagationError::Protocol(ProtocolError::Overdue { event_id, pending })
    }

    /// Whether this is an overdue report.
    pub fn is_overdue(&self) -> bool {
        matches!(self, PropagationError::Protocol(ProtocolError::Overdue { .. }))
    }
}
