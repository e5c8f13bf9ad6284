use ciphera_canonical::HashError;
use ciphera_node::{NodeError, PropagationError};
use ciphera_sessions::SessionError;
use ciphera_store::StoreError;
use thiserror::Error;

/// Errors raised while serving a gateway request.
///
/// Outcomes such as a denied issuance or an unknown credential are not
/// errors; they are reported through the decision types.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// The gateway's own node failed.
    #[error("gateway node error: {0}")]
    Node(#[from] NodeError),

    /// The gateway's credential store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The gateway's session registry failed.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Publishing a revocation failed.
    #[error("propagation error: {0}")]
    Propagation(#[from] PropagationError),

    /// The credential content hash could not be computed.
    #[error("hash error: {0}")]
    Hash(#[from] HashError),
}
