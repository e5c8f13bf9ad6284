use std::sync::Arc;

use async_trait::async_trait;
use ciphera_canonical::{CredentialId, NodeId};
use ciphera_core::{Ack, Credential, ProtocolError, RevocationEvent, RevokedSet, VerifyStatus};
use serde::{Deserialize, Serialize};

/// Reply to a heartbeat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    /// Responding node.
    pub node_id: NodeId,
    /// Sequence number of the node's ledger tail.
    pub ledger_seq: Option<u64>,
}

/// Request/response calls between the gateway and verifier nodes.
///
/// Implementations never apply timeouts themselves; callers bound every
/// call with `tokio::time::timeout`. A lost request may therefore never
/// complete.
#[async_trait]
pub trait NodeTransport: Send + Sync {
    /// Delivers a revocation; the node acks after it is durably applied.
    async fn push(&self, node: &NodeId, event: &RevocationEvent) -> Result<Ack, ProtocolError>;

    /// Fetches the node's applied revocations.
    async fn pull(&self, node: &NodeId) -> Result<RevokedSet, ProtocolError>;

    /// Liveness probe.
    async fn heartbeat(&self, node: &NodeId) -> Result<Heartbeat, ProtocolError>;

    /// Stores a newly issued credential on the node.
    async fn replicate(&self, node: &NodeId, credential: &Credential) -> Result<(), ProtocolError>;

    /// Asks the node for a credential's status.
    async fn verify(
        &self,
        node: &NodeId,
        credential_id: &CredentialId,
    ) -> Result<VerifyStatus, ProtocolError>;
}

/// Shared transport handle.
pub type SharedTransport = Arc<dyn NodeTransport>;
