//! In-process transport.
//!
//! Every call sleeps for the configured one-way latency before reaching the
//! target node. A partitioned node never answers, and a node whose pushes are
//! dropped never answers pushes; callers observe both as timeouts.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ciphera_canonical::{CredentialId, NodeId};
use ciphera_core::{Ack, Credential, ProtocolError, RevocationEvent, RevokedSet, VerifyStatus};
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::trace;

use crate::node::VerifierNode;
use crate::transport::{Heartbeat, NodeTransport};

/// An in-memory network of verifier nodes.
#[derive(Default)]
pub struct InMemoryNetwork {
    nodes: DashMap<NodeId, Arc<VerifierNode>>,
    latency: RwLock<Duration>,
    partitioned: RwLock<HashSet<NodeId>>,
    drop_pushes: RwLock<HashSet<NodeId>>,
}

impl InMemoryNetwork {
    /// Creates an empty network with the given one-way latency.
    pub fn new(latency: Duration) -> Self {
        Self {
            latency: RwLock::new(latency),
            ..Self::default()
        }
    }

    /// Attaches a node.
    pub fn register(&self, node: Arc<VerifierNode>) {
        self.nodes.insert(node.node_id().clone(), node);
    }

    /// A registered node.
    pub fn node(&self, node_id: &NodeId) -> Option<Arc<VerifierNode>> {
        self.nodes.get(node_id).map(|n| n.value().clone())
    }

    /// Changes the one-way latency.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.write() = latency;
    }

    /// Cuts a node off; its calls never complete.
    pub fn partition(&self, node_id: &NodeId) {
        self.partitioned.write().insert(node_id.clone());
    }

    /// Reconnects a partitioned node.
    pub fn heal(&self, node_id: &NodeId) {
        self.partitioned.write().remove(node_id);
    }

    /// Loses every push sent to `node_id` until [`deliver_pushes`](Self::deliver_pushes).
    pub fn drop_pushes_to(&self, node_id: &NodeId) {
        self.drop_pushes.write().insert(node_id.clone());
    }

    /// Stops losing pushes to `node_id`.
    pub fn deliver_pushes(&self, node_id: &NodeId) {
        self.drop_pushes.write().remove(node_id);
    }

    async fn reach(&self, node_id: &NodeId) -> Result<Arc<VerifierNode>, ProtocolError> {
        let latency = *self.latency.read();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        let node = self
            .node(node_id)
            .ok_or_else(|| ProtocolError::Unreachable(node_id.clone()))?;
        let partitioned = self.partitioned.read().contains(node_id);
        if partitioned {
            trace!(node_id = %node_id, "request lost to partition");
            std::future::pending::<()>().await;
        }
        Ok(node)
    }
}

#[async_trait]
impl NodeTransport for InMemoryNetwork {
    async fn push(&self, node: &NodeId, event: &RevocationEvent) -> Result<Ack, ProtocolError> {
        let dropped = self.drop_pushes.read().contains(node);
        if dropped {
            trace!(node_id = %node, event_id = %event.event_id, "push lost");
            std::future::pending::<()>().await;
        }
        let target = self.reach(node).await?;
        target.on_receive(event).map_err(|e| e.into_protocol(node))
    }

    async fn pull(&self, node: &NodeId) -> Result<RevokedSet, ProtocolError> {
        let target = self.reach(node).await?;
        Ok(target.revoked_set())
    }

    async fn heartbeat(&self, node: &NodeId) -> Result<Heartbeat, ProtocolError> {
        let target = self.reach(node).await?;
        Ok(target.heartbeat())
    }

    async fn replicate(&self, node: &NodeId, credential: &Credential) -> Result<(), ProtocolError> {
        let target = self.reach(node).await?;
        target
            .accept_credential(credential.clone())
            .map(|_| ())
            .map_err(|e| e.into_protocol(node))
    }

    async fn verify(
        &self,
        node: &NodeId,
        credential_id: &CredentialId,
    ) -> Result<VerifyStatus, ProtocolError> {
        let target = self.reach(node).await?;
        target.verify(credential_id).map_err(|e| e.into_protocol(node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ciphera_core::{CoreConfig, SystemClock};

    fn network() -> (InMemoryNetwork, NodeId) {
        let net = InMemoryNetwork::new(Duration::from_millis(35));
        let id = NodeId::parse("node1").unwrap();
        net.register(Arc::new(VerifierNode::in_memory(
            id.clone(),
            Arc::new(SystemClock),
            &CoreConfig::default(),
        )));
        (net, id)
    }

    #[tokio::test(start_paused = true)]
    async fn calls_pay_latency() {
        let (net, id) = network();
        let start = tokio::time::Instant::now();
        let beat = net.heartbeat(&id).await.unwrap();
        assert_eq!(beat.node_id, id);
        assert_eq!(start.elapsed(), Duration::from_millis(35));
    }

    #[tokio::test(start_paused = true)]
    async fn partitioned_node_never_answers() {
        let (net, id) = network();
        net.partition(&id);
        let result = tokio::time::timeout(Duration::from_secs(5), net.pull(&id)).await;
        assert!(result.is_err());
        net.heal(&id);
        assert!(net.pull(&id).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_node_is_unreachable() {
        let (net, _) = network();
        let other = NodeId::parse("node9").unwrap();
        assert_eq!(
            net.heartbeat(&other).await.unwrap_err(),
            ProtocolError::Unreachable(other)
        );
    }
}
