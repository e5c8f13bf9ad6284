use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use ciphera_canonical::{CredentialId, EventId, NodeId};
use serde::{Deserialize, Serialize};

use crate::revocation::RevocationEvent;

/// Health monitor's transient view of a node. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeView {
    /// Node identifier.
    pub node_id: NodeId,
    /// Last successful heartbeat.
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    /// Ledger sequence reported by the node at its last reconciliation.
    pub last_synced_seq: Option<u64>,
    /// Whether the node currently receives pushes.
    pub reachable: bool,
    /// Consecutive missed heartbeats.
    pub missed_heartbeats: u32,
}

impl NodeView {
    /// A freshly registered node, assumed reachable until proven otherwise.
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            last_heartbeat_at: None,
            last_synced_seq: None,
            reachable: true,
            missed_heartbeats: 0,
        }
    }
}

/// Acknowledgment that a node durably applied a revocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    /// Acknowledging node.
    pub node_id: NodeId,
    /// Applied event.
    pub event_id: EventId,
    /// Node ledger length after applying, for sync tracking.
    pub ledger_seq: Option<u64>,
}

/// Revocations a node has applied, reported on `pull`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevokedSet {
    /// Reporting node.
    pub node_id: NodeId,
    /// Applied revocation events.
    pub events: Vec<RevocationEvent>,
    /// Sequence number of the node's ledger tail.
    pub ledger_seq: Option<u64>,
}

impl RevokedSet {
    /// Credentials covered by the set.
    pub fn credential_ids(&self) -> BTreeSet<&CredentialId> {
        self.events.iter().map(|e| &e.credential_id).collect()
    }

    /// Whether the credential of `event` is covered.
    pub fn covers(&self, event: &RevocationEvent) -> bool {
        self.events
            .iter()
            .any(|e| e.credential_id == event.credential_id)
    }

    /// Events in `authoritative` that this set does not cover.
    pub fn missing_from<'a>(&self, authoritative: &'a RevokedSet) -> Vec<&'a RevocationEvent> {
        let have = self.credential_ids();
        authoritative
            .events
            .iter()
            .filter(|e| !have.contains(&e.credential_id))
            .collect()
    }
}
