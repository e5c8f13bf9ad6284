use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use ciphera_canonical::{Actor, CredentialId, EventId, NodeId};
use serde::{Deserialize, Serialize};

/// A revocation created once at the origin and delivered to every node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationEvent {
    /// Unique event identifier.
    pub event_id: EventId,
    /// Credential being revoked.
    pub credential_id: CredentialId,
    /// Principal that requested the revocation.
    pub actor: Actor,
    /// Time the revocation was accepted at the origin.
    pub revoked_at: DateTime<Utc>,
    /// Node (usually the gateway) that created the event.
    pub origin_node: NodeId,
    /// Wall-clock time by which every reachable node should have applied it.
    pub propagation_deadline: DateTime<Utc>,
}

impl RevocationEvent {
    /// Creates an event with a fresh id; the deadline is `revoked_at + deadline`.
    pub fn new(
        credential_id: CredentialId,
        actor: Actor,
        origin_node: NodeId,
        revoked_at: DateTime<Utc>,
        deadline: Duration,
    ) -> Self {
        let propagation_deadline = TimeDelta::from_std(deadline)
            .ok()
            .and_then(|d| revoked_at.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            event_id: EventId::generate(),
            credential_id,
            actor,
            revoked_at,
            origin_node,
            propagation_deadline,
        }
    }

    /// Whether the deadline has passed at `now`.
    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        now > self.propagation_deadline
    }
}
