use serde::Serialize;

/// Result of storing a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PutOutcome {
    /// Stored as active.
    Stored,
    /// Stored, and immediately revoked by a tombstone that arrived first.
    StoredRevoked,
    /// The identical credential was already stored.
    Duplicate,
}

/// Result of a revocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RevokeOutcome {
    /// Status changed to revoked.
    Applied,
    /// Already revoked; nothing changed.
    AlreadyRevoked,
    /// Credential unknown. A revocation event is still kept as a tombstone.
    NotFound,
}

impl RevokeOutcome {
    /// Whether the revocation is now in effect on this node.
    pub fn is_effective(self) -> bool {
        matches!(self, RevokeOutcome::Applied | RevokeOutcome::AlreadyRevoked)
    }
}

/// Result of an expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpireOutcome {
    /// Status changed to expired.
    Applied,
    /// Already expired; nothing changed.
    AlreadyExpired,
    /// Revoked credentials never move to expired.
    AlreadyRevoked,
    /// Credential unknown.
    NotFound,
}
