use ciphera_canonical::EventType;

/// Security-relevant events written to a node's ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditKind {
    /// Credential issued or replicated to this node.
    Issue,
    /// Credential revoked.
    Revoke,
    /// Credential reached its TTL.
    Expire,
    /// Session opened after authentication.
    SessionOpen,
    /// Session hit its idle or absolute timeout.
    SessionExpire,
    /// Session terminated because its credential was revoked.
    SessionRevoke,
}

impl AuditKind {
    /// Every kind, in declaration order.
    pub const ALL: [AuditKind; 6] = [
        AuditKind::Issue,
        AuditKind::Revoke,
        AuditKind::Expire,
        AuditKind::SessionOpen,
        AuditKind::SessionExpire,
        AuditKind::SessionRevoke,
    ];

    /// Ledger event type string.
    pub fn as_str(self) -> &'static str {
        match self {
            AuditKind::Issue => "ISSUE",
            AuditKind::Revoke => "REVOKE",
            AuditKind::Expire => "EXPIRE",
            AuditKind::SessionOpen => "SESSION_OPEN",
            AuditKind::SessionExpire => "SESSION_EXPIRE",
            AuditKind::SessionRevoke => "SESSION_REVOKE",
        }
    }

    /// Ledger event type.
    pub fn event_type(self) -> EventType {
        EventType::new(self.as_str().to_string())
    }

    /// Reverse lookup from a ledger event type.
    pub fn from_event_type(event_type: &EventType) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == event_type.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_types_are_valid_identifiers() {
        for kind in AuditKind::ALL {
            let parsed = EventType::parse(kind.as_str()).unwrap();
            assert_eq!(AuditKind::from_event_type(&parsed), Some(kind));
        }
    }
}
