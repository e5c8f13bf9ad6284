use std::time::Duration;

use chrono::{DateTime, Utc};
use ciphera_canonical::{CredentialId, NodeId, SessionId, SubjectId};
use ciphera_core::elapsed_exceeds;
use serde::{Deserialize, Serialize};

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    /// Usable.
    Active,
    /// Timed out; terminal.
    Expired,
    /// Credential revoked; terminal.
    Revoked,
}

/// Why a session left `ACTIVE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// No activity for longer than the idle timeout.
    IdleTimeout,
    /// Older than the absolute timeout.
    AbsoluteTimeout,
    /// The backing credential was revoked.
    CredentialRevoked,
}

/// An authenticated session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Session id, also the opaque session token.
    pub session_id: SessionId,
    /// Authenticated subject.
    pub subject_id: SubjectId,
    /// Credential the session was opened with.
    pub credential_id: CredentialId,
    /// Node that verified the subject.
    pub node_id: NodeId,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last successful touch.
    pub last_activity_at: DateTime<Utc>,
    /// Inactivity limit.
    #[serde(with = "ciphera_core::serde_duration")]
    pub idle_timeout: Duration,
    /// Lifetime limit.
    #[serde(with = "ciphera_core::serde_duration")]
    pub absolute_timeout: Duration,
    /// Current state.
    pub state: SessionState,
    /// When the session left `ACTIVE`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    /// Why the session left `ACTIVE`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_reason: Option<EndReason>,
}

impl Session {
    /// The timeout that has elapsed at `now`, if any. Absolute wins when both have.
    pub fn expiry_due(&self, now: DateTime<Utc>) -> Option<EndReason> {
        if elapsed_exceeds(now, self.created_at, self.absolute_timeout) {
            Some(EndReason::AbsoluteTimeout)
        } else if elapsed_exceeds(now, self.last_activity_at, self.idle_timeout) {
            Some(EndReason::IdleTimeout)
        } else {
            None
        }
    }

    /// Whether the session is active and within both timeouts at `now`.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.state == SessionState::Active && self.expiry_due(now).is_none()
    }

    pub(crate) fn end(&mut self, state: SessionState, reason: EndReason, at: DateTime<Utc>) {
        self.state = state;
        self.ended_at = Some(at);
        self.end_reason = Some(reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};

    fn session() -> Session {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        Session {
            session_id: SessionId::parse("s1").unwrap(),
            subject_id: SubjectId::parse("alice@example.org").unwrap(),
            credential_id: CredentialId::parse("c1").unwrap(),
            node_id: NodeId::parse("node1").unwrap(),
            created_at: t0,
            last_activity_at: t0,
            idle_timeout: Duration::from_secs(15 * 60),
            absolute_timeout: Duration::from_secs(60 * 60),
            state: SessionState::Active,
            ended_at: None,
            end_reason: None,
        }
    }

    #[test]
    fn idle_boundary_is_exclusive() {
        let s = session();
        assert_eq!(s.expiry_due(s.created_at + TimeDelta::minutes(15)), None);
        assert_eq!(
            s.expiry_due(s.created_at + TimeDelta::minutes(15) + TimeDelta::milliseconds(1)),
            Some(EndReason::IdleTimeout)
        );
    }

    #[test]
    fn absolute_timeout_ignores_activity() {
        let mut s = session();
        s.last_activity_at = s.created_at + TimeDelta::minutes(59);
        assert_eq!(
            s.expiry_due(s.created_at + TimeDelta::minutes(61)),
            Some(EndReason::AbsoluteTimeout)
        );
    }

    #[test]
    fn terminal_sessions_are_not_usable() {
        let mut s = session();
        assert!(s.is_usable(s.created_at));
        s.end(SessionState::Revoked, EndReason::CredentialRevoked, s.created_at);
        assert!(!s.is_usable(s.created_at));
    }
}
