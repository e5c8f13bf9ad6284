use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use ciphera_canonical::{CredentialId, NodeId, SessionId, SubjectId};
use ciphera_core::{elapsed_exceeds, AuditKind, CoreConfig, SharedClock};
use ciphera_ledger::Ledger;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, instrument};

use crate::errors::SessionError;
use crate::types::{EndReason, Session, SessionState};

/// Result of a cleanup sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Sessions moved to `EXPIRED` by this sweep.
    pub expired: usize,
    /// Terminal sessions dropped after the retention window.
    pub purged: usize,
}

/// Sessions of one node.
///
/// Each session lives in its own map shard entry; a check holds that entry
/// while it evaluates the timeouts and appends any resulting ledger entry, so
/// two concurrent touches cannot both decide differently.
pub struct SessionRegistry {
    node_id: NodeId,
    ledger: Arc<Ledger>,
    clock: SharedClock,
    sessions: DashMap<SessionId, Session>,
    idle_timeout: Duration,
    absolute_timeout: Duration,
    retention: Duration,
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("node_id", &self.node_id)
            .field("sessions", &self.sessions.len())
            .finish()
    }
}

impl SessionRegistry {
    /// Creates an empty registry using the timeouts from `config`.
    pub fn new(node_id: NodeId, ledger: Arc<Ledger>, clock: SharedClock, config: &CoreConfig) -> Self {
        Self {
            node_id,
            ledger,
            clock,
            sessions: DashMap::new(),
            idle_timeout: config.idle_timeout,
            absolute_timeout: config.absolute_timeout,
            retention: config.session_retention,
        }
    }

    /// Opens a session after a successful authentication.
    #[instrument(skip(self))]
    pub fn open(
        &self,
        subject_id: SubjectId,
        credential_id: CredentialId,
        node_id: NodeId,
    ) -> Result<Session, SessionError> {
        let now = self.clock.now();
        let mut session = Session {
            session_id: SessionId::generate(),
            subject_id,
            credential_id,
            node_id,
            created_at: now,
            last_activity_at: now,
            idle_timeout: self.idle_timeout,
            absolute_timeout: self.absolute_timeout,
            state: SessionState::Active,
            ended_at: None,
            end_reason: None,
        };

        loop {
            match self.sessions.entry(session.session_id.clone()) {
                Entry::Vacant(slot) => {
                    let payload = json!({
                        "session_id": session.session_id,
                        "subject_id": session.subject_id,
                        "credential_id": session.credential_id,
                        "node_id": session.node_id,
                    });
                    self.ledger
                        .append_with(&AuditKind::SessionOpen.event_type(), &payload, |_| {
                            slot.insert(session.clone());
                        })?;
                    break;
                }
                Entry::Occupied(_) => session.session_id = SessionId::generate(),
            }
        }
        info!(node_id = %self.node_id, session_id = %session.session_id, "session opened");
        Ok(session)
    }

    /// Checks both timeouts and extends the session.
    ///
    /// This is the only path that extends `last_activity_at`. An expired
    /// session is transitioned and audited here and reported as
    /// [`SessionError::Expired`]; callers treat every error as "absent".
    pub fn touch(&self, session_id: &SessionId) -> Result<Session, SessionError> {
        self.access(session_id, true)
    }

    /// Checks both timeouts without extending the session.
    pub fn check(&self, session_id: &SessionId) -> Result<Session, SessionError> {
        self.access(session_id, false)
    }

    fn access(&self, session_id: &SessionId, extend: bool) -> Result<Session, SessionError> {
        let now = self.clock.now();
        let mut session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.clone()))?;

        match session.state {
            SessionState::Expired => return Err(SessionError::Expired(session_id.clone())),
            SessionState::Revoked => return Err(SessionError::Revoked(session_id.clone())),
            SessionState::Active => {}
        }

        if let Some(reason) = session.expiry_due(now) {
            self.end_locked(&mut session, SessionState::Expired, reason, now)?;
            return Err(SessionError::Expired(session_id.clone()));
        }

        if extend {
            // Concurrent touches: the latest time wins.
            session.last_activity_at = session.last_activity_at.max(now);
        }
        Ok(session.clone())
    }

    fn end_locked(
        &self,
        session: &mut Session,
        state: SessionState,
        reason: EndReason,
        at: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        let kind = match state {
            SessionState::Revoked => AuditKind::SessionRevoke,
            _ => AuditKind::SessionExpire,
        };
        let payload = json!({
            "session_id": session.session_id,
            "credential_id": session.credential_id,
            "node_id": self.node_id,
            "reason": reason,
        });
        self.ledger.append_with(&kind.event_type(), &payload, |_| {
            session.end(state, reason, at);
        })?;
        debug!(session_id = %session.session_id, ?reason, "session ended");
        Ok(())
    }

    /// Revokes every active session opened with `credential_id`.
    ///
    /// Returns the ids of the sessions revoked by this call.
    pub fn revoke_for_credential(
        &self,
        credential_id: &CredentialId,
    ) -> Result<Vec<SessionId>, SessionError> {
        let now = self.clock.now();
        let candidates: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|s| &s.credential_id == credential_id && s.state == SessionState::Active)
            .map(|s| s.session_id.clone())
            .collect();

        let mut revoked = Vec::with_capacity(candidates.len());
        for id in candidates {
            let Some(mut session) = self.sessions.get_mut(&id) else {
                continue;
            };
            if session.state != SessionState::Active {
                continue;
            }
            self.end_locked(&mut session, SessionState::Revoked, EndReason::CredentialRevoked, now)?;
            revoked.push(id);
        }
        if !revoked.is_empty() {
            info!(
                node_id = %self.node_id,
                credential_id = %credential_id,
                count = revoked.len(),
                "sessions revoked with credential"
            );
        }
        Ok(revoked)
    }

    /// Expires overdue sessions and purges terminal ones past retention.
    ///
    /// Correctness never depends on this running; it only bounds memory.
    pub fn sweep(&self) -> Result<SweepReport, SessionError> {
        let now = self.clock.now();
        let mut report = SweepReport::default();

        let ids: Vec<SessionId> = self.sessions.iter().map(|s| s.key().clone()).collect();
        for id in ids {
            let Some(mut session) = self.sessions.get_mut(&id) else {
                continue;
            };
            if session.state != SessionState::Active {
                continue;
            }
            if let Some(reason) = session.expiry_due(now) {
                self.end_locked(&mut session, SessionState::Expired, reason, now)?;
                report.expired += 1;
            }
        }

        let before = self.sessions.len();
        let retention = self.retention;
        self.sessions.retain(|_, s| match s.ended_at {
            Some(ended_at) => !elapsed_exceeds(now, ended_at, retention),
            None => true,
        });
        report.purged = before.saturating_sub(self.sessions.len());

        if report.expired > 0 || report.purged > 0 {
            debug!(node_id = %self.node_id, expired = report.expired, purged = report.purged, "session sweep");
        }
        Ok(report)
    }

    /// Sessions usable right now.
    pub fn active_count(&self) -> usize {
        let now = self.clock.now();
        self.sessions.iter().filter(|s| s.is_usable(now)).count()
    }

    /// Total sessions held, including terminal ones awaiting purge.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no sessions are held.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ciphera_core::ManualClock;

    fn registry() -> (SessionRegistry, Arc<ManualClock>, Arc<Ledger>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap(),
        ));
        let ledger = Arc::new(Ledger::in_memory(clock.clone()));
        let registry = SessionRegistry::new(
            NodeId::parse("gateway").unwrap(),
            ledger.clone(),
            clock.clone(),
            &CoreConfig::default(),
        );
        (registry, clock, ledger)
    }

    fn open(registry: &SessionRegistry, credential: &str) -> Session {
        registry
            .open(
                SubjectId::parse("alice@example.org").unwrap(),
                CredentialId::parse(credential).unwrap(),
                NodeId::parse("node1").unwrap(),
            )
            .unwrap()
    }

    #[test]
    fn touch_extends_activity() {
        let (registry, clock, _) = registry();
        let session = open(&registry, "c1");
        clock.advance(Duration::from_secs(600));
        let touched = registry.touch(&session.session_id).unwrap();
        assert_eq!(touched.last_activity_at, session.created_at + chrono::TimeDelta::minutes(10));
    }

    #[test]
    fn check_does_not_extend() {
        let (registry, clock, _) = registry();
        let session = open(&registry, "c1");
        clock.advance(Duration::from_secs(600));
        let checked = registry.check(&session.session_id).unwrap();
        assert_eq!(checked.last_activity_at, session.created_at);
    }

    #[test]
    fn expiry_is_audited_once() {
        let (registry, clock, ledger) = registry();
        let session = open(&registry, "c1");
        clock.advance(Duration::from_secs(16 * 60));

        assert!(matches!(
            registry.touch(&session.session_id),
            Err(SessionError::Expired(_))
        ));
        assert!(matches!(
            registry.touch(&session.session_id),
            Err(SessionError::Expired(_))
        ));
        let kinds: Vec<_> = ledger
            .entries(..)
            .iter()
            .filter_map(|e| AuditKind::from_event_type(&e.event_type))
            .collect();
        assert_eq!(kinds, vec![AuditKind::SessionOpen, AuditKind::SessionExpire]);
    }

    #[test]
    fn revocation_ends_only_matching_sessions() {
        let (registry, _, _) = registry();
        let a = open(&registry, "c1");
        let b = open(&registry, "c1");
        let other = open(&registry, "c2");

        let mut revoked = registry
            .revoke_for_credential(&CredentialId::parse("c1").unwrap())
            .unwrap();
        revoked.sort();
        let mut expected = vec![a.session_id.clone(), b.session_id.clone()];
        expected.sort();
        assert_eq!(revoked, expected);

        assert!(matches!(registry.touch(&a.session_id), Err(SessionError::Revoked(_))));
        assert!(registry.touch(&other.session_id).is_ok());
        assert_eq!(registry.active_count(), 1);
        assert!(registry
            .revoke_for_credential(&CredentialId::parse("c1").unwrap())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn sweep_expires_then_purges() {
        let (registry, clock, _) = registry();
        open(&registry, "c1");
        clock.advance(Duration::from_secs(20 * 60));
        assert_eq!(registry.active_count(), 0);

        let report = registry.sweep().unwrap();
        assert_eq!(report, SweepReport { expired: 1, purged: 0 });
        assert_eq!(registry.len(), 1);

        clock.advance(Duration::from_secs(25 * 60 * 60));
        let report = registry.sweep().unwrap();
        assert_eq!(report, SweepReport { expired: 0, purged: 1 });
        assert!(registry.is_empty());
    }

    #[test]
    fn unknown_session_requires_reauthentication() {
        let (registry, _, _) = registry();
        let err = registry.touch(&SessionId::parse("missing").unwrap()).unwrap_err();
        assert!(err.requires_reauthentication());
    }
}
