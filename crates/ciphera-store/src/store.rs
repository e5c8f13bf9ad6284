use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ciphera_canonical::{CredentialId, NodeId};
use ciphera_core::{
    AuditKind, Credential, CredentialRecord, CredentialStatus, RevocationEvent, RevokedSet,
    Transition,
};
use ciphera_ledger::Ledger;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::filter::RecordFilter;
use crate::outcome::{ExpireOutcome, PutOutcome, RevokeOutcome};

#[derive(Debug, Default)]
struct StoreState {
    records: HashMap<CredentialId, CredentialRecord>,
    /// Applied revocations by credential, including tombstones.
    revocations: BTreeMap<CredentialId, RevocationEvent>,
}

#[derive(Serialize)]
struct IssuePayload<'a> {
    node_id: &'a NodeId,
    credential: &'a Credential,
}

#[derive(Serialize)]
struct RevokePayload<'a> {
    node_id: &'a NodeId,
    credential_id: &'a CredentialId,
    revoked_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    event: Option<&'a RevocationEvent>,
    tombstone: bool,
}

#[derive(Serialize)]
struct ExpirePayload<'a> {
    node_id: &'a NodeId,
    credential_id: &'a CredentialId,
    expired_at: DateTime<Utc>,
}

/// Credential records of one node.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::time::Duration;
/// use chrono::Utc;
/// use ciphera_canonical::{CredentialId, NodeId, SubjectId};
/// use ciphera_core::{Credential, CredentialStatus, SystemClock};
/// use ciphera_ledger::Ledger;
/// use ciphera_store::{CredentialStore, RevokeOutcome};
///
/// let node = NodeId::parse("node1")?;
/// let ledger = Arc::new(Ledger::in_memory(Arc::new(SystemClock)));
/// let store = CredentialStore::new(node.clone(), ledger.clone());
///
/// let credential = Credential::issue(
///     CredentialId::parse("c1")?,
///     SubjectId::parse("alice@example.org")?,
///     node,
///     Utc::now(),
///     Duration::from_secs(3600),
/// )?;
/// store.put(credential)?;
///
/// let id = CredentialId::parse("c1")?;
/// assert_eq!(store.mark_revoked(&id, Utc::now())?, RevokeOutcome::Applied);
/// assert_eq!(store.mark_revoked(&id, Utc::now())?, RevokeOutcome::AlreadyRevoked);
/// assert_eq!(store.get(&id)?.status(), CredentialStatus::Revoked);
/// assert_eq!(ledger.len(), 2);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct CredentialStore {
    node_id: NodeId,
    ledger: Arc<Ledger>,
    state: RwLock<StoreState>,
}

impl CredentialStore {
    /// Creates an empty store that audits to `ledger`.
    pub fn new(node_id: NodeId, ledger: Arc<Ledger>) -> Self {
        Self {
            node_id,
            ledger,
            state: RwLock::new(StoreState::default()),
        }
    }

    /// Node owning this store.
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// Ledger this store audits to.
    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// Stores a newly issued or replicated credential.
    ///
    /// Storing the identical credential again is a no-op. If a revocation for
    /// the id arrived first, the credential is stored already revoked.
    pub fn put(&self, credential: Credential) -> Result<PutOutcome, StoreError> {
        if !credential.verify_content_hash()? {
            return Err(StoreError::ContentHashMismatch(credential.credential_id));
        }

        let mut state = self.state.write();
        let id = credential.credential_id.clone();
        if let Some(existing) = state.records.get(&id) {
            if existing.credential == credential {
                return Ok(PutOutcome::Duplicate);
            }
            warn!(node_id = %self.node_id, credential_id = %id, "conflicting credential rejected");
            return Err(StoreError::Conflict(id));
        }

        let payload = serde_json::to_value(IssuePayload {
            node_id: &self.node_id,
            credential: &credential,
        })?;
        self.ledger
            .append_with(&AuditKind::Issue.event_type(), &payload, |_| {
                state
                    .records
                    .insert(id.clone(), CredentialRecord::issued(credential));
            })?;
        debug!(node_id = %self.node_id, credential_id = %id, "credential stored");

        let Some(tombstone) = state.revocations.get(&id).cloned() else {
            return Ok(PutOutcome::Stored);
        };
        self.revoke_locked(&mut state, &id, tombstone.revoked_at, Some(&tombstone))?;
        info!(
            node_id = %self.node_id,
            credential_id = %id,
            event_id = %tombstone.event_id,
            "credential arrived after its revocation"
        );
        Ok(PutOutcome::StoredRevoked)
    }

    /// Current record of a credential.
    pub fn get(&self, credential_id: &CredentialId) -> Result<CredentialRecord, StoreError> {
        self.state
            .read()
            .records
            .get(credential_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(credential_id.clone()))
    }

    /// Whether a credential is known.
    pub fn contains(&self, credential_id: &CredentialId) -> bool {
        self.state.read().records.contains_key(credential_id)
    }

    /// Number of stored credentials.
    pub fn len(&self) -> usize {
        self.state.read().records.len()
    }

    /// Whether the store holds no credentials.
    pub fn is_empty(&self) -> bool {
        self.state.read().records.is_empty()
    }

    /// Revokes a credential without a propagated event. Idempotent.
    ///
    /// Revoking an expired credential is applied: revocation overrides expiry.
    pub fn mark_revoked(
        &self,
        credential_id: &CredentialId,
        at: DateTime<Utc>,
    ) -> Result<RevokeOutcome, StoreError> {
        let mut state = self.state.write();
        self.revoke_locked(&mut state, credential_id, at, None)
    }

    /// Applies a propagated revocation event. Idempotent.
    ///
    /// When the credential is unknown the event is kept as a tombstone and
    /// [`RevokeOutcome::NotFound`] is returned; redelivery then reports
    /// [`RevokeOutcome::AlreadyRevoked`].
    pub fn apply_revocation(&self, event: &RevocationEvent) -> Result<RevokeOutcome, StoreError> {
        let mut state = self.state.write();
        let id = &event.credential_id;

        if state.records.contains_key(id) {
            let outcome = self.revoke_locked(&mut state, id, event.revoked_at, Some(event))?;
            state
                .revocations
                .entry(id.clone())
                .or_insert_with(|| event.clone());
            return Ok(outcome);
        }

        if state.revocations.contains_key(id) {
            return Ok(RevokeOutcome::AlreadyRevoked);
        }

        let payload = serde_json::to_value(RevokePayload {
            node_id: &self.node_id,
            credential_id: id,
            revoked_at: event.revoked_at,
            event: Some(event),
            tombstone: true,
        })?;
        self.ledger
            .append_with(&AuditKind::Revoke.event_type(), &payload, |_| {
                state.revocations.insert(id.clone(), event.clone());
            })?;
        info!(
            node_id = %self.node_id,
            credential_id = %id,
            event_id = %event.event_id,
            "revocation recorded for unknown credential"
        );
        Ok(RevokeOutcome::NotFound)
    }

    fn revoke_locked(
        &self,
        state: &mut StoreState,
        credential_id: &CredentialId,
        at: DateTime<Utc>,
        event: Option<&RevocationEvent>,
    ) -> Result<RevokeOutcome, StoreError> {
        let Some(record) = state.records.get_mut(credential_id) else {
            return Ok(RevokeOutcome::NotFound);
        };
        if record.status() == CredentialStatus::Revoked {
            return Ok(RevokeOutcome::AlreadyRevoked);
        }

        let payload = serde_json::to_value(RevokePayload {
            node_id: &self.node_id,
            credential_id,
            revoked_at: at,
            event,
            tombstone: false,
        })?;
        let event_id = event.map(|e| e.event_id.clone());
        self.ledger
            .append_with(&AuditKind::Revoke.event_type(), &payload, |_| {
                record.transitions.push(Transition::Revoked { at, event_id });
            })?;
        info!(node_id = %self.node_id, credential_id = %credential_id, "credential revoked");
        Ok(RevokeOutcome::Applied)
    }

    /// Marks a credential expired. Revoked credentials stay revoked.
    pub fn mark_expired(
        &self,
        credential_id: &CredentialId,
        at: DateTime<Utc>,
    ) -> Result<ExpireOutcome, StoreError> {
        let mut state = self.state.write();
        self.expire_locked(&mut state, credential_id, at)
    }

    fn expire_locked(
        &self,
        state: &mut StoreState,
        credential_id: &CredentialId,
        at: DateTime<Utc>,
    ) -> Result<ExpireOutcome, StoreError> {
        let Some(record) = state.records.get_mut(credential_id) else {
            return Ok(ExpireOutcome::NotFound);
        };
        match record.status() {
            CredentialStatus::Revoked => return Ok(ExpireOutcome::AlreadyRevoked),
            CredentialStatus::Expired => return Ok(ExpireOutcome::AlreadyExpired),
            CredentialStatus::Active => {}
        }

        let payload = serde_json::to_value(ExpirePayload {
            node_id: &self.node_id,
            credential_id,
            expired_at: at,
        })?;
        self.ledger
            .append_with(&AuditKind::Expire.event_type(), &payload, |_| {
                record.transitions.push(Transition::Expired { at });
            })?;
        debug!(node_id = %self.node_id, credential_id = %credential_id, "credential expired");
        Ok(ExpireOutcome::Applied)
    }

    /// Returns the record after applying TTL expiry if it is due at `now`.
    pub fn expire_if_due(
        &self,
        credential_id: &CredentialId,
        now: DateTime<Utc>,
    ) -> Result<CredentialRecord, StoreError> {
        let record = self.get(credential_id)?;
        if record.status() != CredentialStatus::Active || !record.credential.is_past_ttl(now) {
            return Ok(record);
        }

        let mut state = self.state.write();
        let at = record.credential.expires_at().unwrap_or(now);
        self.expire_locked(&mut state, credential_id, at)?;
        state
            .records
            .get(credential_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(credential_id.clone()))
    }

    /// Revocation recorded for a credential, if any.
    pub fn revocation(&self, credential_id: &CredentialId) -> Option<RevocationEvent> {
        self.state.read().revocations.get(credential_id).cloned()
    }

    /// Revocations this node has applied, for pull reconciliation.
    pub fn revoked_set(&self) -> RevokedSet {
        let state = self.state.read();
        RevokedSet {
            node_id: self.node_id.clone(),
            events: state.revocations.values().cloned().collect(),
            ledger_seq: self.ledger.tail().map(|e| e.seq),
        }
    }

    /// Records matching `filter`, ordered by issuance time then id.
    pub fn list<F: RecordFilter + ?Sized>(&self, filter: &F) -> Vec<CredentialRecord> {
        let mut records: Vec<CredentialRecord> = self
            .state
            .read()
            .records
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            a.credential
                .issued_at
                .cmp(&b.credential.issued_at)
                .then_with(|| a.credential.credential_id.cmp(&b.credential.credential_id))
        });
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{StatusFilter, SubjectFilter};
    use chrono::TimeZone;
    use ciphera_canonical::{Actor, SubjectId};
    use ciphera_core::SystemClock;
    use std::time::Duration;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn store() -> CredentialStore {
        CredentialStore::new(
            NodeId::parse("node1").unwrap(),
            Arc::new(Ledger::in_memory(Arc::new(SystemClock))),
        )
    }

    fn credential(id: &str, subject: &str) -> Credential {
        Credential::issue(
            CredentialId::parse(id).unwrap(),
            SubjectId::parse(subject).unwrap(),
            NodeId::parse("node1").unwrap(),
            t0(),
            Duration::from_secs(3600),
        )
        .unwrap()
    }

    fn event(id: &str) -> RevocationEvent {
        RevocationEvent::new(
            CredentialId::parse(id).unwrap(),
            Actor::parse("admin").unwrap(),
            NodeId::parse("gateway").unwrap(),
            t0(),
            Duration::from_secs(60),
        )
    }

    #[test]
    fn put_is_idempotent_and_rejects_conflicts() {
        let store = store();
        assert_eq!(store.put(credential("c1", "a@x")).unwrap(), PutOutcome::Stored);
        assert_eq!(store.put(credential("c1", "a@x")).unwrap(), PutOutcome::Duplicate);
        assert!(matches!(
            store.put(credential("c1", "b@x")),
            Err(StoreError::Conflict(_))
        ));
        assert_eq!(store.ledger().len(), 1);
    }

    #[test]
    fn put_rejects_tampered_credential() {
        let store = store();
        let mut c = credential("c1", "a@x");
        c.ttl = Duration::from_secs(1);
        assert!(matches!(store.put(c), Err(StoreError::ContentHashMismatch(_))));
        assert!(store.ledger().is_empty());
    }

    #[test]
    fn redelivered_event_changes_nothing() {
        let store = store();
        store.put(credential("c1", "a@x")).unwrap();
        let e = event("c1");

        assert_eq!(store.apply_revocation(&e).unwrap(), RevokeOutcome::Applied);
        let len = store.ledger().len();
        let set = store.revoked_set();

        assert_eq!(store.apply_revocation(&e).unwrap(), RevokeOutcome::AlreadyRevoked);
        assert_eq!(store.ledger().len(), len);
        assert_eq!(store.revoked_set().events, set.events);
        assert_eq!(store.get(&e.credential_id).unwrap().status(), CredentialStatus::Revoked);
    }

    #[test]
    fn tombstone_revokes_late_arrival() {
        let store = store();
        let e = event("c9");
        assert_eq!(store.apply_revocation(&e).unwrap(), RevokeOutcome::NotFound);
        assert_eq!(store.apply_revocation(&e).unwrap(), RevokeOutcome::AlreadyRevoked);
        assert!(store.revoked_set().covers(&e));

        assert_eq!(
            store.put(credential("c9", "a@x")).unwrap(),
            PutOutcome::StoredRevoked
        );
        let record = store.get(&e.credential_id).unwrap();
        assert_eq!(record.status(), CredentialStatus::Revoked);
        assert_eq!(
            record.transitions.last(),
            Some(&Transition::Revoked {
                at: e.revoked_at,
                event_id: Some(e.event_id.clone())
            })
        );
        // tombstone, issue, revoke
        assert_eq!(store.ledger().len(), 3);
        assert!(store.ledger().verify(..).is_intact());
    }

    #[test]
    fn revocation_overrides_expiry() {
        let store = store();
        let id = CredentialId::parse("c1").unwrap();
        store.put(credential("c1", "a@x")).unwrap();

        assert_eq!(store.mark_expired(&id, t0()).unwrap(), ExpireOutcome::Applied);
        assert_eq!(store.mark_expired(&id, t0()).unwrap(), ExpireOutcome::AlreadyExpired);
        assert_eq!(store.mark_revoked(&id, t0()).unwrap(), RevokeOutcome::Applied);
        assert_eq!(store.mark_expired(&id, t0()).unwrap(), ExpireOutcome::AlreadyRevoked);
        assert_eq!(store.get(&id).unwrap().status(), CredentialStatus::Revoked);
    }

    #[test]
    fn unknown_ids_report_not_found() {
        let store = store();
        let id = CredentialId::parse("nope").unwrap();
        assert!(matches!(store.get(&id), Err(StoreError::NotFound(_))));
        assert_eq!(store.mark_revoked(&id, t0()).unwrap(), RevokeOutcome::NotFound);
        assert_eq!(store.mark_expired(&id, t0()).unwrap(), ExpireOutcome::NotFound);
        assert!(store.ledger().is_empty());
    }

    #[test]
    fn expiry_is_checked_on_access() {
        let store = store();
        let id = CredentialId::parse("c1").unwrap();
        store.put(credential("c1", "a@x")).unwrap();

        let before = t0() + chrono::TimeDelta::minutes(59);
        assert_eq!(store.expire_if_due(&id, before).unwrap().status(), CredentialStatus::Active);

        let after = t0() + chrono::TimeDelta::minutes(61);
        let record = store.expire_if_due(&id, after).unwrap();
        assert_eq!(record.status(), CredentialStatus::Expired);
        assert_eq!(
            record.transitions.last(),
            Some(&Transition::Expired {
                at: t0() + chrono::TimeDelta::hours(1)
            })
        );
        store.expire_if_due(&id, after).unwrap();
        assert_eq!(store.ledger().len(), 2);
    }

    #[test]
    fn list_applies_filters() {
        let store = store();
        store.put(credential("c1", "a@x")).unwrap();
        store.put(credential("c2", "b@x")).unwrap();
        store.put(credential("c3", "a@x")).unwrap();
        store
            .mark_revoked(&CredentialId::parse("c3").unwrap(), t0())
            .unwrap();

        assert_eq!(store.list(&()).len(), 3);
        let alice = SubjectFilter {
            subject_id: SubjectId::parse("a@x").unwrap(),
        };
        assert_eq!(store.list(&alice).len(), 2);
        let revoked = StatusFilter {
            status: CredentialStatus::Revoked,
        };
        let ids: Vec<_> = store
            .list(&revoked)
            .into_iter()
            .map(|r| r.credential.credential_id)
            .collect();
        assert_eq!(ids, vec![CredentialId::parse("c3").unwrap()]);
    }
}
