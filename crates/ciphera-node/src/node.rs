use std::sync::Arc;
use std::time::Duration;

use ciphera_canonical::{CredentialId, NodeId, SubjectId};
use ciphera_core::{
    Ack, CoreConfig, Credential, CredentialStatus, ProtocolError, RevocationEvent, RevokedSet,
    SharedClock, VerifyStatus,
};
use ciphera_ledger::Ledger;
use ciphera_sessions::{Session, SessionRegistry};
use ciphera_store::{CredentialStore, PutOutcome, RevokeOutcome, StoreError};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::errors::NodeError;
use crate::transport::{Heartbeat, SharedTransport};

/// One verifier node: its ledger, credential store and session registry.
///
/// The gateway runs one of these as the origin of revocations.
pub struct VerifierNode {
    node_id: NodeId,
    ledger: Arc<Ledger>,
    store: Arc<CredentialStore>,
    sessions: Arc<SessionRegistry>,
    clock: SharedClock,
}

impl std::fmt::Debug for VerifierNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerifierNode")
            .field("node_id", &self.node_id)
            .field("credentials", &self.store.len())
            .field("ledger_len", &self.ledger.len())
            .finish()
    }
}

impl VerifierNode {
    /// Creates a node around an existing ledger.
    pub fn new(node_id: NodeId, ledger: Arc<Ledger>, clock: SharedClock, config: &CoreConfig) -> Self {
        let store = Arc::new(CredentialStore::new(node_id.clone(), ledger.clone()));
        let sessions = Arc::new(SessionRegistry::new(
            node_id.clone(),
            ledger.clone(),
            clock.clone(),
            config,
        ));
        Self {
            node_id,
            ledger,
            store,
            sessions,
            clock,
        }
    }

    /// Creates a node with an in-memory ledger.
    pub fn in_memory(node_id: NodeId, clock: SharedClock, config: &CoreConfig) -> Self {
        let ledger = Arc::new(Ledger::in_memory(clock.clone()));
        Self::new(node_id, ledger, clock, config)
    }

    /// This node's id.
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// This node's ledger.
    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// This node's credential store.
    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    /// This node's session registry.
    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    /// Applies a pushed or pulled revocation.
    ///
    /// The ack is built only after the store mutation and its ledger entry
    /// have both been committed. Sessions opened with the credential are
    /// revoked as well.
    #[instrument(skip(self, event), fields(node_id = %self.node_id, event_id = %event.event_id))]
    pub fn on_receive(&self, event: &RevocationEvent) -> Result<Ack, NodeError> {
        let outcome = self.store.apply_revocation(event)?;
        if outcome == RevokeOutcome::Applied {
            self.sessions.revoke_for_credential(&event.credential_id)?;
        }
        debug!(?outcome, "revocation received");
        Ok(Ack {
            node_id: self.node_id.clone(),
            event_id: event.event_id.clone(),
            ledger_seq: self.ledger.tail().map(|e| e.seq),
        })
    }

    /// Revocations applied here, for reconciliation.
    pub fn revoked_set(&self) -> RevokedSet {
        self.store.revoked_set()
    }

    /// Liveness reply.
    pub fn heartbeat(&self) -> Heartbeat {
        Heartbeat {
            node_id: self.node_id.clone(),
            ledger_seq: self.ledger.tail().map(|e| e.seq),
        }
    }

    /// Stores a credential issued elsewhere.
    pub fn accept_credential(&self, credential: Credential) -> Result<PutOutcome, NodeError> {
        let outcome = self.store.put(credential)?;
        Ok(outcome)
    }

    /// Status of a credential, applying TTL expiry on access.
    pub fn verify(&self, credential_id: &CredentialId) -> Result<VerifyStatus, NodeError> {
        match self.store.expire_if_due(credential_id, self.clock.now()) {
            Ok(record) => Ok(record.status().into()),
            Err(StoreError::NotFound(_)) => Ok(VerifyStatus::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    /// Opens a session for `subject_id` if the credential is valid here.
    pub fn open_session(
        &self,
        subject_id: SubjectId,
        credential_id: CredentialId,
    ) -> Result<Session, NodeError> {
        let record = self.store.expire_if_due(&credential_id, self.clock.now())?;
        if record.status() != CredentialStatus::Active || record.credential.subject_id != subject_id {
            return Err(NodeError::Protocol(ProtocolError::Rejected {
                node_id: self.node_id.clone(),
                reason: format!("credential {} is not valid for {}", credential_id, subject_id),
            }));
        }
        let session = self
            .sessions
            .open(subject_id, credential_id, self.node_id.clone())?;
        self.confirm_session(session)
    }

    /// Re-reads the credential after a session was opened.
    ///
    /// A revocation applied between the validity check and the insert did
    /// not see the session; it is ended here instead.
    fn confirm_session(&self, session: Session) -> Result<Session, NodeError> {
        let record = self.store.get(&session.credential_id)?;
        if record.status() != CredentialStatus::Revoked {
            return Ok(session);
        }
        self.sessions.revoke_for_credential(&session.credential_id)?;
        warn!(
            node_id = %self.node_id,
            session_id = %session.session_id,
            credential_id = %session.credential_id,
            "credential revoked while opening session"
        );
        Err(NodeError::Protocol(ProtocolError::Rejected {
            node_id: self.node_id.clone(),
            reason: format!("credential {} was revoked", session.credential_id),
        }))
    }

    /// Pulls the origin's revoked set once and applies anything missing.
    ///
    /// Returns the number of events applied.
    pub async fn reconcile_with_origin(
        &self,
        transport: &SharedTransport,
        origin: &NodeId,
        timeout: Duration,
    ) -> Result<usize, NodeError> {
        let authoritative = match tokio::time::timeout(timeout, transport.pull(origin)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ProtocolError::Timeout {
                    node_id: origin.clone(),
                }
                .into())
            }
        };

        let local = self.revoked_set();
        let missing = local.missing_from(&authoritative);
        for event in &missing {
            self.on_receive(event)?;
        }
        if !missing.is_empty() {
            info!(
                node_id = %self.node_id,
                origin = %origin,
                applied = missing.len(),
                "reconciled revocations from origin"
            );
        }
        Ok(missing.len())
    }

    /// Runs [`reconcile_with_origin`](Self::reconcile_with_origin) every `interval`.
    pub fn spawn_reconciliation(
        self: Arc<Self>,
        transport: SharedTransport,
        origin: NodeId,
        interval: Duration,
        timeout: Duration,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = self.reconcile_with_origin(&transport, &origin, timeout).await {
                    warn!(node_id = %self.node_id, origin = %origin, error = %e, "reconciliation pull failed");
                }
            }
        })
    }
}
