//! Request handling at the gateway.
//!
//! Issuance stores the credential locally and replicates it to every
//! reachable node; a credential with no replica is still issued and is
//! answered from the gateway's records. Revocation is written to the local
//! ledger first and then handed to the [`Propagator`]; the request returns
//! without waiting for nodes to acknowledge.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ciphera_canonical::{Actor, CredentialId, NodeId, SessionId, SubjectId};
use ciphera_core::{CoreConfig, Credential, RevocationEvent, SharedClock, VerifyStatus};
use ciphera_node::{HealthMonitor, Propagator, SharedTransport, VerifierNode};
use ciphera_sessions::{Session, SessionError};
use futures::future::join_all;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::decision::{AuthDecision, BiometricVote, DenyReason, IssueDecision, RevokeDecision};
use crate::errors::GatewayError;
use crate::limiter::{RateLimiter, Unlimited};

/// Background tasks started by [`GatewayCoordinator::start`].
///
/// Dropping the handle does not stop the tasks; call [`abort`](Self::abort).
#[derive(Debug)]
pub struct GatewayTasks {
    handles: Vec<JoinHandle<()>>,
}

impl GatewayTasks {
    /// Stops every task.
    pub fn abort(&self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

/// Coordinates issuance, verification, authentication and revocation.
pub struct GatewayCoordinator {
    node: Arc<VerifierNode>,
    transport: SharedTransport,
    health: Arc<HealthMonitor>,
    propagator: Arc<Propagator>,
    limiter: Arc<dyn RateLimiter>,
    clock: SharedClock,
    config: CoreConfig,
    next_owner: AtomicUsize,
}

impl GatewayCoordinator {
    /// Creates a coordinator around the gateway's own node.
    pub fn new(
        node: Arc<VerifierNode>,
        transport: SharedTransport,
        clock: SharedClock,
        config: CoreConfig,
    ) -> Self {
        let health = Arc::new(HealthMonitor::new(transport.clone(), clock.clone(), &config));
        let propagator = Arc::new(Propagator::new(
            node.store().clone(),
            transport.clone(),
            health.clone(),
            clock.clone(),
            config.clone(),
        ));
        Self {
            node,
            transport,
            health,
            propagator,
            limiter: Arc::new(Unlimited),
            clock,
            config,
            next_owner: AtomicUsize::new(0),
        }
    }

    /// Replaces the rate limiter.
    pub fn with_rate_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    /// Adds a verifier node to the cluster.
    pub fn register_node(&self, node_id: NodeId) {
        self.health.register(node_id);
    }

    /// Starts heartbeating and reconciliation.
    pub fn start(&self) -> GatewayTasks {
        GatewayTasks {
            handles: vec![
                self.health.clone().spawn(),
                self.propagator.clone().spawn_reconciliation(),
            ],
        }
    }

    /// The gateway's own node.
    pub fn node(&self) -> &Arc<VerifierNode> {
        &self.node
    }

    /// The health monitor.
    pub fn health(&self) -> &Arc<HealthMonitor> {
        &self.health
    }

    /// The propagator.
    pub fn propagator(&self) -> &Arc<Propagator> {
        &self.propagator
    }

    /// The active configuration.
    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    fn pick_owner(&self) -> NodeId {
        let reachable = self.health.reachable_nodes();
        if reachable.is_empty() {
            return self.node.node_id().clone();
        }
        let i = self.next_owner.fetch_add(1, Ordering::Relaxed) % reachable.len();
        reachable[i].clone()
    }

    /// Issues a credential to `subject_id` after a biometric decision.
    #[instrument(skip(self), fields(gateway = %self.node.node_id()))]
    pub async fn issue(
        &self,
        subject_id: SubjectId,
        biometric_verified: bool,
    ) -> Result<IssueDecision, GatewayError> {
        if !self.limiter.check(subject_id.as_str()) {
            debug!(subject_id = %subject_id, "issuance rate limited");
            return Ok(IssueDecision::RateLimited);
        }
        if !biometric_verified {
            return Ok(IssueDecision::Denied {
                reason: DenyReason::BiometricRejected,
            });
        }

        let credential = Credential::issue(
            CredentialId::generate(),
            subject_id,
            self.pick_owner(),
            self.clock.now(),
            self.config.credential_ttl,
        )?;
        self.node.accept_credential(credential.clone())?;

        let replicated_to = self.replicate(&credential).await;
        if replicated_to.is_empty() && !self.health.nodes().is_empty() {
            warn!(
                credential_id = %credential.credential_id,
                "credential issued without replicas"
            );
        }
        info!(
            credential_id = %credential.credential_id,
            owner = %credential.owner_node,
            replicas = replicated_to.len(),
            "credential issued"
        );
        Ok(IssueDecision::Issued {
            credential,
            replicated_to,
        })
    }

    async fn replicate(&self, credential: &Credential) -> Vec<NodeId> {
        let nodes = self.health.reachable_nodes();
        let timeout = self.config.push_timeout;
        let results = join_all(nodes.iter().map(|node| async move {
            let result =
                tokio::time::timeout(timeout, self.transport.replicate(node, credential)).await;
            (node, result)
        }))
        .await;

        let mut stored = Vec::new();
        for (node, result) in results {
            match result {
                Ok(Ok(())) => stored.push(node.clone()),
                Ok(Err(e)) => warn!(node_id = %node, error = %e, "replication failed"),
                Err(_) => warn!(node_id = %node, "replication timed out"),
            }
        }
        stored
    }

    /// Status of a credential.
    ///
    /// Terminal states in the gateway's records answer immediately. A valid
    /// credential is confirmed with its owner node; if that node cannot be
    /// reached the local answer stands.
    #[instrument(skip(self))]
    pub async fn verify(&self, credential_id: &CredentialId) -> Result<VerifyStatus, GatewayError> {
        let local = self.node.verify(credential_id)?;
        if local != VerifyStatus::Valid {
            return Ok(local);
        }

        let owner = self.node.store().get(credential_id)?.credential.owner_node;
        if &owner == self.node.node_id() || !self.health.is_reachable(&owner) {
            return Ok(local);
        }

        match tokio::time::timeout(
            self.config.push_timeout,
            self.transport.verify(&owner, credential_id),
        )
        .await
        {
            Ok(Ok(remote @ (VerifyStatus::Revoked | VerifyStatus::Expired))) => {
                warn!(
                    credential_id = %credential_id,
                    owner = %owner,
                    status = ?remote,
                    "owner node disagrees with gateway"
                );
                Ok(remote)
            }
            Ok(Ok(_)) => Ok(local),
            Ok(Err(e)) => {
                debug!(owner = %owner, error = %e, "owner verify failed; using local record");
                Ok(local)
            }
            Err(_) => {
                debug!(owner = %owner, "owner verify timed out; using local record");
                Ok(local)
            }
        }
    }

    /// Opens a session when a strict majority of known nodes matched the subject.
    ///
    /// Votes from unknown nodes are ignored and each node counts once.
    #[instrument(skip(self, votes))]
    pub async fn authenticate(
        &self,
        credential_id: &CredentialId,
        votes: &[BiometricVote],
    ) -> Result<AuthDecision, GatewayError> {
        if !self.limiter.check(credential_id.as_str()) {
            return Ok(AuthDecision::RateLimited);
        }

        let electorate: BTreeSet<NodeId> = self.health.nodes().into_iter().collect();
        let required = electorate.len() / 2 + 1;
        let positive = votes
            .iter()
            .filter(|v| v.verified && electorate.contains(&v.node_id))
            .map(|v| &v.node_id)
            .collect::<BTreeSet<_>>()
            .len();
        if positive < required {
            info!(positive, required, "authentication denied");
            return Ok(AuthDecision::Denied {
                reason: DenyReason::InsufficientVotes { positive, required },
            });
        }

        let status = self.verify(credential_id).await?;
        if status != VerifyStatus::Valid {
            return Ok(AuthDecision::Denied {
                reason: DenyReason::CredentialInvalid { status },
            });
        }

        let subject_id = self.node.store().get(credential_id)?.credential.subject_id;
        let session = self.node.open_session(subject_id, credential_id.clone())?;
        Ok(AuthDecision::Accepted { session })
    }

    /// Revokes a credential and starts propagating the revocation.
    ///
    /// Revoking an already revoked credential returns the event that revoked
    /// it. Sessions opened at the gateway with the credential are revoked.
    #[instrument(skip(self))]
    pub async fn revoke(
        &self,
        credential_id: &CredentialId,
        actor: Actor,
    ) -> Result<RevokeDecision, GatewayError> {
        let store = self.node.store();
        if !store.contains(credential_id) {
            return Ok(RevokeDecision::NotFound);
        }
        if let Some(event) = store.revocation(credential_id) {
            debug!(event_id = %event.event_id, "credential already revoked");
            return Ok(RevokeDecision::Accepted { event });
        }

        let event = RevocationEvent::new(
            credential_id.clone(),
            actor,
            self.node.node_id().clone(),
            self.clock.now(),
            self.config.propagation_deadline,
        );
        self.propagator.publish(event.clone())?;
        let sessions = self.node.sessions().revoke_for_credential(credential_id)?;

        // a concurrent revoke may have recorded its event first
        let event = store.revocation(credential_id).unwrap_or(event);
        info!(
            credential_id = %credential_id,
            event_id = %event.event_id,
            sessions = sessions.len(),
            "revocation accepted"
        );
        Ok(RevokeDecision::Accepted { event })
    }

    /// Checks and extends a gateway session.
    pub fn touch_session(&self, session_id: &SessionId) -> Result<Session, SessionError> {
        self.node.sessions().touch(session_id)
    }
}
