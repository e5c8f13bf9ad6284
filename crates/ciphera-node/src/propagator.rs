//! Revocation propagation.
//!
//! `publish` pushes an event to every reachable node concurrently, each push
//! retried on the configured backoff schedule. A push is cancelled when the
//! event's deadline passes or its target is marked unreachable; the delivery
//! then stays open until a reconciliation pull confirms or repairs it.
//! Reconciliation runs every `reconciliation_interval` and whenever a node
//! recovers. An event that misses its deadline is reported `Overdue` and
//! remains tracked until every node has it. Converged events are kept for
//! status queries up to a bounded count, oldest dropped first.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use ciphera_canonical::{EventId, NodeId};
use ciphera_core::{CoreConfig, ProtocolError, RevocationEvent, SharedClock};
use ciphera_store::CredentialStore;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use crate::errors::PropagationError;
use crate::health::{HealthEvent, HealthMonitor};
use crate::retry::{retry_with_backoff, RetryResult};
use crate::transport::SharedTransport;

/// Converged events kept for status queries by default.
pub const RETAINED_CONVERGED: usize = 1024;

/// Overall state of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PropagationStatus {
    /// Some nodes have not acknowledged yet; deadline not reached.
    InFlight,
    /// Every node has acknowledged.
    Converged,
    /// Deadline passed with nodes outstanding; retries continue.
    Overdue,
}

/// Delivery state of an event at one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    /// Not yet acknowledged.
    Pending,
    /// Durably applied by the node.
    Acked,
    /// Push abandoned; waiting for reconciliation.
    Cancelled,
}

/// Signals for monitoring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropagationAlert {
    /// Deadline passed with nodes outstanding.
    Overdue {
        /// The event.
        event_id: EventId,
        /// Nodes that have not acknowledged.
        pending: Vec<NodeId>,
    },
    /// Every node acknowledged.
    Converged {
        /// The event.
        event_id: EventId,
    },
}

/// Result of reconciling one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Reconciled node.
    pub node_id: NodeId,
    /// Events the node already had and are now marked acknowledged.
    pub confirmed: usize,
    /// Missing events pushed again and acknowledged.
    pub repushed: usize,
    /// Missing events whose push failed again.
    pub failed: usize,
}

struct Tracked {
    event: RevocationEvent,
    deliveries: Mutex<BTreeMap<NodeId, DeliveryState>>,
    status: watch::Sender<PropagationStatus>,
}

impl Tracked {
    fn pending(&self) -> Vec<NodeId> {
        self.deliveries
            .lock()
            .iter()
            .filter(|(_, state)| **state != DeliveryState::Acked)
            .map(|(node, _)| node.clone())
            .collect()
    }

    fn status(&self) -> PropagationStatus {
        *self.status.borrow()
    }

    /// Marks `node` acked; true if this converged the event.
    fn ack(&self, node: &NodeId) -> bool {
        let mut deliveries = self.deliveries.lock();
        match deliveries.get_mut(node) {
            Some(state) if *state != DeliveryState::Acked => *state = DeliveryState::Acked,
            _ => return false,
        }
        if deliveries.values().all(|s| *s == DeliveryState::Acked)
            && self.status() != PropagationStatus::Converged
        {
            self.status.send_replace(PropagationStatus::Converged);
            return true;
        }
        false
    }

    fn cancel(&self, node: &NodeId) {
        let mut deliveries = self.deliveries.lock();
        if let Some(state) = deliveries.get_mut(node) {
            if *state == DeliveryState::Pending {
                *state = DeliveryState::Cancelled;
            }
        }
    }

    /// Moves an unconverged event to overdue; returns the outstanding nodes.
    fn mark_overdue(&self) -> Option<Vec<NodeId>> {
        let deliveries = self.deliveries.lock();
        if self.status() != PropagationStatus::InFlight {
            return None;
        }
        self.status.send_replace(PropagationStatus::Overdue);
        Some(
            deliveries
                .iter()
                .filter(|(_, state)| **state != DeliveryState::Acked)
                .map(|(node, _)| node.clone())
                .collect(),
        )
    }
}

/// Origin side of the revocation protocol.
pub struct Propagator {
    authority: Arc<CredentialStore>,
    transport: SharedTransport,
    health: Arc<HealthMonitor>,
    clock: SharedClock,
    config: CoreConfig,
    events: DashMap<EventId, Arc<Tracked>>,
    converged: Mutex<VecDeque<EventId>>,
    retain_converged: usize,
    alert_tx: broadcast::Sender<PropagationAlert>,
}

impl Propagator {
    /// Creates a propagator whose authoritative revoked set is `authority`.
    pub fn new(
        authority: Arc<CredentialStore>,
        transport: SharedTransport,
        health: Arc<HealthMonitor>,
        clock: SharedClock,
        config: CoreConfig,
    ) -> Self {
        let (alert_tx, _) = broadcast::channel(256);
        Self {
            authority,
            transport,
            health,
            clock,
            config,
            events: DashMap::new(),
            converged: Mutex::new(VecDeque::new()),
            retain_converged: RETAINED_CONVERGED,
            alert_tx,
        }
    }

    /// Sets how many converged events stay queryable.
    pub fn with_converged_retention(mut self, count: usize) -> Self {
        self.retain_converged = count;
        self
    }

    /// Subscribe to propagation alerts.
    pub fn subscribe(&self) -> broadcast::Receiver<PropagationAlert> {
        self.alert_tx.subscribe()
    }

    /// Publishes an event to every node known to the health monitor.
    ///
    /// The event is first applied to the authoritative store, so a
    /// reconciliation pull can always recover it. Publishing the same event
    /// again returns its current status. An event for a credential the
    /// authority already holds a different revocation for is not tracked;
    /// the status of the recorded revocation is returned instead.
    #[instrument(skip(self, event), fields(event_id = %event.event_id))]
    pub fn publish(self: &Arc<Self>, event: RevocationEvent) -> Result<PropagationStatus, PropagationError> {
        let slot = match self.events.entry(event.event_id.clone()) {
            Entry::Occupied(existing) => return Ok(existing.get().status()),
            Entry::Vacant(slot) => slot,
        };
        self.authority.apply_revocation(&event)?;
        let recorded = self.authority.revocation(&event.credential_id);
        if let Some(current) = recorded.filter(|r| r.event_id != event.event_id) {
            drop(slot);
            debug!(
                credential_id = %event.credential_id,
                recorded = %current.event_id,
                "credential already revoked by another event"
            );
            return Ok(self
                .status(&current.event_id)
                .unwrap_or(PropagationStatus::Converged));
        }

        let targets = self.health.nodes();
        let initial = if targets.is_empty() {
            PropagationStatus::Converged
        } else {
            PropagationStatus::InFlight
        };
        let tracked = Arc::new(Tracked {
            deliveries: Mutex::new(
                targets
                    .iter()
                    .map(|node| (node.clone(), DeliveryState::Pending))
                    .collect(),
            ),
            status: watch::channel(initial).0,
            event,
        });
        slot.insert(tracked.clone());
        if initial == PropagationStatus::Converged {
            self.retire(&tracked.event.event_id);
        }

        let remaining = (tracked.event.propagation_deadline - self.clock.now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        let deadline = Instant::now() + remaining;

        for node in targets {
            if self.health.is_reachable(&node) {
                let this = Arc::clone(self);
                let tracked = tracked.clone();
                tokio::spawn(async move { this.deliver(tracked, node, deadline).await });
            } else {
                debug!(node_id = %node, "node unreachable; left to reconciliation");
            }
        }

        if initial == PropagationStatus::InFlight {
            let this = Arc::clone(self);
            let tracked = tracked.clone();
            tokio::spawn(async move {
                tokio::time::sleep_until(deadline).await;
                if let Some(pending) = tracked.mark_overdue() {
                    warn!(
                        event_id = %tracked.event.event_id,
                        pending = ?pending,
                        "revocation overdue"
                    );
                    let _ = this.alert_tx.send(PropagationAlert::Overdue {
                        event_id: tracked.event.event_id.clone(),
                        pending,
                    });
                }
            });
        }

        info!(credential_id = %tracked.event.credential_id, "revocation published");
        Ok(initial)
    }

    async fn deliver(self: Arc<Self>, tracked: Arc<Tracked>, node: NodeId, deadline: Instant) {
        let Some(mut reachable) = self.health.watch(&node) else {
            return;
        };
        let push = retry_with_backoff(
            &self.config.retry_backoff_schedule,
            self.config.push_timeout,
            &node,
            || self.transport.push(&node, &tracked.event),
        );

        let result = tokio::select! {
            result = push => result,
            _ = tokio::time::sleep_until(deadline) => {
                debug!(node_id = %node, event_id = %tracked.event.event_id, "push cancelled at deadline");
                tracked.cancel(&node);
                return;
            }
            _ = async { let _ = reachable.wait_for(|up| !*up).await; } => {
                debug!(node_id = %node, event_id = %tracked.event.event_id, "push cancelled; node unreachable");
                tracked.cancel(&node);
                return;
            }
        };

        match result {
            RetryResult::Success { value: ack, attempts } => {
                debug!(node_id = %node, attempts, "push acknowledged");
                self.health.record_synced(&node, ack.ledger_seq);
                self.acknowledge(&tracked, &node);
            }
            RetryResult::Exhausted { last_error, attempts } => {
                warn!(
                    node_id = %node,
                    event_id = %tracked.event.event_id,
                    attempts,
                    error = %last_error,
                    "push retries exhausted"
                );
                tracked.cancel(&node);
            }
        }
    }

    fn acknowledge(&self, tracked: &Tracked, node: &NodeId) {
        if tracked.ack(node) {
            info!(event_id = %tracked.event.event_id, "revocation converged");
            let _ = self.alert_tx.send(PropagationAlert::Converged {
                event_id: tracked.event.event_id.clone(),
            });
            self.retire(&tracked.event.event_id);
        }
    }

    /// Queues a converged event and drops the oldest past the retention count.
    fn retire(&self, event_id: &EventId) {
        let evicted: Vec<EventId> = {
            let mut converged = self.converged.lock();
            converged.push_back(event_id.clone());
            let excess = converged.len().saturating_sub(self.retain_converged);
            converged.drain(..excess).collect()
        };
        for old in evicted {
            self.events.remove(&old);
        }
    }

    /// Pulls one node's revoked set, confirms what it has and re-pushes the rest.
    #[instrument(skip(self))]
    pub async fn reconcile(&self, node: &NodeId) -> Result<ReconcileReport, PropagationError> {
        let timeout = self.config.push_timeout;
        let remote = tokio::time::timeout(timeout, self.transport.pull(node))
            .await
            .map_err(|_| ProtocolError::Timeout {
                node_id: node.clone(),
            })??;
        self.health.record_synced(node, remote.ledger_seq);

        let mut report = ReconcileReport {
            node_id: node.clone(),
            confirmed: 0,
            repushed: 0,
            failed: 0,
        };
        for event in self.authority.revoked_set().events {
            let tracked = self.events.get(&event.event_id).map(|t| t.clone());
            if remote.covers(&event) {
                if let Some(tracked) = tracked {
                    let open = matches!(
                        tracked.deliveries.lock().get(node),
                        Some(state) if *state != DeliveryState::Acked
                    );
                    if open {
                        report.confirmed += 1;
                    }
                    self.acknowledge(&tracked, node);
                }
                continue;
            }

            match tokio::time::timeout(timeout, self.transport.push(node, &event)).await {
                Ok(Ok(_)) => {
                    report.repushed += 1;
                    if let Some(tracked) = tracked {
                        self.acknowledge(&tracked, node);
                    }
                }
                Ok(Err(e)) => {
                    debug!(node_id = %node, event_id = %event.event_id, error = %e, "re-push failed");
                    report.failed += 1;
                }
                Err(_) => {
                    debug!(node_id = %node, event_id = %event.event_id, "re-push timed out");
                    report.failed += 1;
                }
            }
        }

        if report.confirmed + report.repushed + report.failed > 0 {
            info!(
                node_id = %node,
                confirmed = report.confirmed,
                repushed = report.repushed,
                failed = report.failed,
                "reconciled node"
            );
        }
        Ok(report)
    }

    /// Reconciles every reachable node concurrently.
    pub async fn reconcile_all(&self) -> Vec<Result<ReconcileReport, PropagationError>> {
        let nodes = self.health.reachable_nodes();
        join_all(nodes.iter().map(|node| self.reconcile(node))).await
    }

    /// Runs reconciliation on the configured interval and on node recovery.
    pub fn spawn_reconciliation(self: Arc<Self>) -> JoinHandle<()> {
        let mut health_rx = self.health.subscribe();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.reconciliation_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        for result in self.reconcile_all().await {
                            if let Err(e) = result {
                                warn!(error = %e, "reconciliation failed");
                            }
                        }
                    }
                    event = health_rx.recv() => match event {
                        Ok(HealthEvent::Recovered(node)) => {
                            if let Err(e) = self.reconcile(&node).await {
                                warn!(node_id = %node, error = %e, "reconciliation after recovery failed");
                            }
                        }
                        Ok(_) => {}
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "health events lagged; reconciling all nodes");
                            let _ = self.reconcile_all().await;
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            }
        })
    }

    /// Current status of an event.
    pub fn status(&self, event_id: &EventId) -> Option<PropagationStatus> {
        self.events.get(event_id).map(|t| t.status())
    }

    /// Per-node delivery states of an event.
    pub fn deliveries(&self, event_id: &EventId) -> Option<BTreeMap<NodeId, DeliveryState>> {
        self.events
            .get(event_id)
            .map(|t| t.deliveries.lock().clone())
    }

    /// Nodes that have not acknowledged an event.
    pub fn pending_nodes(&self, event_id: &EventId) -> Option<Vec<NodeId>> {
        self.events.get(event_id).map(|t| t.pending())
    }

    /// Waits up to `within` for an event to converge.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::Overdue`] with the outstanding nodes if it has not
    /// converged in time.
    pub async fn await_convergence(
        &self,
        event_id: &EventId,
        within: Duration,
    ) -> Result<(), PropagationError> {
        let tracked = self
            .events
            .get(event_id)
            .map(|t| t.clone())
            .ok_or_else(|| PropagationError::UnknownEvent(event_id.clone()))?;
        let mut rx = tracked.status.subscribe();
        let converged = matches!(
            tokio::time::timeout(
                within,
                rx.wait_for(|status| *status == PropagationStatus::Converged),
            )
            .await,
            Ok(Ok(_))
        );
        if converged {
            Ok(())
        } else {
            Err(PropagationError::overdue(event_id.clone(), tracked.pending()))
        }
    }

    /// Events not yet converged.
    pub fn outstanding(&self) -> Vec<EventId> {
        self.events
            .iter()
            .filter(|t| t.status() != PropagationStatus::Converged)
            .map(|t| t.key().clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryNetwork;
    use crate::node::VerifierNode;
    use chrono::Utc;
    use ciphera_canonical::{Actor, CredentialId};
    use ciphera_core::SystemClock;

    fn propagator(net: Arc<InMemoryNetwork>) -> (Arc<Propagator>, Arc<HealthMonitor>) {
        let config = CoreConfig::default();
        let origin = VerifierNode::in_memory(
            NodeId::parse("gateway").unwrap(),
            Arc::new(SystemClock),
            &config,
        );
        let health = Arc::new(HealthMonitor::new(net.clone(), Arc::new(SystemClock), &config));
        let propagator = Arc::new(Propagator::new(
            origin.store().clone(),
            net,
            health.clone(),
            Arc::new(SystemClock),
            config,
        ));
        (propagator, health)
    }

    fn event() -> RevocationEvent {
        event_for("c1")
    }

    fn event_for(credential_id: &str) -> RevocationEvent {
        RevocationEvent::new(
            CredentialId::parse(credential_id).unwrap(),
            Actor::parse("admin").unwrap(),
            NodeId::parse("gateway").unwrap(),
            Utc::now(),
            Duration::from_secs(60),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn no_targets_converges_immediately() {
        let net = Arc::new(InMemoryNetwork::new(Duration::from_millis(35)));
        let (propagator, _) = propagator(net);
        let event = event();
        let status = propagator.publish(event.clone()).unwrap();
        assert_eq!(status, PropagationStatus::Converged);
        assert!(propagator
            .await_convergence(&event.event_id, Duration::ZERO)
            .await
            .is_ok());
        assert!(propagator.outstanding().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_event_is_reported() {
        let net = Arc::new(InMemoryNetwork::new(Duration::ZERO));
        let (propagator, _) = propagator(net);
        let event = event();
        assert!(propagator.status(&event.event_id).is_none());
        assert!(matches!(
            propagator
                .await_convergence(&event.event_id, Duration::from_secs(1))
                .await,
            Err(PropagationError::UnknownEvent(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn republish_returns_current_status() {
        let net = Arc::new(InMemoryNetwork::new(Duration::from_millis(35)));
        let id = NodeId::parse("node1").unwrap();
        net.register(Arc::new(VerifierNode::in_memory(
            id.clone(),
            Arc::new(SystemClock),
            &CoreConfig::default(),
        )));
        let (propagator, health) = propagator(net.clone());
        health.register(id.clone());

        let event = event();
        assert_eq!(
            propagator.publish(event.clone()).unwrap(),
            PropagationStatus::InFlight
        );
        propagator
            .await_convergence(&event.event_id, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(
            propagator.publish(event.clone()).unwrap(),
            PropagationStatus::Converged
        );
        let node = net.node(&id).unwrap();
        assert_eq!(node.revoked_set().events.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn converged_events_are_retained_up_to_limit() {
        let config = CoreConfig::default();
        let net = Arc::new(InMemoryNetwork::new(Duration::ZERO));
        let origin = VerifierNode::in_memory(
            NodeId::parse("gateway").unwrap(),
            Arc::new(SystemClock),
            &config,
        );
        let health = Arc::new(HealthMonitor::new(net.clone(), Arc::new(SystemClock), &config));
        let propagator = Arc::new(
            Propagator::new(
                origin.store().clone(),
                net,
                health,
                Arc::new(SystemClock),
                config,
            )
            .with_converged_retention(1),
        );

        let first = event_for("c1");
        let second = event_for("c2");
        propagator.publish(first.clone()).unwrap();
        propagator.publish(second.clone()).unwrap();

        assert!(propagator.status(&first.event_id).is_none());
        assert_eq!(
            propagator.status(&second.event_id),
            Some(PropagationStatus::Converged)
        );
        assert!(propagator.outstanding().is_empty());
        assert_eq!(origin.revoked_set().events.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn second_event_for_revoked_credential_is_not_tracked() {
        let net = Arc::new(InMemoryNetwork::new(Duration::from_millis(35)));
        let id = NodeId::parse("node1").unwrap();
        net.register(Arc::new(VerifierNode::in_memory(
            id.clone(),
            Arc::new(SystemClock),
            &CoreConfig::default(),
        )));
        let (propagator, health) = propagator(net);
        health.register(id);

        let first = event();
        let second = event();
        assert_ne!(first.event_id, second.event_id);
        assert_eq!(
            propagator.publish(first.clone()).unwrap(),
            PropagationStatus::InFlight
        );
        assert_eq!(
            propagator.publish(second.clone()).unwrap(),
            PropagationStatus::InFlight
        );
        assert!(propagator.status(&second.event_id).is_none());
        assert_eq!(propagator.outstanding(), vec![first.event_id]);
    }
}
