//! Node health monitor.
//!
//! Heartbeats every registered node at a fixed interval. `max_missed_heartbeats`
//! consecutive misses mark a node unreachable; one successful heartbeat marks
//! it reachable again. Transitions are logged and broadcast; they are not
//! security events and never reach the ledger.

use std::sync::Arc;
use std::time::Duration;

use ciphera_canonical::NodeId;
use ciphera_core::{CoreConfig, NodeView, SharedClock};
use dashmap::DashMap;
use futures::future::join_all;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

use crate::transport::{Heartbeat, SharedTransport};

/// Events emitted by the health monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthEvent {
    /// Node registered for monitoring.
    Registered(NodeId),

    /// Node missed too many heartbeats and is excluded from push fan-out.
    Unreachable {
        /// The node.
        node_id: NodeId,
        /// Consecutive misses at the transition.
        missed: u32,
    },

    /// Node answered again after being unreachable.
    Recovered(NodeId),
}

/// Tracks reachability of verifier nodes.
pub struct HealthMonitor {
    transport: SharedTransport,
    clock: SharedClock,
    heartbeat_interval: Duration,
    heartbeat_timeout: Duration,
    max_missed: u32,

    /// Current views.
    views: DashMap<NodeId, NodeView>,

    /// Per-node reachability, watched by in-flight pushes.
    reachability: DashMap<NodeId, watch::Sender<bool>>,

    /// Event broadcaster.
    event_tx: broadcast::Sender<HealthEvent>,
}

impl HealthMonitor {
    /// Creates a monitor with no nodes.
    pub fn new(transport: SharedTransport, clock: SharedClock, config: &CoreConfig) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            transport,
            clock,
            heartbeat_interval: config.heartbeat_interval,
            heartbeat_timeout: config.push_timeout.min(config.heartbeat_interval),
            max_missed: config.max_missed_heartbeats,
            views: DashMap::new(),
            reachability: DashMap::new(),
            event_tx,
        }
    }

    /// Subscribe to health events.
    pub fn subscribe(&self) -> broadcast::Receiver<HealthEvent> {
        self.event_tx.subscribe()
    }

    /// Starts monitoring a node. Registering twice is a no-op.
    #[instrument(skip(self))]
    pub fn register(&self, node_id: NodeId) {
        if self.views.contains_key(&node_id) {
            return;
        }
        info!(node_id = %node_id, "registering node for health monitoring");
        self.views.insert(node_id.clone(), NodeView::new(node_id.clone()));
        self.reachability
            .insert(node_id.clone(), watch::channel(true).0);
        let _ = self.event_tx.send(HealthEvent::Registered(node_id));
    }

    /// Every registered node, sorted.
    pub fn nodes(&self) -> Vec<NodeId> {
        let mut nodes: Vec<NodeId> = self.views.iter().map(|v| v.key().clone()).collect();
        nodes.sort();
        nodes
    }

    /// Nodes currently reachable, sorted.
    pub fn reachable_nodes(&self) -> Vec<NodeId> {
        let mut nodes: Vec<NodeId> = self
            .views
            .iter()
            .filter(|v| v.reachable)
            .map(|v| v.key().clone())
            .collect();
        nodes.sort();
        nodes
    }

    /// Whether a node is registered and reachable.
    pub fn is_reachable(&self, node_id: &NodeId) -> bool {
        self.views.get(node_id).map(|v| v.reachable).unwrap_or(false)
    }

    /// Current view of a node.
    pub fn view(&self, node_id: &NodeId) -> Option<NodeView> {
        self.views.get(node_id).map(|v| v.clone())
    }

    /// Reachability channel of a node.
    pub fn watch(&self, node_id: &NodeId) -> Option<watch::Receiver<bool>> {
        self.reachability.get(node_id).map(|tx| tx.subscribe())
    }

    /// Records a successful heartbeat.
    pub fn record_success(&self, heartbeat: &Heartbeat) {
        let node_id = &heartbeat.node_id;
        let recovered = {
            let Some(mut view) = self.views.get_mut(node_id) else {
                return;
            };
            view.last_heartbeat_at = Some(self.clock.now());
            view.missed_heartbeats = 0;
            let recovered = !view.reachable;
            view.reachable = true;
            recovered
        };

        if recovered {
            info!(node_id = %node_id, ledger_seq = ?heartbeat.ledger_seq, "node recovered");
            self.set_reachability(node_id, true);
            let _ = self.event_tx.send(HealthEvent::Recovered(node_id.clone()));
        }
    }

    /// Records a missed heartbeat.
    pub fn record_miss(&self, node_id: &NodeId) {
        let transition = {
            let Some(mut view) = self.views.get_mut(node_id) else {
                return;
            };
            view.missed_heartbeats = view.missed_heartbeats.saturating_add(1);
            if view.reachable && view.missed_heartbeats >= self.max_missed {
                view.reachable = false;
                Some(view.missed_heartbeats)
            } else {
                debug!(node_id = %node_id, missed = view.missed_heartbeats, "heartbeat missed");
                None
            }
        };

        if let Some(missed) = transition {
            warn!(node_id = %node_id, missed, "node unreachable");
            self.set_reachability(node_id, false);
            let _ = self.event_tx.send(HealthEvent::Unreachable {
                node_id: node_id.clone(),
                missed,
            });
        }
    }

    /// Records the ledger sequence a node reported during reconciliation.
    pub fn record_synced(&self, node_id: &NodeId, ledger_seq: Option<u64>) {
        if let Some(mut view) = self.views.get_mut(node_id) {
            view.last_synced_seq = ledger_seq;
        }
    }

    fn set_reachability(&self, node_id: &NodeId, reachable: bool) {
        if let Some(tx) = self.reachability.get(node_id) {
            tx.send_replace(reachable);
        }
    }

    /// Heartbeats one node and records the result.
    pub async fn check(&self, node_id: &NodeId) -> bool {
        match tokio::time::timeout(self.heartbeat_timeout, self.transport.heartbeat(node_id)).await {
            Ok(Ok(heartbeat)) => {
                self.record_success(&heartbeat);
                true
            }
            Ok(Err(e)) => {
                debug!(node_id = %node_id, error = %e, "heartbeat failed");
                self.record_miss(node_id);
                false
            }
            Err(_) => {
                self.record_miss(node_id);
                false
            }
        }
    }

    /// Heartbeats every registered node concurrently.
    pub async fn tick(&self) {
        let nodes = self.nodes();
        join_all(nodes.iter().map(|node| self.check(node))).await;
    }

    /// Runs [`tick`](Self::tick) every heartbeat interval.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.heartbeat_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.tick().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryNetwork;
    use crate::node::VerifierNode;
    use ciphera_core::SystemClock;

    fn setup() -> (Arc<InMemoryNetwork>, HealthMonitor, NodeId) {
        let config = CoreConfig::default();
        let net = Arc::new(InMemoryNetwork::new(Duration::from_millis(35)));
        let id = NodeId::parse("node2").unwrap();
        net.register(Arc::new(VerifierNode::in_memory(
            id.clone(),
            Arc::new(SystemClock),
            &config,
        )));
        let monitor = HealthMonitor::new(net.clone(), Arc::new(SystemClock), &config);
        monitor.register(id.clone());
        (net, monitor, id)
    }

    #[tokio::test(start_paused = true)]
    async fn three_misses_mark_unreachable() {
        let (net, monitor, id) = setup();
        let mut events = monitor.subscribe();
        let watch = monitor.watch(&id).unwrap();
        net.partition(&id);

        monitor.tick().await;
        monitor.tick().await;
        assert!(monitor.is_reachable(&id));
        assert_eq!(monitor.view(&id).unwrap().missed_heartbeats, 2);

        monitor.tick().await;
        assert!(!monitor.is_reachable(&id));
        assert!(!*watch.borrow());
        assert_eq!(
            events.recv().await.unwrap(),
            HealthEvent::Unreachable {
                node_id: id.clone(),
                missed: 3
            }
        );
        assert!(monitor.reachable_nodes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn one_success_recovers() {
        let (net, monitor, id) = setup();
        net.partition(&id);
        for _ in 0..4 {
            monitor.tick().await;
        }
        let mut events = monitor.subscribe();

        net.heal(&id);
        monitor.tick().await;
        assert!(monitor.is_reachable(&id));
        assert_eq!(monitor.view(&id).unwrap().missed_heartbeats, 0);
        assert_eq!(events.recv().await.unwrap(), HealthEvent::Recovered(id));
    }

    #[tokio::test(start_paused = true)]
    async fn misses_below_threshold_reset() {
        let (net, monitor, id) = setup();
        net.partition(&id);
        monitor.tick().await;
        monitor.tick().await;
        net.heal(&id);
        monitor.tick().await;
        net.partition(&id);
        monitor.tick().await;
        monitor.tick().await;
        assert!(monitor.is_reachable(&id));
    }
}
