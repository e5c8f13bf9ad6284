use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use ciphera_canonical::{Actor, CredentialId, NodeId, SubjectId};
use ciphera_core::{CoreConfig, Credential, RevocationEvent, SystemClock, VerifyStatus};
use ciphera_node::{
    DeliveryState, HealthEvent, HealthMonitor, InMemoryNetwork, PropagationAlert,
    PropagationStatus, Propagator, VerifierNode,
};
use tokio::time::Instant;

struct Cluster {
    config: CoreConfig,
    net: Arc<InMemoryNetwork>,
    gateway: Arc<VerifierNode>,
    nodes: Vec<Arc<VerifierNode>>,
    health: Arc<HealthMonitor>,
    propagator: Arc<Propagator>,
}

impl Cluster {
    fn new(size: usize) -> Self {
        let config = CoreConfig::default();
        let net = Arc::new(InMemoryNetwork::new(Duration::from_millis(35)));
        let gateway = Arc::new(VerifierNode::in_memory(
            NodeId::parse("gateway").unwrap(),
            Arc::new(SystemClock),
            &config,
        ));
        net.register(gateway.clone());

        let health = Arc::new(HealthMonitor::new(
            net.clone(),
            Arc::new(SystemClock),
            &config,
        ));
        let nodes: Vec<_> = (1..=size)
            .map(|i| {
                let node = Arc::new(VerifierNode::in_memory(
                    NodeId::parse(&format!("node{}", i)).unwrap(),
                    Arc::new(SystemClock),
                    &config,
                ));
                net.register(node.clone());
                health.register(node.node_id().clone());
                node
            })
            .collect();

        let propagator = Arc::new(Propagator::new(
            gateway.store().clone(),
            net.clone(),
            health.clone(),
            Arc::new(SystemClock),
            config.clone(),
        ));
        Self {
            config,
            net,
            gateway,
            nodes,
            health,
            propagator,
        }
    }

    fn issue(&self, id: &str) -> CredentialId {
        let credential = Credential::issue(
            CredentialId::parse(id).unwrap(),
            SubjectId::parse("alice@example.org").unwrap(),
            NodeId::parse("node1").unwrap(),
            Utc::now(),
            self.config.credential_ttl,
        )
        .unwrap();
        self.gateway.accept_credential(credential.clone()).unwrap();
        for node in &self.nodes {
            node.accept_credential(credential.clone()).unwrap();
        }
        credential.credential_id
    }

    fn revocation(&self, credential_id: &CredentialId) -> RevocationEvent {
        RevocationEvent::new(
            credential_id.clone(),
            Actor::parse("admin").unwrap(),
            self.gateway.node_id().clone(),
            Utc::now(),
            self.config.propagation_deadline,
        )
    }

    fn node(&self, name: &str) -> &Arc<VerifierNode> {
        self.nodes
            .iter()
            .find(|n| n.node_id().as_str() == name)
            .unwrap()
    }
}

#[tokio::test(start_paused = true)]
async fn test_push_converges_within_latency() {
    let cluster = Cluster::new(3);
    let credential_id = cluster.issue("c1");
    let event = cluster.revocation(&credential_id);
    let mut alerts = cluster.propagator.subscribe();

    let start = Instant::now();
    cluster.propagator.publish(event.clone()).unwrap();
    cluster
        .propagator
        .await_convergence(&event.event_id, cluster.config.propagation_deadline)
        .await
        .unwrap();
    assert!(start.elapsed() < Duration::from_secs(1));

    for node in &cluster.nodes {
        assert_eq!(node.verify(&credential_id).unwrap(), VerifyStatus::Revoked);
        assert!(node.ledger().verify(..).is_intact());
    }
    assert_eq!(
        alerts.recv().await.unwrap(),
        PropagationAlert::Converged {
            event_id: event.event_id.clone()
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_lost_pushes_recovered_by_node_pull() {
    let cluster = Cluster::new(3);
    let credential_id = cluster.issue("c1");
    let node2 = cluster.node("node2").clone();
    cluster.net.drop_pushes_to(node2.node_id());

    let _origin_pull = node2.clone().spawn_reconciliation(
        cluster.net.clone(),
        cluster.gateway.node_id().clone(),
        cluster.config.reconciliation_interval,
        cluster.config.push_timeout,
    );
    let _origin_reconcile = cluster.propagator.clone().spawn_reconciliation();

    let event = cluster.revocation(&credential_id);
    let start = Instant::now();
    cluster.propagator.publish(event.clone()).unwrap();

    cluster
        .propagator
        .await_convergence(&event.event_id, cluster.config.convergence_bound())
        .await
        .unwrap();
    assert!(start.elapsed() <= cluster.config.convergence_bound());
    assert_eq!(node2.verify(&credential_id).unwrap(), VerifyStatus::Revoked);

    let deliveries = cluster.propagator.deliveries(&event.event_id).unwrap();
    assert!(deliveries.values().all(|s| *s == DeliveryState::Acked));
    assert_eq!(
        cluster.propagator.status(&event.event_id),
        Some(PropagationStatus::Converged)
    );
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_node_recovered_by_reconciliation() {
    let cluster = Cluster::new(3);
    let credential_id = cluster.issue("c1");
    let node2 = cluster.node("node2").clone();
    let mut health_events = cluster.health.subscribe();
    let _reconcile = cluster.propagator.clone().spawn_reconciliation();

    cluster.net.partition(node2.node_id());
    for _ in 0..cluster.config.max_missed_heartbeats {
        cluster.health.tick().await;
    }
    assert!(!cluster.health.is_reachable(node2.node_id()));
    assert_eq!(
        health_events.recv().await.unwrap(),
        HealthEvent::Unreachable {
            node_id: node2.node_id().clone(),
            missed: 3
        }
    );

    let event = cluster.revocation(&credential_id);
    cluster.propagator.publish(event.clone()).unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    let deliveries = cluster.propagator.deliveries(&event.event_id).unwrap();
    assert_eq!(deliveries[node2.node_id()], DeliveryState::Pending);
    assert_eq!(deliveries[cluster.node("node1").node_id()], DeliveryState::Acked);
    assert_eq!(node2.verify(&credential_id).unwrap(), VerifyStatus::Valid);

    cluster.net.heal(node2.node_id());
    cluster.health.tick().await;
    assert!(cluster.health.is_reachable(node2.node_id()));

    cluster
        .propagator
        .await_convergence(&event.event_id, Duration::from_secs(10))
        .await
        .unwrap();
    assert_eq!(node2.verify(&credential_id).unwrap(), VerifyStatus::Revoked);
}

#[tokio::test(start_paused = true)]
async fn test_missed_deadline_reports_overdue() {
    let cluster = Cluster::new(2);
    let credential_id = cluster.issue("c1");
    let node2 = cluster.node("node2").clone();
    cluster.net.partition(node2.node_id());
    let mut alerts = cluster.propagator.subscribe();

    let event = cluster.revocation(&credential_id);
    cluster.propagator.publish(event.clone()).unwrap();

    let err = cluster
        .propagator
        .await_convergence(&event.event_id, Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(err.is_overdue());

    tokio::time::sleep(cluster.config.propagation_deadline).await;
    assert_eq!(
        cluster.propagator.status(&event.event_id),
        Some(PropagationStatus::Overdue)
    );
    assert_eq!(
        alerts.recv().await.unwrap(),
        PropagationAlert::Overdue {
            event_id: event.event_id.clone(),
            pending: vec![node2.node_id().clone()],
        }
    );
    assert_eq!(cluster.propagator.outstanding(), vec![event.event_id.clone()]);

    cluster.net.heal(node2.node_id());
    let report = cluster.propagator.reconcile(node2.node_id()).await.unwrap();
    assert_eq!(report.repushed, 1);
    assert_eq!(
        cluster.propagator.status(&event.event_id),
        Some(PropagationStatus::Converged)
    );
}

#[tokio::test(start_paused = true)]
async fn test_reconcile_is_idempotent() {
    let cluster = Cluster::new(2);
    let credential_id = cluster.issue("c1");
    let event = cluster.revocation(&credential_id);
    cluster.propagator.publish(event.clone()).unwrap();
    cluster
        .propagator
        .await_convergence(&event.event_id, Duration::from_secs(5))
        .await
        .unwrap();

    let node1 = cluster.node("node1").clone();
    let ledger_len = node1.ledger().len();
    node1.on_receive(&event).unwrap();
    let report = cluster.propagator.reconcile(node1.node_id()).await.unwrap();
    assert_eq!(report.repushed, 0);
    assert_eq!(report.failed, 0);
    assert_eq!(node1.ledger().len(), ledger_len);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_revocation_does_not_stay_overdue() {
    let cluster = Cluster::new(2);
    let credential_id = cluster.issue("c1");
    let node1 = cluster.node("node1").clone();
    cluster.net.drop_pushes_to(node1.node_id());

    let first = cluster.revocation(&credential_id);
    let second = cluster.revocation(&credential_id);
    cluster.propagator.publish(first.clone()).unwrap();
    cluster.propagator.publish(second.clone()).unwrap();
    assert_eq!(cluster.propagator.outstanding(), vec![first.event_id.clone()]);

    tokio::time::sleep(cluster.config.propagation_deadline + Duration::from_secs(1)).await;
    assert_eq!(
        cluster.propagator.status(&first.event_id),
        Some(PropagationStatus::Overdue)
    );

    cluster.net.deliver_pushes(node1.node_id());
    cluster.propagator.reconcile(node1.node_id()).await.unwrap();
    assert_eq!(node1.verify(&credential_id).unwrap(), VerifyStatus::Revoked);
    assert_eq!(
        cluster.gateway.store().revocation(&credential_id).unwrap().event_id,
        first.event_id
    );
    assert!(cluster.propagator.outstanding().is_empty());
}
