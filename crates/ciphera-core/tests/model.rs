use std::time::Duration;

use chrono::{TimeZone, Utc};
use ciphera_canonical::{Actor, CredentialId, NodeId, SubjectId};
use ciphera_core::{
    AuditKind, CoreConfig, Credential, CredentialRecord, CredentialStatus, RevocationEvent,
    RevokedSet, Transition,
};

fn credential() -> Credential {
    Credential::issue(
        CredentialId::parse("c1").unwrap(),
        SubjectId::parse("alice@example.org").unwrap(),
        NodeId::parse("node1").unwrap(),
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        Duration::from_secs(3600),
    )
    .unwrap()
}

#[test]
fn credential_json_uses_milliseconds() {
    let value = serde_json::to_value(credential()).unwrap();
    assert_eq!(value["ttl"], 3_600_000);
    assert_eq!(value["owner_node"], "node1");
    assert_eq!(value["content_hash"]["alg"], "sha-256");
}

#[test]
fn revocation_after_expiry_wins() {
    let at = Utc.with_ymd_and_hms(2024, 1, 1, 2, 0, 0).unwrap();
    let mut record = CredentialRecord::issued(credential());
    assert_eq!(record.status(), CredentialStatus::Active);

    record.transitions.push(Transition::Expired { at });
    assert_eq!(record.status(), CredentialStatus::Expired);

    record.transitions.push(Transition::Revoked { at, event_id: None });
    assert_eq!(record.status(), CredentialStatus::Revoked);
    assert_eq!(record.revoked_at(), Some(at));
}

#[test]
fn partial_config_fills_defaults() {
    let config = CoreConfig::from_json_str(r#"{"propagation_deadline": 10000, "reconciliation_interval": 5000}"#)
        .unwrap();
    assert_eq!(config.propagation_deadline, Duration::from_secs(10));
    assert_eq!(config.max_missed_heartbeats, 3);
    assert_eq!(config.convergence_bound(), Duration::from_secs(15));
}

#[test]
fn config_rejects_slow_reconciliation() {
    let err = CoreConfig::from_json_str(r#"{"propagation_deadline": 10000, "reconciliation_interval": 6000}"#)
        .unwrap_err();
    assert!(err.to_string().contains("reconciliation_interval"));
}

#[test]
fn revoked_set_reports_missing_events() {
    let origin = NodeId::parse("gateway").unwrap();
    let event = |c: &str| {
        RevocationEvent::new(
            CredentialId::parse(c).unwrap(),
            Actor::parse("admin").unwrap(),
            origin.clone(),
            Utc::now(),
            Duration::from_secs(60),
        )
    };
    let authoritative = RevokedSet {
        node_id: origin.clone(),
        events: vec![event("c1"), event("c2")],
        ledger_seq: Some(4),
    };
    let local = RevokedSet {
        node_id: NodeId::parse("node2").unwrap(),
        events: vec![event("c1")],
        ledger_seq: Some(1),
    };

    let missing = local.missing_from(&authoritative);
    assert_eq!(missing.len(), 1);
    assert_eq!(missing[0].credential_id.as_str(), "c2");
    assert!(local.covers(&authoritative.events[0]));
}

#[test]
fn audit_kinds_round_trip_event_types() {
    for kind in AuditKind::ALL {
        assert_eq!(AuditKind::from_event_type(&kind.event_type()), Some(kind));
    }
}
