use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use ciphera_canonical::{CredentialId, NodeId, SubjectId};
use ciphera_core::{CoreConfig, ManualClock};
use ciphera_ledger::Ledger;
use ciphera_sessions::{EndReason, SessionError, SessionRegistry};

fn setup() -> (Arc<SessionRegistry>, Arc<ManualClock>, Arc<Ledger>) {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap(),
    ));
    let ledger = Arc::new(Ledger::in_memory(clock.clone()));
    let config = CoreConfig {
        idle_timeout: Duration::from_secs(15 * 60),
        ..CoreConfig::default()
    };
    let registry = Arc::new(SessionRegistry::new(
        NodeId::parse("node1").unwrap(),
        ledger.clone(),
        clock.clone(),
        &config,
    ));
    (registry, clock, ledger)
}

#[test]
fn test_idle_session_expires_on_next_request() {
    let (registry, clock, ledger) = setup();
    let session = registry
        .open(
            SubjectId::parse("s1@example.org").unwrap(),
            CredentialId::parse("c1").unwrap(),
            NodeId::parse("node1").unwrap(),
        )
        .unwrap();

    // T0 + 5min: activity
    clock.advance(Duration::from_secs(5 * 60));
    registry.touch(&session.session_id).unwrap();

    // T0 + 21min: 16 minutes idle, no sweep has run
    clock.advance(Duration::from_secs(16 * 60));
    let err = registry.touch(&session.session_id).unwrap_err();
    assert!(matches!(err, SessionError::Expired(_)));
    assert!(err.requires_reauthentication());

    // A new authentication creates a new session; the old one stays expired
    let fresh = registry
        .open(
            SubjectId::parse("s1@example.org").unwrap(),
            CredentialId::parse("c1").unwrap(),
            NodeId::parse("node1").unwrap(),
        )
        .unwrap();
    assert_ne!(fresh.session_id, session.session_id);
    assert!(registry.touch(&session.session_id).is_err());
    assert!(registry.touch(&fresh.session_id).is_ok());
    assert!(ledger.verify(..).is_intact());
}

#[test]
fn test_absolute_timeout_despite_activity() {
    let (registry, clock, _) = setup();
    let session = registry
        .open(
            SubjectId::parse("s1@example.org").unwrap(),
            CredentialId::parse("c1").unwrap(),
            NodeId::parse("node1").unwrap(),
        )
        .unwrap();

    for _ in 0..6 {
        clock.advance(Duration::from_secs(10 * 60));
        registry.touch(&session.session_id).unwrap();
    }
    clock.advance(Duration::from_secs(60));
    assert!(matches!(
        registry.check(&session.session_id),
        Err(SessionError::Expired(_))
    ));
    registry.sweep().unwrap();
    assert_eq!(registry.active_count(), 0);
}

#[test]
fn test_expired_session_records_reason() {
    let (registry, clock, ledger) = setup();
    let session = registry
        .open(
            SubjectId::parse("s1@example.org").unwrap(),
            CredentialId::parse("c1").unwrap(),
            NodeId::parse("node1").unwrap(),
        )
        .unwrap();
    clock.advance(Duration::from_secs(20 * 60));
    let _ = registry.touch(&session.session_id);

    let tail = ledger.tail().unwrap();
    assert_eq!(tail.event_type.as_str(), "SESSION_EXPIRE");
    assert_eq!(
        tail.payload["reason"],
        serde_json::to_value(EndReason::IdleTimeout).unwrap()
    );
}

#[test]
fn test_concurrent_touches_keep_latest_activity() {
    let (registry, clock, _) = setup();
    let session = registry
        .open(
            SubjectId::parse("s1@example.org").unwrap(),
            CredentialId::parse("c1").unwrap(),
            NodeId::parse("node1").unwrap(),
        )
        .unwrap();
    clock.advance(Duration::from_secs(60));
    let now = clock_now(&clock);

    std::thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| {
                for _ in 0..50 {
                    registry.touch(&session.session_id).unwrap();
                }
            });
        }
    });

    let checked = registry.check(&session.session_id).unwrap();
    assert_eq!(checked.last_activity_at, now);
}

fn clock_now(clock: &ManualClock) -> chrono::DateTime<Utc> {
    use ciphera_core::Clock;
    clock.now()
}
