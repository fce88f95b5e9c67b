//! Tests for builder modules

use session_agenda::builders::{build_agenda, AgendaBuilder};
use session_agenda::config::AgendaConfig;
use session_agenda::core::SchedulerError;
use session_agenda::infra::InMemoryCatalog;
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_build_agenda_defaults() {
    let agenda = build_agenda(AgendaConfig::default(), Arc::new(InMemoryCatalog::new())).unwrap();
    assert!(agenda.is_empty());
    assert!(!agenda.is_started());
    assert_eq!(agenda.next_reservation_id(), 1);
    assert_eq!(agenda.config().poll_interval, Duration::from_millis(500));
}

#[test]
fn test_builder_rejects_invalid_config() {
    let config = AgendaConfig {
        audit_capacity: 0,
        ..AgendaConfig::default()
    };
    let err = AgendaBuilder::new(config, Arc::new(InMemoryCatalog::new()))
        .build()
        .unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidConfig(_)));
}

#[test]
fn test_builder_creates_store_directory() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state/agenda.jsonl");
    let config = AgendaConfig {
        reservations_store: Some(path.clone()),
        ..AgendaConfig::default()
    };
    let agenda = build_agenda(config, Arc::new(InMemoryCatalog::new())).unwrap();
    assert_eq!(agenda.store_reservations().unwrap(), 0);
    assert!(path.exists());
}
