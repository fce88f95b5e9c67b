//! Tests for audit sink

use session_agenda::core::{build_audit_event, AuditAction, AuditSink, InMemoryAuditSink};

#[test]
fn test_in_memory_audit_sink() {
    let mut sink = InMemoryAuditSink::new(10);

    let event = build_audit_event(
        AuditAction::Activate,
        Some(42),
        Some(1000),
        Some("payload".to_string()),
    );

    sink.record(event.clone());
    assert_eq!(sink.events().len(), 1);

    let events = sink.events();
    assert_eq!(events[0], event);
    assert_eq!(events[0].reservation_id, Some(42));
    assert_eq!(events[0].action.to_string(), "activate");
}

#[test]
fn test_audit_sink_overflow() {
    let mut sink = InMemoryAuditSink::new(2);

    for action in [AuditAction::Add, AuditAction::Activate, AuditAction::Complete] {
        sink.record(build_audit_event(action, Some(1), None, None));
    }

    let actions: Vec<_> = sink.events().iter().map(|e| e.action).collect();
    assert_eq!(actions, vec![AuditAction::Activate, AuditAction::Complete]);
}

#[test]
fn test_event_ids_are_unique() {
    let a = build_audit_event(AuditAction::Store, None, None, None);
    let b = build_audit_event(AuditAction::Store, None, None, None);
    assert_ne!(a.event_id, b.event_id);
}
