//! Tests for audit sink

use prometheus_process_pool::core::{build_audit_event, AuditAction, AuditSink, InMemoryAuditSink};

#[test]
fn test_in_memory_audit_sink() {
    let sink = InMemoryAuditSink::new(10);

    let event = build_audit_event(
        "fleet-1",
        Some("fleet-1:0"),
        Some("exec-1"),
        AuditAction::Route,
        Some("payload".to_string()),
    );

    sink.record(event);
    assert_eq!(sink.events().len(), 1);

    let events = sink.events();
    assert_eq!(events[0].worker_id, "fleet-1");
    assert_eq!(events[0].process_id.as_deref(), Some("fleet-1:0"));
    assert_eq!(events[0].execution_id.as_deref(), Some("exec-1"));
    assert_eq!(events[0].action, AuditAction::Route);
    assert!(events[0].event_id.starts_with("fleet-1:0-route-"));
}

#[test]
fn test_audit_sink_overflow() {
    let sink = InMemoryAuditSink::new(2);

    sink.record(build_audit_event("w", Some("p1"), None, AuditAction::Spawn, None));
    sink.record(build_audit_event("w", Some("p2"), None, AuditAction::Spawn, None));
    sink.record(build_audit_event("w", Some("p3"), None, AuditAction::Crash, None));

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].process_id.as_deref(), Some("p2")); // First one popped
    assert_eq!(events[1].process_id.as_deref(), Some("p3"));
    assert_eq!(sink.count(AuditAction::Spawn), 1);
    assert_eq!(sink.count(AuditAction::Crash), 1);
}

#[test]
fn test_event_id_falls_back_to_worker() {
    let event = build_audit_event("fleet-9", None, None, AuditAction::Shutdown, None);
    assert!(event.event_id.starts_with("fleet-9-shutdown-"));
}

#[test]
fn test_action_serializes_snake_case() {
    let event = build_audit_event("w", None, Some("e"), AuditAction::ScaleDown, None);
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["action"], "scale_down");
}
