//! Audit sink implementations.
//!
//! The supervisor records one event per lifecycle transition of the fleet
//! (spawn, route, completion, recycle, crash, timeout, ...). Sinks are shared
//! between the supervisor's loops, so recording takes `&self`.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::util::clock::now_ms;

/// Lifecycle action captured by an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// A worker process was spawned.
    Spawn,
    /// An execution was bound to a worker.
    Route,
    /// An execution was parked in the pending queue.
    Queue,
    /// An execution was rejected for backpressure.
    Reject,
    /// A worker delivered a terminal result.
    Complete,
    /// An idle worker was recycled.
    Recycle,
    /// An idle worker was terminated by scale-down.
    ScaleDown,
    /// A busy worker died.
    Crash,
    /// A busy worker exceeded its timeout and was killed.
    Timeout,
    /// A replacement worker was spawned after a failure.
    Replace,
    /// A worker was terminated by pool shutdown.
    Shutdown,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Spawn => "spawn",
            Self::Route => "route",
            Self::Queue => "queue",
            Self::Reject => "reject",
            Self::Complete => "complete",
            Self::Recycle => "recycle",
            Self::ScaleDown => "scale_down",
            Self::Crash => "crash",
            Self::Timeout => "timeout",
            Self::Replace => "replace",
            Self::Shutdown => "shutdown",
        };
        f.write_str(s)
    }
}

/// Audit event structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Event identifier.
    pub event_id: String,
    /// Fleet identity of the supervisor.
    pub worker_id: String,
    /// Process handle involved, if any.
    pub process_id: Option<String>,
    /// Execution involved, if any.
    pub execution_id: Option<String>,
    /// Action taken.
    pub action: AuditAction,
    /// Timestamp milliseconds.
    pub created_at_ms: u128,
    /// Additional context.
    pub payload: Option<String>,
}

/// Audit sink abstraction.
pub trait AuditSink: Send + Sync {
    /// Record an audit event.
    fn record(&self, event: AuditEvent);
}

/// In-memory audit sink for testing and dev.
///
/// Clones share the same buffer.
#[derive(Clone)]
pub struct InMemoryAuditSink {
    events: Arc<Mutex<VecDeque<AuditEvent>>>,
    max_events: usize,
}

impl InMemoryAuditSink {
    /// Create a new in-memory sink with a bounded buffer.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::with_capacity(max_events))),
            max_events,
        }
    }

    /// Retrieve a snapshot of stored events.
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().iter().cloned().collect()
    }

    /// Count stored events with the given action.
    #[must_use]
    pub fn count(&self, action: AuditAction) -> usize {
        self.events.lock().iter().filter(|e| e.action == action).count()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        let mut events = self.events.lock();
        if events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(event);
    }
}

/// Audit sink that emits each event as a structured `tracing` record.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        tracing::info!(
            target: "process_pool::audit",
            action = %event.action,
            worker_id = %event.worker_id,
            process_id = event.process_id.as_deref().unwrap_or("-"),
            execution_id = event.execution_id.as_deref().unwrap_or("-"),
            payload = event.payload.as_deref().unwrap_or(""),
            "audit"
        );
    }
}

/// Helper to build an audit event from context.
pub fn build_audit_event(
    worker_id: impl Into<String>,
    process_id: Option<&str>,
    execution_id: Option<&str>,
    action: AuditAction,
    payload: Option<String>,
) -> AuditEvent {
    let worker_id = worker_id.into();
    let created_at_ms = now_ms();
    AuditEvent {
        event_id: format!(
            "{}-{}-{}",
            process_id.or(execution_id).unwrap_or(&worker_id),
            action,
            created_at_ms
        ),
        worker_id,
        process_id: process_id.map(str::to_owned),
        execution_id: execution_id.map(str::to_owned),
        action,
        created_at_ms,
        payload,
    }
}
