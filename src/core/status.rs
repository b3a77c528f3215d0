//! Operational snapshots: status, heartbeat, and fleet registration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::pool::ProcessStatus;
use super::state::LifecycleState;

/// Read-only pool snapshot returned by `get_status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolStatus {
    /// `start()` has completed and `shutdown()` has not begun.
    pub started: bool,
    /// `shutdown()` has begun or finished.
    pub shutdown: bool,
    /// Exact supervisor lifecycle.
    pub lifecycle: LifecycleState,
    /// Fleet identity.
    pub worker_id: String,
    /// Live handles.
    pub pool_size: usize,
    /// Configured floor.
    pub min_workers: usize,
    /// Configured ceiling.
    pub max_workers: usize,
    /// Executions waiting for a handle.
    pub pending_count: usize,
    /// Per-handle views, sorted by id.
    pub processes: Vec<ProcessStatus>,
}

/// Liveness snapshot published with a TTL for external monitors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    /// Fleet identity.
    pub worker_id: String,
    /// Live handles.
    pub pool_size: usize,
    /// Idle handles.
    pub idle_count: usize,
    /// Busy handles.
    pub busy_count: usize,
    /// Executions waiting for a handle.
    pub pending_count: usize,
    /// Per-handle views.
    pub processes: Vec<ProcessStatus>,
    /// When the snapshot was taken.
    pub timestamp: DateTime<Utc>,
}

/// Fleet identity record, refreshed with every heartbeat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    /// Fleet identity.
    pub worker_id: String,
    /// Host process id of the supervisor.
    pub supervisor_pid: u32,
    /// Configured floor.
    pub min_workers: usize,
    /// Configured ceiling.
    pub max_workers: usize,
    /// When the supervisor started.
    pub registered_at: DateTime<Utc>,
}
