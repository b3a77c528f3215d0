//! Process and supervisor state machines.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::util::clock::now_ms;

/// Lifecycle state of a single worker process handle.
///
/// `Idle -> Busy -> Idle` repeats for every job; `Killed` is terminal and the
/// handle leaves the live set as it enters that state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    /// Routable, recyclable, and eligible for scale-down.
    Idle,
    /// Running exactly one job.
    Busy,
    /// Terminated; no further transitions.
    Killed,
}

impl ProcessState {
    /// Whether the state machine allows moving from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Busy | Self::Killed) | (Self::Busy, Self::Idle | Self::Killed)
        )
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Busy => write!(f, "busy"),
            Self::Killed => write!(f, "killed"),
        }
    }
}

/// Lifecycle of the supervisor itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Constructed; `start()` has not run.
    NotStarted,
    /// Workers spawned and background loops running.
    Running,
    /// `shutdown()` in progress.
    ShuttingDown,
    /// All loops stopped and all workers terminated.
    Stopped,
}

/// The job currently bound to a busy process handle.
///
/// Created when routing assigns the job, dropped when its terminal result
/// (success, failure, crash or timeout) is recorded. Never mutated.
#[derive(Debug, Clone)]
pub struct ExecutionInfo {
    execution_id: String,
    started_at: Instant,
    started_at_ms: u128,
    timeout: Duration,
}

impl ExecutionInfo {
    /// Start the clock for `execution_id` now.
    pub fn new(execution_id: impl Into<String>, timeout: Duration) -> Self {
        Self {
            execution_id: execution_id.into(),
            started_at: Instant::now(),
            started_at_ms: now_ms(),
            timeout,
        }
    }

    /// Execution identifier.
    #[must_use]
    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    /// Wall-clock start time in milliseconds since epoch.
    #[must_use]
    pub const fn started_at_ms(&self) -> u128 {
        self.started_at_ms
    }

    /// Timeout for this execution.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Time spent since dispatch.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Time spent since dispatch, in seconds.
    #[must_use]
    pub fn elapsed_seconds(&self) -> f64 {
        self.elapsed().as_secs_f64()
    }

    /// True once elapsed time strictly exceeds the timeout.
    #[must_use]
    pub fn is_timed_out(&self) -> bool {
        self.elapsed() > self.timeout
    }

    /// Serializable view for status and heartbeat payloads.
    #[must_use]
    pub fn snapshot(&self) -> ExecutionSnapshot {
        ExecutionSnapshot {
            execution_id: self.execution_id.clone(),
            started_at_ms: self.started_at_ms,
            elapsed_seconds: self.elapsed_seconds(),
            timeout_seconds: self.timeout.as_secs(),
        }
    }
}

/// Point-in-time view of an [`ExecutionInfo`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSnapshot {
    /// Execution identifier.
    pub execution_id: String,
    /// Dispatch time, milliseconds since epoch.
    pub started_at_ms: u128,
    /// Seconds since dispatch.
    pub elapsed_seconds: f64,
    /// Configured timeout in seconds.
    pub timeout_seconds: u64,
}
