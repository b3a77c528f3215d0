//! API-facing request/response models for hosts that expose the pool over a
//! transport of their own.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{LifecycleState, PoolError, PoolSupervisor, RouteOutcome};

/// Execution submission payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteRequest {
    /// Execution identifier, unique among in-flight executions.
    pub execution_id: String,
    /// Opaque execution context handed to the job.
    pub context: Value,
    /// Per-execution timeout; the pool default applies when absent.
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

/// Routing response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteResponse {
    /// Execution identifier.
    pub execution_id: String,
    /// Where the execution went.
    #[serde(flatten)]
    pub outcome: RouteOutcome,
}

/// Health response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    /// Running with at least one live worker.
    pub ok: bool,
    /// Supervisor lifecycle.
    pub lifecycle: LifecycleState,
    /// Live workers.
    pub pool_size: usize,
    /// Executions waiting for a worker.
    pub pending_count: usize,
}

/// Submit one execution to `supervisor`.
///
/// # Errors
///
/// Whatever [`PoolSupervisor::route_execution`] rejects, plus
/// `InvalidConfig` for a zero `timeout_seconds`.
pub fn submit_execution(
    supervisor: &PoolSupervisor,
    req: RouteRequest,
) -> Result<RouteResponse, PoolError> {
    let timeout = req.timeout_seconds.map(Duration::from_secs);
    let outcome = supervisor.route_execution(&req.execution_id, &req.context, timeout)?;
    Ok(RouteResponse {
        execution_id: req.execution_id,
        outcome,
    })
}

/// Return a health payload.
#[must_use]
pub fn health(supervisor: &PoolSupervisor) -> Health {
    let status = supervisor.get_status();
    Health {
        ok: status.started && status.pool_size > 0,
        lifecycle: status.lifecycle,
        pool_size: status.pool_size,
        pending_count: status.pending_count,
    }
}
