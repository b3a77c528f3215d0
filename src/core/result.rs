//! Terminal result schema shared by workers, the supervisor, and callbacks.
//!
//! Every routed execution produces exactly one [`ExecutionResult`]. Workers
//! build it after running a job; the supervisor builds it when a worker crashes,
//! times out, or the pool shuts down with the job still pending. The record is
//! validated when it crosses the worker -> supervisor queue boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::state::ExecutionInfo;

/// Well-known `error_type` values produced by the engine itself.
pub mod error_types {
    /// Context was missing (expired or never written) when the worker read it.
    pub const CONTEXT_NOT_FOUND: &str = "ContextNotFound";
    /// The worker process died while running the job.
    pub const WORKER_CRASH: &str = "WorkerCrash";
    /// The job exceeded its timeout and the worker was killed.
    pub const EXECUTION_TIMEOUT: &str = "ExecutionTimeout";
    /// The pool shut down before the job reached a worker.
    pub const POOL_SHUTDOWN: &str = "PoolShutdown";
    /// The job panicked inside the worker.
    pub const PANIC: &str = "Panic";
    /// The context store could not be read.
    pub const STORE_UNAVAILABLE: &str = "StoreUnavailable";
}

/// Outcome status of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Job finished without errors.
    Success,
    /// Job raised or returned an error.
    Failed,
    /// Job exceeded its timeout and was killed.
    Timeout,
    /// Job finished but reported non-fatal errors.
    CompletedWithErrors,
    /// Job never ran because the pool went away.
    Cancelled,
}

impl ExecutionStatus {
    /// `Success` and `CompletedWithErrors` both count as a successful envelope.
    #[must_use]
    pub const fn counts_as_success(self) -> bool {
        matches!(self, Self::Success | Self::CompletedWithErrors)
    }
}

/// A log line captured while the job ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// When the line was emitted.
    pub timestamp: DateTime<Utc>,
    /// Level name (`debug`, `info`, `warning`, `error`).
    pub level: String,
    /// Message text.
    pub message: String,
}

impl LogEntry {
    /// Create a log entry stamped now.
    pub fn now(level: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level: level.into(),
            message: message.into(),
        }
    }
}

/// One outbound integration call made by the job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationCall {
    /// Integration name (e.g. `"slack"`).
    pub integration: String,
    /// Operation invoked.
    pub method: String,
    /// Wall time of the call.
    pub duration_ms: u64,
    /// HTTP-ish status code, when the integration has one.
    pub status_code: Option<u16>,
    /// Error text for failed calls.
    pub error: Option<String>,
}

/// Business-value accounting attached to results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Roi {
    /// Minutes of manual work saved.
    pub time_saved: u64,
    /// Monetary value attributed to the run.
    pub value: f64,
}

/// Resource usage captured by the worker around one job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceMetrics {
    /// Peak resident set size of the worker process.
    pub peak_memory_bytes: u64,
    /// User-mode CPU seconds spent on the job.
    pub cpu_user_seconds: f64,
    /// Kernel-mode CPU seconds spent on the job.
    pub cpu_system_seconds: f64,
    /// `cpu_user_seconds + cpu_system_seconds`.
    pub cpu_total_seconds: f64,
}

impl ResourceMetrics {
    /// Build metrics, deriving the total from user and system time.
    #[must_use]
    pub fn new(peak_memory_bytes: u64, cpu_user_seconds: f64, cpu_system_seconds: f64) -> Self {
        Self {
            peak_memory_bytes,
            cpu_user_seconds,
            cpu_system_seconds,
            cpu_total_seconds: cpu_user_seconds + cpu_system_seconds,
        }
    }
}

/// The single terminal record emitted for an execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Execution identifier.
    pub execution_id: String,
    /// Envelope-level success flag, derived from `status`.
    pub success: bool,
    /// Outcome status.
    pub status: ExecutionStatus,
    /// Job return value.
    pub result: Option<Value>,
    /// Human-readable error text.
    pub error: Option<String>,
    /// Error classification (job error type name or an [`error_types`] value).
    pub error_type: Option<String>,
    /// Wall time spent inside the worker.
    pub duration_ms: u64,
    /// Captured log lines, in emission order.
    #[serde(default)]
    pub logs: Vec<LogEntry>,
    /// Final workflow variables.
    pub variables: Option<Value>,
    /// Integration calls, in call order.
    #[serde(default)]
    pub integration_calls: Vec<IntegrationCall>,
    /// ROI accounting.
    #[serde(default)]
    pub roi: Roi,
    /// Resource usage.
    #[serde(default)]
    pub metrics: ResourceMetrics,
    /// Whether the result came from a cache.
    #[serde(default)]
    pub cached: bool,
    /// Cache expiry when `cached` is set.
    pub cache_expires_at: Option<DateTime<Utc>>,
    /// Fleet identity of the pool that ran the job.
    pub worker_id: String,
}

impl ExecutionResult {
    /// A failed result with no payload.
    pub fn failure(
        execution_id: impl Into<String>,
        worker_id: impl Into<String>,
        status: ExecutionStatus,
        error: impl Into<String>,
        error_type: impl Into<String>,
    ) -> Self {
        Self {
            execution_id: execution_id.into(),
            success: status.counts_as_success(),
            status,
            result: None,
            error: Some(error.into()),
            error_type: Some(error_type.into()),
            duration_ms: 0,
            logs: Vec::new(),
            variables: None,
            integration_calls: Vec::new(),
            roi: Roi::default(),
            metrics: ResourceMetrics::default(),
            cached: false,
            cache_expires_at: None,
            worker_id: worker_id.into(),
        }
    }

    /// Context was missing when the worker looked it up.
    pub fn context_not_found(execution_id: &str, worker_id: impl Into<String>) -> Self {
        Self::failure(
            execution_id,
            worker_id,
            ExecutionStatus::Failed,
            format!("execution context not found for `{execution_id}`"),
            error_types::CONTEXT_NOT_FOUND,
        )
    }

    /// The worker died while running `info`.
    pub fn crashed(info: &ExecutionInfo, worker_id: impl Into<String>, detail: &str) -> Self {
        let mut result = Self::failure(
            info.execution_id(),
            worker_id,
            ExecutionStatus::Failed,
            format!("worker process crashed during execution ({detail})"),
            error_types::WORKER_CRASH,
        );
        result.duration_ms = duration_ms(info);
        result
    }

    /// `info` exceeded its timeout and its worker was killed.
    pub fn timed_out(info: &ExecutionInfo, worker_id: impl Into<String>) -> Self {
        let mut result = Self::failure(
            info.execution_id(),
            worker_id,
            ExecutionStatus::Timeout,
            format!(
                "execution exceeded timeout of {} seconds",
                info.timeout().as_secs()
            ),
            error_types::EXECUTION_TIMEOUT,
        );
        result.duration_ms = duration_ms(info);
        result
    }

    /// The pool shut down before the execution was dispatched.
    pub fn pool_shutdown(execution_id: &str, worker_id: impl Into<String>) -> Self {
        Self::failure(
            execution_id,
            worker_id,
            ExecutionStatus::Cancelled,
            "worker pool shut down before the execution started",
            error_types::POOL_SHUTDOWN,
        )
    }

    /// The pool shut down while `info` was running and no result arrived
    /// within the graceful budget.
    pub fn interrupted(info: &ExecutionInfo, worker_id: impl Into<String>) -> Self {
        let mut result = Self::failure(
            info.execution_id(),
            worker_id,
            ExecutionStatus::Cancelled,
            "worker pool shut down while the execution was running",
            error_types::POOL_SHUTDOWN,
        );
        result.duration_ms = duration_ms(info);
        result
    }

    /// Check the record before it is accepted from a worker.
    ///
    /// # Errors
    ///
    /// Returns a description of the first violated rule.
    pub fn validate(&self) -> Result<(), String> {
        if self.execution_id.trim().is_empty() {
            return Err("execution_id must not be empty".into());
        }
        if self.success != self.status.counts_as_success() {
            return Err(format!(
                "success flag {} contradicts status {:?}",
                self.success, self.status
            ));
        }
        if self.cache_expires_at.is_some() && !self.cached {
            return Err("cache_expires_at set on an uncached result".into());
        }
        Ok(())
    }
}

fn duration_ms(info: &ExecutionInfo) -> u64 {
    u64::try_from(info.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_completed_with_errors_counts_as_success() {
        assert!(ExecutionStatus::Success.counts_as_success());
        assert!(ExecutionStatus::CompletedWithErrors.counts_as_success());
        assert!(!ExecutionStatus::Failed.counts_as_success());
        assert!(!ExecutionStatus::Timeout.counts_as_success());
        assert!(!ExecutionStatus::Cancelled.counts_as_success());
    }

    #[test]
    fn test_metrics_total_is_sum() {
        let m = ResourceMetrics::new(1024, 1.5, 0.25);
        assert!((m.cpu_total_seconds - 1.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_validate_rejects_contradictory_success() {
        let mut r = ExecutionResult::context_not_found("exec-1", "pool-a");
        assert!(r.validate().is_ok());
        r.success = true;
        assert!(r.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_id() {
        let r = ExecutionResult::failure("  ", "pool-a", ExecutionStatus::Failed, "x", "y");
        assert!(r.validate().is_err());
    }

    #[tokio::test]
    async fn test_timed_out_record() {
        let info = ExecutionInfo::new("exec-7", Duration::from_secs(30));
        let r = ExecutionResult::timed_out(&info, "pool-a");
        assert_eq!(r.status, ExecutionStatus::Timeout);
        assert!(!r.success);
        assert_eq!(r.error_type.as_deref(), Some(error_types::EXECUTION_TIMEOUT));
        assert_eq!(
            r.error.as_deref(),
            Some("execution exceeded timeout of 30 seconds")
        );
    }

    #[test]
    fn test_wire_shape_uses_status_names() {
        let r = ExecutionResult::failure("e", "w", ExecutionStatus::CompletedWithErrors, "m", "T");
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["status"], "CompletedWithErrors");
        assert_eq!(json["success"], true);
        assert!(json["metrics"]["cpu_total_seconds"].is_number());
    }
}
