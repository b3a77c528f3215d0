//! Job execution contract implemented by the embedding application.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

use crate::core::result::{ExecutionStatus, IntegrationCall, LogEntry, Roi};

/// Input handed to a [`JobRunner`] for one execution.
#[derive(Debug, Clone)]
pub struct JobContext {
    /// Execution identifier.
    pub execution_id: String,
    /// Fleet identity of the pool running the job.
    pub worker_id: String,
    /// Context read from the store.
    pub context: Value,
}

/// What a job produced.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    /// Outcome status.
    pub status: ExecutionStatus,
    /// Return value.
    pub result: Option<Value>,
    /// Error text for failed or partially failed runs.
    pub error: Option<String>,
    /// Error classification.
    pub error_type: Option<String>,
    /// Log lines in emission order.
    pub logs: Vec<LogEntry>,
    /// Final workflow variables.
    pub variables: Option<Value>,
    /// Integration calls in call order.
    pub integration_calls: Vec<IntegrationCall>,
    /// ROI accounting.
    pub roi: Roi,
    /// Whether the value was served from a cache.
    pub cached: bool,
    /// Cache expiry, when cached.
    pub cache_expires_at: Option<DateTime<Utc>>,
}

impl JobOutcome {
    fn with_status(status: ExecutionStatus) -> Self {
        Self {
            status,
            result: None,
            error: None,
            error_type: None,
            logs: Vec::new(),
            variables: None,
            integration_calls: Vec::new(),
            roi: Roi::default(),
            cached: false,
            cache_expires_at: None,
        }
    }

    /// Successful run returning `result`.
    #[must_use]
    pub fn success(result: Value) -> Self {
        Self {
            result: Some(result),
            ..Self::with_status(ExecutionStatus::Success)
        }
    }

    /// Run that finished with non-fatal errors.
    pub fn completed_with_errors(
        result: Value,
        error: impl Into<String>,
        error_type: impl Into<String>,
    ) -> Self {
        Self {
            result: Some(result),
            error: Some(error.into()),
            error_type: Some(error_type.into()),
            ..Self::with_status(ExecutionStatus::CompletedWithErrors)
        }
    }

    /// Run that failed without raising.
    pub fn failed(error: impl Into<String>, error_type: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            error_type: Some(error_type.into()),
            ..Self::with_status(ExecutionStatus::Failed)
        }
    }

    /// Attach log lines.
    #[must_use]
    pub fn with_logs(mut self, logs: Vec<LogEntry>) -> Self {
        self.logs = logs;
        self
    }

    /// Attach final variables.
    #[must_use]
    pub fn with_variables(mut self, variables: Value) -> Self {
        self.variables = Some(variables);
        self
    }

    /// Attach integration calls.
    #[must_use]
    pub fn with_integration_calls(mut self, calls: Vec<IntegrationCall>) -> Self {
        self.integration_calls = calls;
        self
    }

    /// Attach ROI accounting.
    #[must_use]
    pub fn with_roi(mut self, roi: Roi) -> Self {
        self.roi = roi;
        self
    }

    /// Mark the outcome as served from a cache until `expires_at`.
    #[must_use]
    pub fn cached_until(mut self, expires_at: DateTime<Utc>) -> Self {
        self.cached = true;
        self.cache_expires_at = Some(expires_at);
        self
    }
}

/// Error raised by a job body.
#[derive(Debug, Clone, Error)]
#[error("{error_type}: {message}")]
pub struct JobError {
    /// Runtime type name of the failure.
    pub error_type: String,
    /// Error text.
    pub message: String,
    /// Log lines captured before the failure.
    pub logs: Vec<LogEntry>,
}

impl JobError {
    /// Error with an explicit type name.
    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            message: message.into(),
            logs: Vec::new(),
        }
    }

    /// Wrap any error, naming it after its Rust type.
    pub fn from_error<E: std::error::Error>(error: &E) -> Self {
        Self::new(short_type_name::<E>(), error.to_string())
    }

    /// Attach log lines captured before the failure.
    #[must_use]
    pub fn with_logs(mut self, logs: Vec<LogEntry>) -> Self {
        self.logs = logs;
        self
    }
}

impl From<anyhow::Error> for JobError {
    fn from(error: anyhow::Error) -> Self {
        Self::new("Error", format!("{error:#}"))
    }
}

fn short_type_name<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_owned()
}

/// User job code. One call per execution; implementations may panic or
/// return errors, both of which become failed results.
#[async_trait]
pub trait JobRunner: Send + Sync + 'static {
    /// Run one job.
    async fn run(&self, job: JobContext) -> Result<JobOutcome, JobError>;
}
