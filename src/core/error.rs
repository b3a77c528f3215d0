//! Error types for pool and store operations.

use thiserror::Error;

/// Errors produced by context store backends.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The backend could not be reached; callers may retry.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// Local I/O failure inside the backend.
    #[error("store io error: {0}")]
    Io(String),
    /// A stored value could not be encoded or decoded.
    #[error("store codec error: {0}")]
    Codec(String),
}

impl StoreError {
    /// Whether a retry could plausibly succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Io(_))
    }
}

/// Errors produced by the pool supervisor.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The supervisor has not been started (or is shutting down).
    #[error("pool is not running")]
    NotRunning,
    /// The supervisor has already been shut down.
    #[error("pool has been shut down")]
    AlreadyShutdown,
    /// Every worker is busy at `max_workers` and the pending queue is full.
    #[error("pool saturated: {pending} executions pending (capacity {capacity})")]
    Backpressure {
        /// Executions currently waiting for a worker.
        pending: usize,
        /// Configured pending queue capacity.
        capacity: usize,
    },
    /// The execution id is already bound to a worker or waiting in the queue.
    #[error("execution `{0}` is already routed")]
    DuplicateExecution(String),
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A worker process could not be spawned.
    #[error("failed to spawn worker: {0}")]
    Spawn(String),
    /// A job id could not be pushed to a worker's inbound queue.
    #[error("failed to dispatch execution: {0}")]
    Dispatch(String),
    /// The execution context could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// Context store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
