//! Pool supervision: state types, the pool aggregate, and the supervisor.

pub mod audit;
pub mod callback;
pub mod error;
pub mod pending;
pub mod pool;
pub mod result;
pub mod state;
pub mod status;
pub mod supervisor;

pub use audit::{build_audit_event, AuditAction, AuditEvent, AuditSink, InMemoryAuditSink, TracingAuditSink};
pub use callback::{callback_fn, FnCallback, NoopCallback, ResultCallback};
pub use error::{AppResult, PoolError, StoreError};
pub use pending::{PendingExecution, PendingQueue};
pub use pool::{Dispatch, Pool, ProcessHandle, ProcessStatus};
pub use result::{
    error_types, ExecutionResult, ExecutionStatus, IntegrationCall, LogEntry, ResourceMetrics, Roi,
};
pub use state::{ExecutionInfo, ExecutionSnapshot, LifecycleState, ProcessState};
pub use status::{Heartbeat, PoolStatus, Registration};
pub use supervisor::{PoolSupervisor, RouteOutcome};
