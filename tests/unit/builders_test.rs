//! Tests for the supervisor builder

use std::sync::Arc;

use prometheus_process_pool::config::{PoolConfig, WorkerConfig};
use prometheus_process_pool::core::{LifecycleState, PoolError, PoolSupervisor};
use prometheus_process_pool::infra::MemoryStore;
use prometheus_process_pool::process::InProcessSpawner;
use prometheus_process_pool::worker::{JobContext, JobError, JobOutcome, JobRunner};

struct Noop;

#[async_trait::async_trait]
impl JobRunner for Noop {
    async fn run(&self, _job: JobContext) -> Result<JobOutcome, JobError> {
        Ok(JobOutcome::success(serde_json::Value::Null))
    }
}

fn spawner() -> Arc<InProcessSpawner> {
    Arc::new(InProcessSpawner::new(
        WorkerConfig::default(),
        Arc::new(MemoryStore::new()),
        Arc::new(Noop),
    ))
}

#[test]
fn test_builder_requires_spawner() {
    let err = PoolSupervisor::builder(PoolConfig::new()).build().unwrap_err();
    assert!(matches!(err, PoolError::InvalidConfig(ref msg) if msg.contains("spawner")));
}

#[test]
fn test_builder_rejects_invalid_config() {
    let err = PoolSupervisor::builder(PoolConfig::new().with_min_workers(0))
        .spawner(spawner())
        .build()
        .unwrap_err();
    assert!(matches!(err, PoolError::InvalidConfig(_)));
}

#[test]
fn test_builder_defaults() {
    let sup = PoolSupervisor::builder(PoolConfig::new().with_worker_id("fleet-b"))
        .spawner(spawner())
        .build()
        .unwrap();
    assert_eq!(sup.lifecycle(), LifecycleState::NotStarted);
    assert_eq!(sup.config().worker_id, "fleet-b");
    let status = sup.get_status();
    assert!(!status.started);
    assert_eq!(status.pool_size, 0);
}
