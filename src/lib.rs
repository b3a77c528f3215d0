//! # Prometheus Process Pool
//!
//! A supervised pool of worker processes for executing workflow jobs.
//!
//! The supervisor owns a fleet of workers, routes each job to exactly one of
//! them, and keeps the fleet healthy: it replaces crashed workers, kills and
//! replaces workers whose job overran its timeout, scales idle workers down to
//! the configured floor, and recycles workers after a number of jobs. Every
//! routed job yields exactly one terminal result through the result callback.
//!
//! ## Core Problem Solved
//!
//! Workflow jobs are user-authored and untrusted:
//!
//! - **Fault Isolation**: a crashing job must not take down the supervisor or its siblings
//! - **Non-cooperative Code**: a hung job can only be stopped by killing its process
//! - **Small IPC**: job context and results are large, so context travels through a shared
//!   store and only job ids cross the worker queues
//! - **Bounded Growth**: long-lived interpreters leak; recycling bounds per-process growth
//!
//! ## Supervisor
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use prometheus_process_pool::config::PoolConfig;
//! use prometheus_process_pool::core::{callback_fn, PoolSupervisor};
//! use prometheus_process_pool::infra::FileStore;
//! use prometheus_process_pool::process::CommandSpawner;
//!
//! let config = PoolConfig::from_env()?;
//! let store = Arc::new(FileStore::open("/var/lib/pool/store")?);
//! let supervisor = PoolSupervisor::builder(config.clone())
//!     .store(store)
//!     .spawner(Arc::new(CommandSpawner::from_env(&config)?))
//!     .callback(Arc::new(callback_fn(|result| async move {
//!         tracing::info!(execution_id = %result.execution_id, success = result.success, "done");
//!         Ok(())
//!     })))
//!     .build()?;
//!
//! supervisor.start().await?;
//! supervisor.route_execution("exec-1", &serde_json::json!({"input": 42}), None)?;
//! // ...
//! supervisor.shutdown().await;
//! ```
//!
//! ## Worker
//!
//! The worker binary wires a [`worker::JobRunner`] into the stdio loop:
//!
//! ```rust,ignore
//! use prometheus_process_pool::infra::FileStore;
//! use prometheus_process_pool::worker::run_stdio;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = std::sync::Arc::new(FileStore::open("/var/lib/pool/store")?);
//!     run_stdio(store, std::sync::Arc::new(MyRunner), None).await?;
//!     Ok(())
//! }
//! ```
//!
//! For complete scenarios, see `tests/supervisor_test.rs` and `tests/end_to_end_test.rs`.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Pool supervision: state types, the pool aggregate, and the supervisor.
pub mod core;
/// Configuration models for the supervisor and its workers.
pub mod config;
/// Builders to construct supervisors from configuration.
pub mod builders;
/// Infrastructure adapters for the shared context store.
pub mod infra;
/// Supervisor <-> worker message protocol.
pub mod ipc;
/// Supervisable worker processes and the spawners that start them.
pub mod process;
/// API surface for hosts embedding the pool.
pub mod runtime;
/// Shared utilities.
pub mod util;
/// Worker-side execution loop.
pub mod worker;

pub use builders::SupervisorBuilder;
pub use config::{PoolConfig, WorkerConfig};
pub use core::{ExecutionResult, ExecutionStatus, PoolError, PoolSupervisor, RouteOutcome};
