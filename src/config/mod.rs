//! Configuration models for the pool supervisor and its worker processes.

pub mod pool;
pub mod worker;

pub use pool::PoolConfig;
pub use worker::WorkerConfig;
