//! Pool supervisor configuration.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Supervisor configuration. Every field has a default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Fleet identity used for registration, heartbeats, and result records.
    pub worker_id: String,
    /// Live processes kept at all times.
    pub min_workers: usize,
    /// Hard ceiling on live processes.
    pub max_workers: usize,
    /// Default per-job timeout; `route_execution` may override it.
    pub execution_timeout_seconds: u64,
    /// Budget for a worker to exit after a graceful termination request.
    pub graceful_shutdown_seconds: u64,
    /// Recycle a worker after this many completed jobs; 0 disables recycling.
    pub recycle_after_executions: u64,
    /// Period of the heartbeat loop.
    pub heartbeat_interval_seconds: u64,
    /// TTL of the registration and heartbeat keys.
    pub registration_ttl_seconds: u64,
    /// Period of the health (liveness + scale-down) loop.
    pub health_check_interval_ms: u64,
    /// Period of the timeout loop.
    pub timeout_check_interval_ms: u64,
    /// Period of the result loop.
    pub result_poll_interval_ms: u64,
    /// TTL of execution context keys.
    pub context_ttl_seconds: u64,
    /// Executions allowed to wait for a worker when the pool is saturated.
    pub max_pending_executions: usize,
    /// Namespace prefix for every store key.
    pub key_prefix: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            worker_id: uuid::Uuid::new_v4().to_string(),
            min_workers: 2,
            max_workers: 10,
            execution_timeout_seconds: 300,
            graceful_shutdown_seconds: 5,
            recycle_after_executions: 0,
            heartbeat_interval_seconds: 10,
            registration_ttl_seconds: 30,
            health_check_interval_ms: 1_000,
            timeout_check_interval_ms: 1_000,
            result_poll_interval_ms: 50,
            context_ttl_seconds: 3_600,
            max_pending_executions: 100,
            key_prefix: "workflow".into(),
        }
    }
}

impl PoolConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults with `max_workers` sized to the host's logical CPUs.
    #[must_use]
    pub fn sized_for_host() -> Self {
        let cpus = num_cpus::get().max(1);
        let defaults = Self::default();
        Self {
            max_workers: cpus.max(defaults.min_workers),
            ..defaults
        }
    }

    /// Set the fleet identity.
    #[must_use]
    pub fn with_worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = worker_id.into();
        self
    }

    /// Set the minimum live process count.
    #[must_use]
    pub const fn with_min_workers(mut self, min_workers: usize) -> Self {
        self.min_workers = min_workers;
        self
    }

    /// Set the maximum live process count.
    #[must_use]
    pub const fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    /// Set the default execution timeout.
    #[must_use]
    pub const fn with_execution_timeout_seconds(mut self, seconds: u64) -> Self {
        self.execution_timeout_seconds = seconds;
        self
    }

    /// Set the graceful termination budget.
    #[must_use]
    pub const fn with_graceful_shutdown_seconds(mut self, seconds: u64) -> Self {
        self.graceful_shutdown_seconds = seconds;
        self
    }

    /// Recycle workers after `executions` completed jobs (0 = never).
    #[must_use]
    pub const fn with_recycle_after_executions(mut self, executions: u64) -> Self {
        self.recycle_after_executions = executions;
        self
    }

    /// Set the pending queue capacity used under saturation.
    #[must_use]
    pub const fn with_max_pending_executions(mut self, capacity: usize) -> Self {
        self.max_pending_executions = capacity;
        self
    }

    /// Set the heartbeat period and registration TTL.
    #[must_use]
    pub const fn with_heartbeat(mut self, interval_seconds: u64, ttl_seconds: u64) -> Self {
        self.heartbeat_interval_seconds = interval_seconds;
        self.registration_ttl_seconds = ttl_seconds;
        self
    }

    /// Set the periods of the health, timeout, and result loops.
    #[must_use]
    pub const fn with_poll_intervals_ms(mut self, health: u64, timeout: u64, result: u64) -> Self {
        self.health_check_interval_ms = health;
        self.timeout_check_interval_ms = timeout;
        self.result_poll_interval_ms = result;
        self
    }

    /// Set the store key prefix.
    #[must_use]
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a message describing the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.worker_id.trim().is_empty() {
            return Err("worker_id must not be empty".into());
        }
        if self.min_workers == 0 {
            return Err("min_workers must be greater than 0".into());
        }
        if self.min_workers > self.max_workers {
            return Err(format!(
                "min_workers ({}) must not exceed max_workers ({})",
                self.min_workers, self.max_workers
            ));
        }
        if self.execution_timeout_seconds == 0 {
            return Err("execution_timeout_seconds must be greater than 0".into());
        }
        if self.heartbeat_interval_seconds == 0 {
            return Err("heartbeat_interval_seconds must be greater than 0".into());
        }
        if self.registration_ttl_seconds <= self.heartbeat_interval_seconds {
            return Err(format!(
                "registration_ttl_seconds ({}) must exceed heartbeat_interval_seconds ({})",
                self.registration_ttl_seconds, self.heartbeat_interval_seconds
            ));
        }
        if self.health_check_interval_ms == 0
            || self.timeout_check_interval_ms == 0
            || self.result_poll_interval_ms == 0
        {
            return Err("loop intervals must be greater than 0".into());
        }
        if self.context_ttl_seconds == 0 {
            return Err("context_ttl_seconds must be greater than 0".into());
        }
        if self.key_prefix.trim().is_empty() {
            return Err("key_prefix must not be empty".into());
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation message.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load `.env` (if present), then overlay `POOL_*` environment variables
    /// on the defaults and validate.
    ///
    /// # Errors
    ///
    /// Returns a message naming the variable that failed to parse, or a
    /// validation message.
    pub fn from_env() -> Result<Self, String> {
        let _ = dotenvy::dotenv();
        let mut cfg = Self::default();
        if let Ok(id) = std::env::var("POOL_WORKER_ID") {
            cfg.worker_id = id;
        }
        if let Ok(prefix) = std::env::var("POOL_KEY_PREFIX") {
            cfg.key_prefix = prefix;
        }
        env_override("POOL_MIN_WORKERS", &mut cfg.min_workers)?;
        env_override("POOL_MAX_WORKERS", &mut cfg.max_workers)?;
        env_override("POOL_EXECUTION_TIMEOUT_SECONDS", &mut cfg.execution_timeout_seconds)?;
        env_override("POOL_GRACEFUL_SHUTDOWN_SECONDS", &mut cfg.graceful_shutdown_seconds)?;
        env_override("POOL_RECYCLE_AFTER_EXECUTIONS", &mut cfg.recycle_after_executions)?;
        env_override("POOL_HEARTBEAT_INTERVAL_SECONDS", &mut cfg.heartbeat_interval_seconds)?;
        env_override("POOL_REGISTRATION_TTL_SECONDS", &mut cfg.registration_ttl_seconds)?;
        env_override("POOL_HEALTH_CHECK_INTERVAL_MS", &mut cfg.health_check_interval_ms)?;
        env_override("POOL_TIMEOUT_CHECK_INTERVAL_MS", &mut cfg.timeout_check_interval_ms)?;
        env_override("POOL_RESULT_POLL_INTERVAL_MS", &mut cfg.result_poll_interval_ms)?;
        env_override("POOL_CONTEXT_TTL_SECONDS", &mut cfg.context_ttl_seconds)?;
        env_override("POOL_MAX_PENDING_EXECUTIONS", &mut cfg.max_pending_executions)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Default per-job timeout.
    #[must_use]
    pub const fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.execution_timeout_seconds)
    }

    /// Graceful termination budget.
    #[must_use]
    pub const fn graceful_shutdown(&self) -> Duration {
        Duration::from_secs(self.graceful_shutdown_seconds)
    }

    /// Heartbeat period.
    #[must_use]
    pub const fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_seconds)
    }

    /// Registration and heartbeat TTL.
    #[must_use]
    pub const fn registration_ttl(&self) -> Duration {
        Duration::from_secs(self.registration_ttl_seconds)
    }

    /// Health loop period.
    #[must_use]
    pub const fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }

    /// Timeout loop period.
    #[must_use]
    pub const fn timeout_check_interval(&self) -> Duration {
        Duration::from_millis(self.timeout_check_interval_ms)
    }

    /// Result loop period.
    #[must_use]
    pub const fn result_poll_interval(&self) -> Duration {
        Duration::from_millis(self.result_poll_interval_ms)
    }

    /// Context key TTL.
    #[must_use]
    pub const fn context_ttl(&self) -> Duration {
        Duration::from_secs(self.context_ttl_seconds)
    }
}

pub(crate) fn env_override<T: FromStr>(name: &str, target: &mut T) -> Result<(), String> {
    match std::env::var(name) {
        Ok(raw) => {
            *target = raw
                .trim()
                .parse()
                .map_err(|_| format!("{name}: cannot parse `{raw}`"))?;
            Ok(())
        }
        Err(_) => Ok(()),
    }
}
