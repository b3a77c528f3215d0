//! Worker process configuration.
//!
//! The supervisor passes these values to each child through environment
//! variables; in-process workers receive the struct directly.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::pool::env_override;

/// Environment variable carrying the fleet identity.
pub const ENV_WORKER_ID: &str = "POOL_WORKER_ID";
/// Environment variable carrying the process handle id.
pub const ENV_PROCESS_ID: &str = "POOL_PROCESS_ID";
/// Environment variable carrying the store key prefix.
pub const ENV_KEY_PREFIX: &str = "POOL_KEY_PREFIX";
/// Environment variable carrying the dependency install budget.
pub const ENV_INSTALL_TIMEOUT_SECONDS: &str = "POOL_INSTALL_TIMEOUT_SECONDS";
/// Environment variable carrying the graceful shutdown budget.
pub const ENV_GRACEFUL_SHUTDOWN_SECONDS: &str = "POOL_GRACEFUL_SHUTDOWN_SECONDS";

/// Settings for one worker loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Fleet identity stamped on every result.
    pub worker_id: String,
    /// Process handle id assigned by the supervisor.
    pub process_id: String,
    /// Store key prefix shared with the supervisor.
    pub key_prefix: String,
    /// Attempts to read the dependency manifest before giving up.
    pub startup_max_attempts: u32,
    /// Initial backoff between manifest read attempts; doubles each retry.
    pub startup_backoff_ms: u64,
    /// Where the last installed manifest hash is recorded, if anywhere.
    pub requirements_marker: Option<PathBuf>,
    /// Longest the dependency installer may run before the worker moves on.
    pub install_timeout_seconds: u64,
    /// Budget for finishing the current job after a stop signal.
    pub graceful_shutdown_seconds: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: "local".into(),
            process_id: "local-0".into(),
            key_prefix: "workflow".into(),
            startup_max_attempts: 3,
            startup_backoff_ms: 500,
            requirements_marker: None,
            install_timeout_seconds: 300,
            graceful_shutdown_seconds: 5,
        }
    }
}

impl WorkerConfig {
    /// Config for `process_id` in fleet `worker_id`.
    pub fn new(worker_id: impl Into<String>, process_id: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            process_id: process_id.into(),
            ..Self::default()
        }
    }

    /// Set the store key prefix.
    #[must_use]
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Set the manifest retry policy.
    #[must_use]
    pub const fn with_startup_retry(mut self, max_attempts: u32, backoff_ms: u64) -> Self {
        self.startup_max_attempts = max_attempts;
        self.startup_backoff_ms = backoff_ms;
        self
    }

    /// Record installed manifest hashes at `path`.
    #[must_use]
    pub fn with_requirements_marker(mut self, path: impl Into<PathBuf>) -> Self {
        self.requirements_marker = Some(path.into());
        self
    }

    /// Cap the dependency install at `seconds`.
    #[must_use]
    pub const fn with_install_timeout(mut self, seconds: u64) -> Self {
        self.install_timeout_seconds = seconds;
        self
    }

    /// Dependency install budget.
    #[must_use]
    pub const fn install_timeout(&self) -> Duration {
        Duration::from_secs(self.install_timeout_seconds)
    }

    /// Initial manifest retry backoff.
    #[must_use]
    pub const fn startup_backoff(&self) -> Duration {
        Duration::from_millis(self.startup_backoff_ms)
    }

    /// Graceful shutdown budget.
    #[must_use]
    pub const fn graceful_shutdown(&self) -> Duration {
        Duration::from_secs(self.graceful_shutdown_seconds)
    }

    /// Read the worker settings the supervisor exported for this child.
    ///
    /// # Errors
    ///
    /// Returns a message if a required variable is missing or a numeric
    /// variable fails to parse.
    pub fn from_env() -> Result<Self, String> {
        let mut cfg = Self::default();
        cfg.worker_id =
            std::env::var(ENV_WORKER_ID).map_err(|_| format!("{ENV_WORKER_ID} is not set"))?;
        cfg.process_id =
            std::env::var(ENV_PROCESS_ID).map_err(|_| format!("{ENV_PROCESS_ID} is not set"))?;
        if let Ok(prefix) = std::env::var(ENV_KEY_PREFIX) {
            cfg.key_prefix = prefix;
        }
        if let Ok(marker) = std::env::var("POOL_REQUIREMENTS_MARKER") {
            cfg.requirements_marker = Some(PathBuf::from(marker));
        }
        env_override("POOL_STARTUP_MAX_ATTEMPTS", &mut cfg.startup_max_attempts)?;
        env_override("POOL_STARTUP_BACKOFF_MS", &mut cfg.startup_backoff_ms)?;
        env_override(ENV_INSTALL_TIMEOUT_SECONDS, &mut cfg.install_timeout_seconds)?;
        env_override(ENV_GRACEFUL_SHUTDOWN_SECONDS, &mut cfg.graceful_shutdown_seconds)?;
        Ok(cfg)
    }
}
