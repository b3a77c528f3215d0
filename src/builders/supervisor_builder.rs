//! Builder wiring a [`PoolSupervisor`] from configuration and collaborators.

use std::sync::Arc;

use crate::config::PoolConfig;
use crate::core::{
    AuditSink, NoopCallback, PoolError, PoolSupervisor, ResultCallback, TracingAuditSink,
};
use crate::infra::store::{ContextStore, MemoryStore};
use crate::process::ProcessSpawner;

/// Collects the pieces of a supervisor; everything but the spawner has a
/// default.
///
/// | piece      | default             |
/// |------------|---------------------|
/// | store      | [`MemoryStore`]     |
/// | callback   | [`NoopCallback`]    |
/// | audit      | [`TracingAuditSink`]|
/// | loops      | enabled             |
pub struct SupervisorBuilder {
    config: PoolConfig,
    store: Option<Arc<dyn ContextStore>>,
    spawner: Option<Arc<dyn ProcessSpawner>>,
    callback: Option<Arc<dyn ResultCallback>>,
    audit: Option<Arc<dyn AuditSink>>,
    background_loops: bool,
}

impl SupervisorBuilder {
    /// Start from `config`.
    #[must_use]
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            store: None,
            spawner: None,
            callback: None,
            audit: None,
            background_loops: true,
        }
    }

    /// Shared context store.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn ContextStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// How workers are started.
    #[must_use]
    pub fn spawner(mut self, spawner: Arc<dyn ProcessSpawner>) -> Self {
        self.spawner = Some(spawner);
        self
    }

    /// Consumer of terminal results.
    #[must_use]
    pub fn callback(mut self, callback: Arc<dyn ResultCallback>) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Audit sink for lifecycle events.
    #[must_use]
    pub fn audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Whether `start` launches the health, timeout, result, and heartbeat
    /// loops. With loops off the host drives the tick methods itself.
    #[must_use]
    pub const fn background_loops(mut self, enabled: bool) -> Self {
        self.background_loops = enabled;
        self
    }

    /// Validate the configuration and assemble the supervisor.
    ///
    /// # Errors
    ///
    /// `PoolError::InvalidConfig` if validation fails or no spawner was given.
    pub fn build(self) -> Result<PoolSupervisor, PoolError> {
        self.config.validate().map_err(PoolError::InvalidConfig)?;
        let spawner = self
            .spawner
            .ok_or_else(|| PoolError::InvalidConfig("a process spawner is required".into()))?;
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let callback = self.callback.unwrap_or_else(|| Arc::new(NoopCallback));
        let audit = self.audit.unwrap_or_else(|| Arc::new(TracingAuditSink));

        tracing::debug!(
            worker_id = %self.config.worker_id,
            min_workers = self.config.min_workers,
            max_workers = self.config.max_workers,
            background_loops = self.background_loops,
            "building pool supervisor"
        );
        Ok(PoolSupervisor::from_parts(
            self.config,
            store,
            spawner,
            callback,
            audit,
            self.background_loops,
        ))
    }
}

impl PoolSupervisor {
    /// Shorthand for [`SupervisorBuilder::new`].
    #[must_use]
    pub fn builder(config: PoolConfig) -> SupervisorBuilder {
        SupervisorBuilder::new(config)
    }
}
