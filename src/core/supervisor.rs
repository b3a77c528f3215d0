//! Pool supervisor: owns the worker fleet, routes executions to it, and keeps
//! it healthy.
//!
//! All pool mutations happen under one `parking_lot` lock that is never held
//! across an `.await`; spawning, store I/O, termination, and callbacks run
//! outside it. Four background loops (health, timeout, result, heartbeat) call
//! the same public tick methods a host can drive by hand, and all of them stop
//! on one cancellation token.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::audit::{build_audit_event, AuditAction, AuditSink};
use super::callback::ResultCallback;
use super::pool::{Pool, ProcessHandle};
use super::result::ExecutionResult;
use super::state::{ExecutionInfo, LifecycleState};
use super::status::{Heartbeat, PoolStatus, Registration};
use super::PoolError;
use crate::config::PoolConfig;
use crate::infra::store::{ContextStore, StoreExt, StoreKeys};
use crate::ipc::WorkerMessage;
use crate::process::ProcessSpawner;

/// How long shutdown waits for a busy worker's final frame after it exits.
const SHUTDOWN_DRAIN: Duration = Duration::from_millis(200);

/// Where a routed execution went.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RouteOutcome {
    /// Bound to a worker and pushed to its inbound queue.
    Dispatched {
        /// Handle now running the execution.
        process_id: String,
    },
    /// Every worker is busy at `max_workers`; waiting in the pending queue.
    Queued {
        /// 1-based position in the pending queue.
        position: usize,
    },
}

/// Supervisor of a worker-process pool. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct PoolSupervisor {
    inner: Arc<Inner>,
}

struct Inner {
    config: PoolConfig,
    keys: StoreKeys,
    store: Arc<dyn ContextStore>,
    spawner: Arc<dyn ProcessSpawner>,
    callback: Arc<dyn ResultCallback>,
    audit: Arc<dyn AuditSink>,
    background_loops: bool,
    pool: Mutex<Pool>,
    lifecycle: Mutex<LifecycleState>,
    registered_at: Mutex<Option<DateTime<Utc>>>,
    cancel: CancellationToken,
    loops: Mutex<Vec<JoinHandle<()>>>,
    retiring: Mutex<JoinSet<()>>,
    next_seq: AtomicU64,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl PoolSupervisor {
    pub(crate) fn from_parts(
        config: PoolConfig,
        store: Arc<dyn ContextStore>,
        spawner: Arc<dyn ProcessSpawner>,
        callback: Arc<dyn ResultCallback>,
        audit: Arc<dyn AuditSink>,
        background_loops: bool,
    ) -> Self {
        let pool = Pool::new(config.max_workers, config.max_pending_executions);
        Self {
            inner: Arc::new(Inner {
                keys: StoreKeys::new(config.key_prefix.clone()),
                config,
                store,
                spawner,
                callback,
                audit,
                background_loops,
                pool: Mutex::new(pool),
                lifecycle: Mutex::new(LifecycleState::NotStarted),
                registered_at: Mutex::new(None),
                cancel: CancellationToken::new(),
                loops: Mutex::new(Vec::new()),
                retiring: Mutex::new(JoinSet::new()),
                next_seq: AtomicU64::new(0),
            }),
        }
    }

    /// Configuration in effect.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Store key layout shared with workers.
    #[must_use]
    pub fn keys(&self) -> &StoreKeys {
        &self.inner.keys
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn lifecycle(&self) -> LifecycleState {
        *self.inner.lifecycle.lock()
    }

    fn accepting(&self) -> bool {
        self.lifecycle() == LifecycleState::Running
    }

    fn ensure_running(&self) -> Result<(), PoolError> {
        match self.lifecycle() {
            LifecycleState::Running => Ok(()),
            LifecycleState::NotStarted => Err(PoolError::NotRunning),
            LifecycleState::ShuttingDown | LifecycleState::Stopped => {
                Err(PoolError::AlreadyShutdown)
            }
        }
    }

    /// Spawn `min_workers`, register the fleet, and launch the background
    /// loops. A second call is a no-op.
    ///
    /// # Errors
    ///
    /// `PoolError::Spawn` if the initial workers cannot be started (the
    /// supervisor returns to `NotStarted`), or `AlreadyShutdown`.
    pub async fn start(&self) -> Result<(), PoolError> {
        {
            let mut lifecycle = self.inner.lifecycle.lock();
            match *lifecycle {
                LifecycleState::Running => {
                    tracing::debug!("supervisor already started");
                    return Ok(());
                }
                LifecycleState::ShuttingDown | LifecycleState::Stopped => {
                    return Err(PoolError::AlreadyShutdown);
                }
                LifecycleState::NotStarted => *lifecycle = LifecycleState::Running,
            }
        }

        if let Err(e) = self.replenish() {
            tracing::error!(error = %e, "failed to spawn initial workers");
            let (handles, _) = self.inner.pool.lock().drain_all();
            for mut handle in handles {
                handle.kill();
            }
            *self.inner.lifecycle.lock() = LifecycleState::NotStarted;
            return Err(e);
        }

        *self.inner.registered_at.lock() = Some(Utc::now());
        if let Err(e) = self.register() {
            tracing::warn!(error = %e, "fleet registration failed");
        }
        if self.inner.background_loops {
            self.launch_loops();
        }

        tracing::info!(
            worker_id = %self.inner.config.worker_id,
            pool_size = self.inner.pool.lock().len(),
            "pool supervisor started"
        );
        Ok(())
    }

    /// Route one execution: write its context, then bind it to a worker.
    ///
    /// The context write always happens before the execution id is pushed to
    /// any worker. `timeout` defaults to `execution_timeout_seconds`.
    ///
    /// # Errors
    ///
    /// - `NotRunning` / `AlreadyShutdown` outside the running state
    /// - `DuplicateExecution` if the id is already running or pending
    /// - `Serialization` / `Store` if the context cannot be written
    /// - `Backpressure` if every worker is busy at `max_workers` and the
    ///   pending queue is full
    /// - `Spawn` if a needed worker cannot be started
    pub fn route_execution<C: Serialize + ?Sized>(
        &self,
        execution_id: &str,
        context: &C,
        timeout: Option<Duration>,
    ) -> Result<RouteOutcome, PoolError> {
        self.ensure_running()?;
        if execution_id.trim().is_empty() {
            return Err(PoolError::InvalidConfig("execution_id must not be empty".into()));
        }
        let timeout = timeout.unwrap_or_else(|| self.inner.config.execution_timeout());
        if timeout.is_zero() {
            return Err(PoolError::InvalidConfig(
                "execution timeout must be positive".into(),
            ));
        }
        if !self.inner.pool.lock().begin_routing(execution_id) {
            return Err(PoolError::DuplicateExecution(execution_id.to_owned()));
        }
        let routed = self.write_and_bind(execution_id, context, timeout);
        self.inner.pool.lock().end_routing(execution_id);

        match routed {
            Ok(outcome) => {
                match &outcome {
                    RouteOutcome::Dispatched { process_id } => {
                        tracing::info!(execution_id, process_id = %process_id, "execution dispatched");
                        self.audit(Some(process_id), Some(execution_id), AuditAction::Route, None);
                    }
                    RouteOutcome::Queued { position } => {
                        tracing::info!(execution_id, position, "pool saturated; execution queued");
                        self.audit(
                            None,
                            Some(execution_id),
                            AuditAction::Queue,
                            Some(format!("position={position}")),
                        );
                    }
                }
                Ok(outcome)
            }
            Err(e) => {
                self.discard_context(execution_id);
                if let PoolError::Backpressure { pending, capacity } = &e {
                    tracing::warn!(execution_id, pending, capacity, "execution rejected: backpressure");
                    self.audit(None, Some(execution_id), AuditAction::Reject, Some(e.to_string()));
                }
                Err(e)
            }
        }
    }

    /// Runs while `execution_id` is claimed, so no other route can write or
    /// bind the same id in between.
    fn write_and_bind<C: Serialize + ?Sized>(
        &self,
        execution_id: &str,
        context: &C,
        timeout: Duration,
    ) -> Result<RouteOutcome, PoolError> {
        let bytes =
            serde_json::to_vec(context).map_err(|e| PoolError::Serialization(e.to_string()))?;
        self.inner.store.put(
            &self.inner.keys.context(execution_id),
            &bytes,
            Some(self.inner.config.context_ttl()),
        )?;
        self.bind(execution_id, timeout)
    }

    fn bind(&self, execution_id: &str, timeout: Duration) -> Result<RouteOutcome, PoolError> {
        {
            let mut pool = self.inner.pool.lock();
            if let Ok(process_id) = pool.assign_idle(ExecutionInfo::new(execution_id, timeout)) {
                return Ok(RouteOutcome::Dispatched { process_id });
            }
            if !pool.reserve_spawn() {
                let position = pool.enqueue_pending(execution_id, timeout)?;
                return Ok(RouteOutcome::Queued { position });
            }
        }
        let process_id =
            self.spawn_reserved(Some(ExecutionInfo::new(execution_id, timeout)))?;
        Ok(RouteOutcome::Dispatched { process_id })
    }

    /// Gracefully replace an idle worker. Returns false, leaving the worker
    /// untouched, if it is missing or busy.
    pub async fn recycle_process(&self, process_id: &str) -> bool {
        let handle = self.inner.pool.lock().remove_if_idle(process_id);
        let Some(handle) = handle else {
            tracing::debug!(process_id, "recycle skipped: worker missing or busy");
            return false;
        };
        self.retire(handle, AuditAction::Recycle);
        self.replace_one();
        self.dispatch_pending();
        true
    }

    /// Read-only snapshot of the pool.
    #[must_use]
    pub fn get_status(&self) -> PoolStatus {
        let lifecycle = self.lifecycle();
        let pool = self.inner.pool.lock();
        PoolStatus {
            started: lifecycle == LifecycleState::Running,
            shutdown: matches!(
                lifecycle,
                LifecycleState::ShuttingDown | LifecycleState::Stopped
            ),
            lifecycle,
            worker_id: self.inner.config.worker_id.clone(),
            pool_size: pool.len(),
            min_workers: self.inner.config.min_workers,
            max_workers: self.inner.config.max_workers,
            pending_count: pool.pending_len(),
            processes: pool.statuses(),
        }
    }

    /// Health tick: reap dead workers (reporting crashes), restore
    /// `min_workers`, scale down excess idle workers, and dispatch anything
    /// pending.
    pub async fn check_health(&self) {
        if !self.accepting() {
            return;
        }
        let dead = self.inner.pool.lock().remove_dead();
        for handle in dead {
            self.handle_dead(handle).await;
        }
        if let Err(e) = self.replenish() {
            tracing::warn!(error = %e, "failed to restore min_workers");
        }
        self.scale_down().await;
        self.dispatch_pending();
    }

    async fn handle_dead(&self, mut handle: ProcessHandle) {
        let detail = handle
            .exit_detail()
            .unwrap_or_else(|| "exit status unavailable".into());

        while let Some(message) = handle.try_recv() {
            if let WorkerMessage::Result(result) = message {
                if handle.complete(&result.execution_id).is_some() {
                    self.audit(
                        Some(handle.id()),
                        Some(&result.execution_id),
                        AuditAction::Complete,
                        None,
                    );
                    self.deliver(result).await;
                } else {
                    tracing::warn!(
                        process_id = handle.id(),
                        execution_id = %result.execution_id,
                        "discarding stale result from dead worker"
                    );
                }
            }
        }

        let lost = handle.mark_killed();
        handle.kill();
        match lost {
            Some(info) => {
                tracing::warn!(
                    process_id = handle.id(),
                    pid = handle.pid(),
                    execution_id = info.execution_id(),
                    detail = %detail,
                    "worker crashed mid-execution"
                );
                self.audit(
                    Some(handle.id()),
                    Some(info.execution_id()),
                    AuditAction::Crash,
                    Some(detail.clone()),
                );
                self.report_crash(&info, &detail).await;
            }
            None => {
                tracing::info!(process_id = handle.id(), detail = %detail, "idle worker exited");
                self.audit(Some(handle.id()), None, AuditAction::Crash, Some(detail));
            }
        }
    }

    /// Timeout tick: kill every worker whose execution exceeded its timeout,
    /// report the timeout, and spawn one replacement per killed worker.
    pub async fn check_timeouts(&self) -> usize {
        let expired = self.inner.pool.lock().remove_timed_out();
        let count = expired.len();
        for mut handle in expired {
            handle.kill();
            let info = handle.mark_killed();
            discard_late(&mut handle);
            if let Some(info) = info {
                tracing::warn!(
                    process_id = handle.id(),
                    pid = handle.pid(),
                    execution_id = info.execution_id(),
                    elapsed_ms = u64::try_from(info.elapsed().as_millis()).unwrap_or(u64::MAX),
                    "execution timed out; worker killed"
                );
                self.audit(
                    Some(handle.id()),
                    Some(info.execution_id()),
                    AuditAction::Timeout,
                    None,
                );
                self.report_timeout(&info).await;
            }
            self.replace_one();
        }
        if count > 0 {
            self.dispatch_pending();
        }
        count
    }

    /// Retire the oldest idle workers once idle workers outnumber
    /// `pool_size - min_workers`. Busy workers are never touched. Returns how
    /// many were retired; their termination finishes in the background.
    pub async fn scale_down(&self) -> usize {
        let victims = self
            .inner
            .pool
            .lock()
            .remove_excess_idle(self.inner.config.min_workers);
        let count = victims.len();
        for handle in victims {
            self.retire(handle, AuditAction::ScaleDown);
        }
        if count > 0 {
            tracing::info!(terminated = count, "scaled down idle workers");
        }
        count
    }

    /// Result tick: drain every worker's outbound queue and settle each
    /// result. Returns how many results were delivered.
    pub async fn drain_results(&self) -> usize {
        let messages = self.inner.pool.lock().drain_messages();
        let mut delivered = 0;
        for (process_id, message) in messages {
            match message {
                WorkerMessage::Ready { pid, .. } => {
                    tracing::debug!(process_id = %process_id, pid, "worker ready");
                }
                WorkerMessage::Result(result) => {
                    if self.handle_result(&process_id, result).await {
                        delivered += 1;
                    }
                }
            }
        }
        delivered
    }

    async fn handle_result(&self, process_id: &str, result: ExecutionResult) -> bool {
        let threshold = self.inner.config.recycle_after_executions;
        let settled = {
            let mut pool = self.inner.pool.lock();
            pool.complete(process_id, &result.execution_id).map(|_| {
                let worn_out = threshold > 0
                    && pool
                        .get(process_id)
                        .is_some_and(|h| h.executions_completed() >= threshold);
                if worn_out {
                    pool.remove_if_idle(process_id)
                } else {
                    None
                }
            })
        };
        let Some(recycle) = settled else {
            tracing::warn!(
                process_id,
                execution_id = %result.execution_id,
                "ignoring result: execution no longer bound to this worker"
            );
            return false;
        };

        tracing::debug!(
            process_id,
            execution_id = %result.execution_id,
            status = ?result.status,
            "result received"
        );
        self.audit(
            Some(process_id),
            Some(&result.execution_id),
            AuditAction::Complete,
            Some(format!("{:?}", result.status)),
        );
        self.deliver(result).await;

        if let Some(handle) = recycle {
            tracing::info!(process_id, threshold, "recycling worker after execution threshold");
            self.retire(handle, AuditAction::Recycle);
            self.replace_one();
        }
        self.dispatch_pending();
        true
    }

    /// Heartbeat tick: publish a snapshot and refresh the fleet registration,
    /// both with `registration_ttl_seconds` expiry.
    ///
    /// # Errors
    ///
    /// The store error if either write fails.
    pub fn publish_heartbeat(&self) -> Result<Heartbeat, PoolError> {
        let heartbeat = {
            let pool = self.inner.pool.lock();
            Heartbeat {
                worker_id: self.inner.config.worker_id.clone(),
                pool_size: pool.len(),
                idle_count: pool.idle_count(),
                busy_count: pool.busy_count(),
                pending_count: pool.pending_len(),
                processes: pool.statuses(),
                timestamp: Utc::now(),
            }
        };
        self.inner.store.put_json(
            &self.inner.keys.heartbeat(&self.inner.config.worker_id),
            &heartbeat,
            Some(self.inner.config.registration_ttl()),
        )?;
        self.register()?;
        tracing::trace!(
            pool_size = heartbeat.pool_size,
            busy = heartbeat.busy_count,
            "heartbeat published"
        );
        Ok(heartbeat)
    }

    fn register(&self) -> Result<(), PoolError> {
        let registered_at = self.inner.registered_at.lock().unwrap_or_else(Utc::now);
        let registration = Registration {
            worker_id: self.inner.config.worker_id.clone(),
            supervisor_pid: std::process::id(),
            min_workers: self.inner.config.min_workers,
            max_workers: self.inner.config.max_workers,
            registered_at,
        };
        self.inner.store.put_json(
            &self.inner.keys.registration(&self.inner.config.worker_id),
            &registration,
            Some(self.inner.config.registration_ttl()),
        )?;
        Ok(())
    }

    /// Stop the loops, terminate every worker within the graceful budget, and
    /// report anything unfinished. Idempotent.
    ///
    /// Pending executions are reported as cancelled; busy workers get the
    /// graceful budget to deliver their result before being reported as
    /// interrupted.
    pub async fn shutdown(&self) {
        {
            let mut lifecycle = self.inner.lifecycle.lock();
            match *lifecycle {
                LifecycleState::NotStarted => {
                    *lifecycle = LifecycleState::Stopped;
                    return;
                }
                LifecycleState::ShuttingDown | LifecycleState::Stopped => return,
                LifecycleState::Running => *lifecycle = LifecycleState::ShuttingDown,
            }
        }
        tracing::info!(worker_id = %self.inner.config.worker_id, "pool supervisor shutting down");

        self.inner.cancel.cancel();
        let loops = std::mem::take(&mut *self.inner.loops.lock());
        for task in loops {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "supervisor loop ended abnormally");
            }
        }

        self.drain_results().await;
        self.await_retirements().await;
        let (handles, pending) = self.inner.pool.lock().drain_all();

        for item in pending {
            self.discard_context(&item.execution_id);
            self.audit(None, Some(&item.execution_id), AuditAction::Shutdown, None);
            self.deliver(ExecutionResult::pool_shutdown(
                &item.execution_id,
                &self.inner.config.worker_id,
            ))
            .await;
        }

        let grace = self.inner.config.graceful_shutdown();
        let mut terminating = JoinSet::new();
        for mut handle in handles {
            terminating.spawn(async move {
                handle.terminate(grace).await;
                handle
            });
        }
        while let Some(joined) = terminating.join_next().await {
            match joined {
                Ok(handle) => self.settle_on_shutdown(handle).await,
                Err(e) => tracing::error!(error = %e, "worker termination task failed"),
            }
        }

        let worker_id = &self.inner.config.worker_id;
        for key in [
            self.inner.keys.registration(worker_id),
            self.inner.keys.heartbeat(worker_id),
        ] {
            if let Err(e) = self.inner.store.delete(&key) {
                tracing::warn!(key = %key, error = %e, "failed to remove fleet key");
            }
        }

        *self.inner.lifecycle.lock() = LifecycleState::Stopped;
        tracing::info!(worker_id = %worker_id, "pool supervisor stopped");
    }

    async fn settle_on_shutdown(&self, mut handle: ProcessHandle) {
        if handle.current_execution().is_some() {
            for message in handle.drain_outbound(SHUTDOWN_DRAIN).await {
                if let WorkerMessage::Result(result) = message {
                    if handle.complete(&result.execution_id).is_some() {
                        self.deliver(result).await;
                    }
                }
            }
        }
        if let Some(info) = handle.mark_killed() {
            tracing::warn!(
                process_id = handle.id(),
                execution_id = info.execution_id(),
                "execution interrupted by shutdown"
            );
            self.discard_context(info.execution_id());
            self.deliver(ExecutionResult::interrupted(
                &info,
                &self.inner.config.worker_id,
            ))
            .await;
        }
        self.audit(Some(handle.id()), None, AuditAction::Shutdown, None);
    }

    async fn report_crash(&self, info: &ExecutionInfo, detail: &str) {
        self.discard_context(info.execution_id());
        self.deliver(ExecutionResult::crashed(
            info,
            &self.inner.config.worker_id,
            detail,
        ))
        .await;
    }

    async fn report_timeout(&self, info: &ExecutionInfo) {
        self.discard_context(info.execution_id());
        self.deliver(ExecutionResult::timed_out(info, &self.inner.config.worker_id))
            .await;
    }

    /// Invoke the callback on its own task so a panic is contained.
    async fn deliver(&self, result: ExecutionResult) {
        let callback = Arc::clone(&self.inner.callback);
        let execution_id = result.execution_id.clone();
        match tokio::spawn(async move { callback.on_result(result).await }).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!(execution_id = %execution_id, error = %e, "result callback failed");
            }
            Err(e) => {
                tracing::error!(execution_id = %execution_id, error = %e, "result callback panicked");
            }
        }
    }

    fn discard_context(&self, execution_id: &str) {
        if let Err(e) = self.inner.store.delete(&self.inner.keys.context(execution_id)) {
            tracing::debug!(execution_id, error = %e, "failed to delete execution context");
        }
    }

    /// Terminate a handle already removed from the pool. The graceful stop
    /// runs on a background task so no tick waits on the worker.
    fn retire(&self, mut handle: ProcessHandle, action: AuditAction) {
        handle.mark_killed();
        self.audit(Some(handle.id()), None, action, None);
        let grace = self.inner.config.graceful_shutdown();

        let mut retiring = self.inner.retiring.lock();
        while let Some(done) = retiring.try_join_next() {
            if let Err(e) = done {
                tracing::error!(error = %e, "worker retirement task failed");
            }
        }
        retiring.spawn(async move {
            handle.terminate(grace).await;
            discard_late(&mut handle);
            tracing::info!(process_id = handle.id(), pid = handle.pid(), %action, "worker terminated");
        });
    }

    /// Wait until every retired worker has finished terminating.
    pub async fn await_retirements(&self) {
        loop {
            let mut retiring = std::mem::take(&mut *self.inner.retiring.lock());
            if retiring.is_empty() {
                break;
            }
            while let Some(done) = retiring.join_next().await {
                if let Err(e) = done {
                    tracing::error!(error = %e, "worker retirement task failed");
                }
            }
        }
    }

    /// Spawn until live plus in-flight spawns reach `min_workers`.
    fn replenish(&self) -> Result<usize, PoolError> {
        let mut spawned = 0;
        while self
            .inner
            .pool
            .lock()
            .reserve_spawn_below(self.inner.config.min_workers)
        {
            self.spawn_reserved(None)?;
            spawned += 1;
        }
        if spawned > 0 {
            tracing::info!(spawned, "restored minimum worker count");
        }
        Ok(spawned)
    }

    /// Spawn one worker in place of a removed one, if capacity allows.
    fn replace_one(&self) {
        if !self.accepting() || !self.inner.pool.lock().reserve_spawn() {
            return;
        }
        match self.spawn_reserved(None) {
            Ok(process_id) => {
                self.audit(Some(&process_id), None, AuditAction::Replace, None);
            }
            Err(e) => tracing::warn!(error = %e, "failed to spawn replacement worker"),
        }
    }

    /// Hand waiting executions to idle workers, spawning while there is room.
    fn dispatch_pending(&self) {
        loop {
            let (dispatched, reserved) = {
                let mut pool = self.inner.pool.lock();
                let dispatched = pool.dispatch_pending();
                let reserved = pool.pending_len() > 0 && self.accepting() && pool.reserve_spawn();
                (dispatched, reserved)
            };
            for d in &dispatched {
                tracing::info!(
                    execution_id = %d.execution_id,
                    process_id = %d.process_id,
                    "pending execution dispatched"
                );
                self.audit(
                    Some(&d.process_id),
                    Some(&d.execution_id),
                    AuditAction::Route,
                    Some("from_pending".into()),
                );
            }
            if !reserved {
                break;
            }
            if let Err(e) = self.spawn_reserved(None) {
                tracing::warn!(error = %e, "failed to spawn worker for pending executions");
                break;
            }
        }
    }

    /// Spawn against a reservation already taken, insert the handle, and
    /// optionally bind `info` to it in the same critical section.
    fn spawn_reserved(&self, info: Option<ExecutionInfo>) -> Result<String, PoolError> {
        let seq = self.inner.next_seq.fetch_add(1, Ordering::Relaxed);
        let process_id = format!("{}:{seq}", self.inner.config.worker_id);
        let spawned = match self.inner.spawner.spawn(&process_id) {
            Ok(spawned) => spawned,
            Err(e) => {
                self.inner.pool.lock().release_spawn();
                return Err(e);
            }
        };
        let mut handle = ProcessHandle::new(process_id.clone(), spawned);
        tracing::info!(process_id = %process_id, pid = handle.pid(), "spawned worker");
        self.audit(Some(&process_id), None, AuditAction::Spawn, None);

        {
            let mut pool = self.inner.pool.lock();
            if self.accepting() {
                pool.insert_spawned(handle);
                if let Some(info) = info {
                    pool.assign_to(&process_id, info)?;
                }
                return Ok(process_id);
            }
            pool.release_spawn();
        }
        handle.kill();
        Err(PoolError::NotRunning)
    }

    fn launch_loops(&self) {
        let cfg = &self.inner.config;
        let tasks = [
            self.spawn_loop("health", cfg.health_check_interval(), |s| async move {
                s.check_health().await;
            }),
            self.spawn_loop("timeout", cfg.timeout_check_interval(), |s| async move {
                s.check_timeouts().await;
            }),
            self.spawn_loop("result", cfg.result_poll_interval(), |s| async move {
                s.drain_results().await;
            }),
            self.spawn_loop("heartbeat", cfg.heartbeat_interval(), |s| async move {
                if let Err(e) = s.publish_heartbeat() {
                    tracing::warn!(error = %e, "heartbeat publish failed");
                }
            }),
        ];
        self.inner.loops.lock().extend(tasks);
    }

    fn spawn_loop<F, Fut>(&self, name: &'static str, period: Duration, tick: F) -> JoinHandle<()>
    where
        F: Fn(Self) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let weak = Arc::downgrade(&self.inner);
        let cancel = self.inner.cancel.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval.tick().await;
            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        let Some(inner) = weak.upgrade() else { break };
                        tick(Self { inner }).await;
                    }
                }
            }
            tracing::debug!(loop_name = name, "supervisor loop stopped");
        })
    }

    fn audit(
        &self,
        process_id: Option<&str>,
        execution_id: Option<&str>,
        action: AuditAction,
        payload: Option<String>,
    ) {
        self.inner.audit.record(build_audit_event(
            &self.inner.config.worker_id,
            process_id,
            execution_id,
            action,
            payload,
        ));
    }
}

fn discard_late(handle: &mut ProcessHandle) {
    while let Some(message) = handle.try_recv() {
        if let WorkerMessage::Result(result) = message {
            tracing::warn!(
                process_id = handle.id(),
                execution_id = %result.execution_id,
                "discarding late result from terminated worker"
            );
        }
    }
}

impl std::fmt::Debug for PoolSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolSupervisor")
            .field("worker_id", &self.inner.config.worker_id)
            .field("lifecycle", &self.lifecycle())
            .finish_non_exhaustive()
    }
}
