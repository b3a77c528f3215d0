//! Process handles and the pool aggregate that owns them.
//!
//! [`Pool`] is the supervisor's single mutable map. It is only ever touched
//! under the supervisor's lock, and every mutation goes through one of the
//! operations below; nothing hands out the underlying map.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::pending::{PendingExecution, PendingQueue};
use super::state::{ExecutionInfo, ExecutionSnapshot, ProcessState};
use super::PoolError;
use crate::ipc::{WorkerCommand, WorkerMessage};
use crate::process::{SpawnedProcess, SupervisableProcess};

/// Supervisor-side record of one live worker.
pub struct ProcessHandle {
    id: String,
    process: Box<dyn SupervisableProcess>,
    pid: u32,
    state: ProcessState,
    inbound: mpsc::UnboundedSender<WorkerCommand>,
    outbound: mpsc::UnboundedReceiver<WorkerMessage>,
    started_at: Instant,
    idle_since: Instant,
    current_execution: Option<ExecutionInfo>,
    executions_completed: u64,
}

impl ProcessHandle {
    /// Wrap a freshly spawned worker; it starts idle.
    pub fn new(id: impl Into<String>, spawned: SpawnedProcess) -> Self {
        let now = Instant::now();
        let pid = spawned.process.pid();
        Self {
            id: id.into(),
            process: spawned.process,
            pid,
            state: ProcessState::Idle,
            inbound: spawned.inbound,
            outbound: spawned.outbound,
            started_at: now,
            idle_since: now,
            current_execution: None,
            executions_completed: 0,
        }
    }

    /// Process handle id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// OS process id.
    #[must_use]
    pub const fn pid(&self) -> u32 {
        self.pid
    }

    /// Lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ProcessState {
        self.state
    }

    /// The execution this handle is running, if busy.
    #[must_use]
    pub const fn current_execution(&self) -> Option<&ExecutionInfo> {
        self.current_execution.as_ref()
    }

    /// Jobs completed over this handle's life.
    #[must_use]
    pub const fn executions_completed(&self) -> u64 {
        self.executions_completed
    }

    /// Probe the OS handle.
    pub fn is_alive(&mut self) -> bool {
        self.process.is_alive()
    }

    /// How the process ended, once it has.
    #[must_use]
    pub fn exit_detail(&self) -> Option<String> {
        self.process.exit_detail()
    }

    /// Seconds since spawn.
    #[must_use]
    pub fn uptime_seconds(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64()
    }

    /// Seconds since the handle last became idle; zero while busy.
    #[must_use]
    pub fn idle_seconds(&self) -> f64 {
        match self.state {
            ProcessState::Idle => self.idle_since.elapsed().as_secs_f64(),
            ProcessState::Busy | ProcessState::Killed => 0.0,
        }
    }

    /// Bind `info` to this idle handle and push its id to the inbound queue.
    ///
    /// # Errors
    ///
    /// `PoolError::Dispatch` if the handle is not idle or its queue is closed.
    /// The handle is left unchanged.
    pub fn assign(&mut self, info: ExecutionInfo) -> Result<(), PoolError> {
        if !self.state.can_transition_to(ProcessState::Busy) {
            return Err(PoolError::Dispatch(format!(
                "process {} is {}",
                self.id, self.state
            )));
        }
        let command = WorkerCommand::Execute {
            execution_id: info.execution_id().to_owned(),
        };
        self.inbound
            .send(command)
            .map_err(|_| PoolError::Dispatch(format!("process {} inbound queue closed", self.id)))?;
        self.state = ProcessState::Busy;
        self.current_execution = Some(info);
        Ok(())
    }

    /// Settle the running execution if it is `execution_id`: back to idle,
    /// one more completion. Returns the settled execution, or `None` when the
    /// id does not match (a late or foreign result).
    pub fn complete(&mut self, execution_id: &str) -> Option<ExecutionInfo> {
        let matches = self
            .current_execution
            .as_ref()
            .is_some_and(|info| info.execution_id() == execution_id);
        if !matches {
            return None;
        }
        self.state = ProcessState::Idle;
        self.idle_since = Instant::now();
        self.executions_completed += 1;
        self.current_execution.take()
    }

    /// Mark the handle terminal and release whatever it was running.
    pub fn mark_killed(&mut self) -> Option<ExecutionInfo> {
        self.state = ProcessState::Killed;
        self.current_execution.take()
    }

    /// Next message from the worker, without waiting.
    pub fn try_recv(&mut self) -> Option<WorkerMessage> {
        self.outbound.try_recv().ok()
    }

    /// Collect messages until the worker's outbound queue closes or `wait`
    /// elapses.
    pub async fn drain_outbound(&mut self, wait: Duration) -> Vec<WorkerMessage> {
        let deadline = Instant::now() + wait;
        let mut out = Vec::new();
        while let Ok(Some(message)) = tokio::time::timeout_at(deadline, self.outbound.recv()).await {
            out.push(message);
        }
        out
    }

    /// Ask the worker to finish and exit on its own.
    pub fn request_shutdown(&self) {
        let _ = self.inbound.send(WorkerCommand::Shutdown);
    }

    /// Graceful termination within `grace`, then force.
    pub async fn terminate(&mut self, grace: Duration) {
        self.request_shutdown();
        self.process.terminate(grace).await;
    }

    /// Immediate termination.
    pub fn kill(&mut self) {
        self.process.kill();
    }

    /// Serializable view.
    #[must_use]
    pub fn status(&self) -> ProcessStatus {
        ProcessStatus {
            process_id: self.id.clone(),
            state: self.state,
            pid: self.pid,
            uptime_seconds: self.uptime_seconds(),
            idle_seconds: self.idle_seconds(),
            executions_completed: self.executions_completed,
            current_execution: self.current_execution.as_ref().map(ExecutionInfo::snapshot),
        }
    }
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("id", &self.id)
            .field("pid", &self.pid)
            .field("state", &self.state)
            .field("current_execution", &self.current_execution)
            .field("executions_completed", &self.executions_completed)
            .finish_non_exhaustive()
    }
}

/// Point-in-time view of one handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessStatus {
    /// Process handle id.
    pub process_id: String,
    /// Lifecycle state.
    pub state: ProcessState,
    /// OS process id (0 for in-process workers).
    pub pid: u32,
    /// Seconds since spawn.
    pub uptime_seconds: f64,
    /// Seconds idle; zero while busy.
    pub idle_seconds: f64,
    /// Jobs completed.
    pub executions_completed: u64,
    /// Running execution, if any.
    pub current_execution: Option<ExecutionSnapshot>,
}

/// Dispatch of a pending execution to an idle handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    /// Execution identifier.
    pub execution_id: String,
    /// Handle now running it.
    pub process_id: String,
}

/// The live set of handles plus the executions waiting for one.
#[derive(Debug)]
pub struct Pool {
    handles: HashMap<String, ProcessHandle>,
    spawning: usize,
    max_workers: usize,
    pending: PendingQueue,
    routing: HashSet<String>,
}

impl Pool {
    /// Empty pool capped at `max_workers`, queueing up to `max_pending`.
    #[must_use]
    pub fn new(max_workers: usize, max_pending: usize) -> Self {
        Self {
            handles: HashMap::with_capacity(max_workers),
            spawning: 0,
            max_workers,
            pending: PendingQueue::new(max_pending),
            routing: HashSet::new(),
        }
    }

    /// Live handles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether no handle is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Spawns reserved but not yet inserted.
    #[must_use]
    pub const fn spawning(&self) -> usize {
        self.spawning
    }

    /// Idle handles.
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.handles
            .values()
            .filter(|h| h.state == ProcessState::Idle)
            .count()
    }

    /// Busy handles.
    #[must_use]
    pub fn busy_count(&self) -> usize {
        self.handles
            .values()
            .filter(|h| h.state == ProcessState::Busy)
            .count()
    }

    /// Reserve a spawn slot if live plus in-flight spawns stay under
    /// `max_workers`.
    pub fn reserve_spawn(&mut self) -> bool {
        if self.handles.len() + self.spawning < self.max_workers {
            self.spawning += 1;
            true
        } else {
            false
        }
    }

    /// Reserve a spawn slot only while live plus in-flight spawns are below
    /// `target`.
    pub fn reserve_spawn_below(&mut self, target: usize) -> bool {
        self.handles.len() + self.spawning < target && self.reserve_spawn()
    }

    /// Give back a reservation whose spawn failed.
    pub fn release_spawn(&mut self) {
        self.spawning = self.spawning.saturating_sub(1);
    }

    /// Insert the handle produced by a reserved spawn.
    pub fn insert_spawned(&mut self, handle: ProcessHandle) {
        self.release_spawn();
        self.handles.insert(handle.id.clone(), handle);
    }

    /// Remove a handle from the live set.
    pub fn remove(&mut self, process_id: &str) -> Option<ProcessHandle> {
        self.handles.remove(process_id)
    }

    /// Read-only access to one handle.
    #[must_use]
    pub fn get(&self, process_id: &str) -> Option<&ProcessHandle> {
        self.handles.get(process_id)
    }

    /// Whether `execution_id` is running, waiting, or mid-route.
    #[must_use]
    pub fn is_routed(&self, execution_id: &str) -> bool {
        self.routing.contains(execution_id)
            || self.busy_with(execution_id).is_some()
            || self.pending.contains(execution_id)
    }

    /// Claim `execution_id` for a route in progress. Returns false if it is
    /// already routed or being routed by someone else.
    pub fn begin_routing(&mut self, execution_id: &str) -> bool {
        if self.is_routed(execution_id) {
            return false;
        }
        self.routing.insert(execution_id.to_owned())
    }

    /// Drop the claim taken by [`Pool::begin_routing`].
    pub fn end_routing(&mut self, execution_id: &str) {
        self.routing.remove(execution_id);
    }

    /// Handle running `execution_id`.
    #[must_use]
    pub fn busy_with(&self, execution_id: &str) -> Option<&str> {
        self.handles
            .values()
            .find(|h| {
                h.current_execution
                    .as_ref()
                    .is_some_and(|info| info.execution_id() == execution_id)
            })
            .map(|h| h.id.as_str())
    }

    /// Bind `info` to an idle handle, preferring the most recently idle one.
    /// Handles whose queue is closed are skipped; the health check reaps them.
    ///
    /// Returns the chosen handle id, or hands `info` back if none accepted it.
    pub fn assign_idle(&mut self, info: ExecutionInfo) -> Result<String, ExecutionInfo> {
        let mut idle: Vec<(&String, Instant)> = self
            .handles
            .iter()
            .filter(|(_, h)| h.state == ProcessState::Idle)
            .map(|(id, h)| (id, h.idle_since))
            .collect();
        idle.sort_by(|a, b| b.1.cmp(&a.1));
        let candidates: Vec<String> = idle.into_iter().map(|(id, _)| id.clone()).collect();

        for id in candidates {
            if let Some(handle) = self.handles.get_mut(&id) {
                match handle.assign(info.clone()) {
                    Ok(()) => return Ok(id),
                    Err(e) => tracing::debug!(process_id = %id, error = %e, "skipping idle handle"),
                }
            }
        }
        Err(info)
    }

    /// Bind `info` to a specific idle handle.
    ///
    /// # Errors
    ///
    /// `PoolError::Dispatch` if the handle is missing, busy, or unreachable.
    pub fn assign_to(&mut self, process_id: &str, info: ExecutionInfo) -> Result<(), PoolError> {
        self.handles
            .get_mut(process_id)
            .ok_or_else(|| PoolError::Dispatch(format!("process {process_id} is gone")))?
            .assign(info)
    }

    /// Settle `execution_id` on `process_id`. See [`ProcessHandle::complete`].
    pub fn complete(&mut self, process_id: &str, execution_id: &str) -> Option<ExecutionInfo> {
        self.handles.get_mut(process_id)?.complete(execution_id)
    }

    /// Every queued worker message, tagged with its handle id.
    pub fn drain_messages(&mut self) -> Vec<(String, WorkerMessage)> {
        let mut out = Vec::new();
        for (id, handle) in &mut self.handles {
            while let Some(message) = handle.try_recv() {
                out.push((id.clone(), message));
            }
        }
        out
    }

    /// Remove and return handles whose process has died.
    pub fn remove_dead(&mut self) -> Vec<ProcessHandle> {
        let dead: Vec<String> = self
            .handles
            .iter_mut()
            .filter_map(|(id, h)| (!h.is_alive()).then(|| id.clone()))
            .collect();
        dead.iter().filter_map(|id| self.handles.remove(id)).collect()
    }

    /// Remove and return busy handles whose execution exceeded its timeout.
    pub fn remove_timed_out(&mut self) -> Vec<ProcessHandle> {
        let expired: Vec<String> = self
            .handles
            .iter()
            .filter(|(_, h)| h.current_execution.as_ref().is_some_and(ExecutionInfo::is_timed_out))
            .map(|(id, _)| id.clone())
            .collect();
        expired.iter().filter_map(|id| self.handles.remove(id)).collect()
    }

    /// Remove the oldest-idle handles once idle workers outnumber
    /// `len - min_workers`, trimming the pool back to `min_workers`. Busy
    /// handles are never chosen, and nothing is removed while executions are
    /// waiting.
    pub fn remove_excess_idle(&mut self, min_workers: usize) -> Vec<ProcessHandle> {
        if !self.pending.is_empty() {
            return Vec::new();
        }
        let excess = self.handles.len().saturating_sub(min_workers);
        if self.idle_count() <= excess {
            return Vec::new();
        }
        let mut idle: Vec<(String, Instant)> = self
            .handles
            .iter()
            .filter(|(_, h)| h.state == ProcessState::Idle)
            .map(|(id, h)| (id.clone(), h.idle_since))
            .collect();
        idle.sort_by_key(|(_, since)| *since);
        idle.into_iter()
            .take(excess)
            .filter_map(|(id, _)| self.handles.remove(&id))
            .collect()
    }

    /// Remove an idle handle for recycling; busy or missing handles stay put.
    pub fn remove_if_idle(&mut self, process_id: &str) -> Option<ProcessHandle> {
        match self.handles.get(process_id) {
            Some(h) if h.state == ProcessState::Idle => self.handles.remove(process_id),
            _ => None,
        }
    }

    /// Park an execution until a handle frees up; returns its position.
    ///
    /// # Errors
    ///
    /// `PoolError::Backpressure` when the pending queue is full.
    pub fn enqueue_pending(&mut self, execution_id: &str, timeout: Duration) -> Result<usize, PoolError> {
        self.pending.enqueue(execution_id, timeout)
    }

    /// Executions waiting for a handle.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Dispatch waiting executions to idle handles, oldest first.
    pub fn dispatch_pending(&mut self) -> Vec<Dispatch> {
        let mut dispatched = Vec::new();
        while self.idle_count() > 0 {
            let Some(next) = self.pending.dequeue() else {
                break;
            };
            let info = ExecutionInfo::new(next.execution_id.clone(), next.timeout);
            match self.assign_idle(info) {
                Ok(process_id) => dispatched.push(Dispatch {
                    execution_id: next.execution_id,
                    process_id,
                }),
                Err(_) => {
                    self.pending.requeue_front(next);
                    break;
                }
            }
        }
        dispatched
    }

    /// Empty the pool: every handle and every waiting execution.
    pub fn drain_all(&mut self) -> (Vec<ProcessHandle>, Vec<PendingExecution>) {
        let handles = self.handles.drain().map(|(_, h)| h).collect();
        (handles, self.pending.drain())
    }

    /// Views of every handle, sorted by id.
    #[must_use]
    pub fn statuses(&self) -> Vec<ProcessStatus> {
        let mut out: Vec<ProcessStatus> = self.handles.values().map(ProcessHandle::status).collect();
        out.sort_by(|a, b| a.process_id.cmp(&b.process_id));
        out
    }
}
