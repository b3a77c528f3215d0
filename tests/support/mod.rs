//! Shared fixtures for supervisor integration tests.
//!
//! `MockSpawner` hands out fake workers whose liveness, termination, and
//! result delivery are driven by the test instead of a real process.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use prometheus_process_pool::config::PoolConfig;
use prometheus_process_pool::core::{
    AppResult, ExecutionResult, ExecutionStatus, InMemoryAuditSink, PoolError, PoolSupervisor,
    ResultCallback,
};
use prometheus_process_pool::infra::MemoryStore;
use prometheus_process_pool::ipc::{WorkerCommand, WorkerMessage};
use prometheus_process_pool::process::{ProcessSpawner, SpawnedProcess, SupervisableProcess};

// ============================================================================
// MOCK WORKERS
// ============================================================================

/// Test-side controls for one fake worker.
#[derive(Clone)]
pub struct MockWorker {
    pub process_id: String,
    alive: Arc<AtomicBool>,
    killed: Arc<AtomicBool>,
    terminated: Arc<AtomicBool>,
    exit_detail: Arc<Mutex<Option<String>>>,
    inbound: Arc<Mutex<mpsc::UnboundedReceiver<WorkerCommand>>>,
    received: Arc<Mutex<Vec<WorkerCommand>>>,
    outbound: mpsc::UnboundedSender<WorkerMessage>,
}

impl MockWorker {
    /// Every command pushed to this worker so far.
    pub fn commands(&self) -> Vec<WorkerCommand> {
        let mut received = self.received.lock();
        let mut inbound = self.inbound.lock();
        while let Ok(command) = inbound.try_recv() {
            received.push(command);
        }
        received.clone()
    }

    /// Execution ids pushed to this worker, in order.
    pub fn executions(&self) -> Vec<String> {
        self.commands()
            .into_iter()
            .filter_map(|c| match c {
                WorkerCommand::Execute { execution_id } => Some(execution_id),
                WorkerCommand::Shutdown => None,
            })
            .collect()
    }

    /// Simulate the process dying on its own.
    pub fn crash(&self, detail: &str) {
        *self.exit_detail.lock() = Some(detail.to_owned());
        self.alive.store(false, Ordering::SeqCst);
    }

    /// Queue a successful result as if the worker finished `execution_id`.
    pub fn succeed(&self, execution_id: &str) {
        let mut result = ExecutionResult::failure(
            execution_id,
            "fleet-test",
            ExecutionStatus::Success,
            "",
            "",
        );
        result.error = None;
        result.error_type = None;
        result.result = Some(serde_json::json!({ "ok": true }));
        self.send(result);
    }

    /// Queue an arbitrary result.
    pub fn send(&self, result: ExecutionResult) {
        let _ = self.outbound.send(WorkerMessage::Result(result));
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub fn was_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }

    pub fn was_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }
}

struct MockProcess {
    slow_terminate: Arc<AtomicBool>,
    alive: Arc<AtomicBool>,
    killed: Arc<AtomicBool>,
    terminated: Arc<AtomicBool>,
    exit_detail: Arc<Mutex<Option<String>>>,
}

#[async_trait]
impl SupervisableProcess for MockProcess {
    fn pid(&self) -> u32 {
        4242
    }

    fn is_alive(&mut self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn exit_detail(&self) -> Option<String> {
        self.exit_detail.lock().clone()
    }

    async fn terminate(&mut self, grace: Duration) {
        if self.slow_terminate.load(Ordering::SeqCst) {
            tokio::time::sleep(grace).await;
        }
        self.terminated.store(true, Ordering::SeqCst);
        self.alive.store(false, Ordering::SeqCst);
    }

    fn kill(&mut self) {
        self.killed.store(true, Ordering::SeqCst);
        self.alive.store(false, Ordering::SeqCst);
    }
}

/// Spawner producing [`MockWorker`]s; can be told to fail.
#[derive(Clone, Default)]
pub struct MockSpawner {
    workers: Arc<Mutex<Vec<MockWorker>>>,
    fail: Arc<AtomicBool>,
    slow_terminate: Arc<AtomicBool>,
    spawns: Arc<AtomicUsize>,
}

impl MockSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total successful spawns.
    pub fn spawn_count(&self) -> usize {
        self.spawns.load(Ordering::SeqCst)
    }

    /// Every worker ever spawned, in spawn order.
    pub fn workers(&self) -> Vec<MockWorker> {
        self.workers.lock().clone()
    }

    /// Worker with the given process id.
    pub fn worker(&self, process_id: &str) -> MockWorker {
        self.workers
            .lock()
            .iter()
            .find(|w| w.process_id == process_id)
            .cloned()
            .unwrap_or_else(|| panic!("no mock worker {process_id}"))
    }

    /// Make subsequent spawns fail.
    pub fn fail_spawns(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Make every worker ignore SIGTERM until its grace period runs out.
    pub fn slow_terminations(&self, slow: bool) {
        self.slow_terminate.store(slow, Ordering::SeqCst);
    }
}

impl ProcessSpawner for MockSpawner {
    fn spawn(&self, process_id: &str) -> Result<SpawnedProcess, PoolError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PoolError::Spawn("mock spawn failure".into()));
        }
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let alive = Arc::new(AtomicBool::new(true));
        let killed = Arc::new(AtomicBool::new(false));
        let terminated = Arc::new(AtomicBool::new(false));
        let exit_detail = Arc::new(Mutex::new(None));

        self.workers.lock().push(MockWorker {
            process_id: process_id.to_owned(),
            alive: Arc::clone(&alive),
            killed: Arc::clone(&killed),
            terminated: Arc::clone(&terminated),
            exit_detail: Arc::clone(&exit_detail),
            inbound: Arc::new(Mutex::new(inbound_rx)),
            received: Arc::new(Mutex::new(Vec::new())),
            outbound: outbound_tx,
        });
        self.spawns.fetch_add(1, Ordering::SeqCst);

        Ok(SpawnedProcess {
            process: Box::new(MockProcess {
                slow_terminate: Arc::clone(&self.slow_terminate),
                alive,
                killed,
                terminated,
                exit_detail,
            }),
            inbound: inbound_tx,
            outbound: outbound_rx,
        })
    }
}

// ============================================================================
// CALLBACKS
// ============================================================================

/// Callback that records every result it receives.
#[derive(Clone, Default)]
pub struct RecordingCallback {
    results: Arc<Mutex<Vec<ExecutionResult>>>,
}

impl RecordingCallback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn results(&self) -> Vec<ExecutionResult> {
        self.results.lock().clone()
    }

    pub fn for_execution(&self, execution_id: &str) -> Vec<ExecutionResult> {
        self.results
            .lock()
            .iter()
            .filter(|r| r.execution_id == execution_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ResultCallback for RecordingCallback {
    async fn on_result(&self, result: ExecutionResult) -> AppResult<()> {
        self.results.lock().push(result);
        Ok(())
    }
}

// ============================================================================
// HARNESS
// ============================================================================

/// A supervisor wired to mocks, with loops disabled so tests drive ticks.
pub struct Harness {
    pub supervisor: PoolSupervisor,
    pub spawner: MockSpawner,
    pub callback: RecordingCallback,
    pub audit: Arc<InMemoryAuditSink>,
    pub store: Arc<MemoryStore>,
}

pub fn test_config(min_workers: usize, max_workers: usize) -> PoolConfig {
    PoolConfig::new()
        .with_worker_id("fleet-test")
        .with_min_workers(min_workers)
        .with_max_workers(max_workers)
}

pub fn harness(config: PoolConfig) -> Harness {
    let spawner = MockSpawner::new();
    let callback = RecordingCallback::new();
    let audit = Arc::new(InMemoryAuditSink::new(1_000));
    let store = Arc::new(MemoryStore::new());
    let supervisor = PoolSupervisor::builder(config)
        .store(store.clone())
        .spawner(Arc::new(spawner.clone()))
        .callback(Arc::new(callback.clone()))
        .audit(audit.clone())
        .background_loops(false)
        .build()
        .expect("valid test config");
    Harness {
        supervisor,
        spawner,
        callback,
        audit,
        store,
    }
}

/// Process id of the handle running `execution_id`.
pub fn busy_process(supervisor: &PoolSupervisor, execution_id: &str) -> Option<String> {
    supervisor
        .get_status()
        .processes
        .into_iter()
        .find(|p| {
            p.current_execution
                .as_ref()
                .is_some_and(|e| e.execution_id == execution_id)
        })
        .map(|p| p.process_id)
}
