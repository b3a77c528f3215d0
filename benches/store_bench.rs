//! Benchmarks for the process pool.
//!
//! Benchmarks cover:
//! - Context store put/get (memory and file backends)
//! - Pending queue enqueue/dequeue
//! - IPC frame encode/decode
//! - End-to-end routing through in-process workers

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use prometheus_process_pool::config::{PoolConfig, WorkerConfig};
use prometheus_process_pool::core::{
    AppResult, ExecutionResult, ExecutionStatus, PendingQueue, PoolSupervisor, ResultCallback,
};
use prometheus_process_pool::infra::{ContextStore, FileStore, MemoryStore, StoreKeys};
use prometheus_process_pool::ipc::{decode_message, encode_frame, WorkerMessage};
use prometheus_process_pool::process::InProcessSpawner;
use prometheus_process_pool::worker::{JobContext, JobError, JobOutcome, JobRunner};
use tokio::runtime::Runtime;

// ============================================================================
// Runner and Callback
// ============================================================================

struct EchoRunner;

#[async_trait]
impl JobRunner for EchoRunner {
    async fn run(&self, job: JobContext) -> Result<JobOutcome, JobError> {
        Ok(JobOutcome::success(job.context))
    }
}

#[derive(Clone, Default)]
struct CountingCallback(Arc<AtomicUsize>);

#[async_trait]
impl ResultCallback for CountingCallback {
    async fn on_result(&self, _result: ExecutionResult) -> AppResult<()> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn context_bytes() -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "workflow": "bench",
        "inputs": { "rows": (0..32).collect::<Vec<u32>>() },
    }))
    .unwrap_or_default()
}

// ============================================================================
// Store
// ============================================================================

fn bench_store_put_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_put_get");
    let payload = context_bytes();
    let keys = StoreKeys::default();

    let memory = MemoryStore::new();
    group.throughput(Throughput::Bytes(payload.len() as u64));
    group.bench_function("memory", |b| {
        let mut n = 0_u64;
        b.iter(|| {
            n += 1;
            let key = keys.context(&n.to_string());
            memory
                .put(&key, &payload, Some(Duration::from_secs(60)))
                .unwrap();
            black_box(memory.get(&key).unwrap());
            memory.delete(&key).unwrap();
        });
    });

    let dir = tempfile::tempdir().unwrap();
    let file = FileStore::open(dir.path()).unwrap();
    group.bench_function("file", |b| {
        let mut n = 0_u64;
        b.iter(|| {
            n += 1;
            let key = keys.context(&n.to_string());
            file.put(&key, &payload, Some(Duration::from_secs(60)))
                .unwrap();
            black_box(file.get(&key).unwrap());
            file.delete(&key).unwrap();
        });
    });
    group.finish();
}

// ============================================================================
// Pending queue
// ============================================================================

fn bench_pending_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("pending_queue");
    for size in [100_u64, 1_000, 10_000] {
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let ids: Vec<String> = (0..size).map(|i| format!("exec-{i}")).collect();
            b.iter(|| {
                let mut queue = PendingQueue::new(ids.len());
                for id in &ids {
                    queue.enqueue(id, Duration::from_secs(30)).unwrap();
                }
                while let Some(item) = queue.dequeue() {
                    black_box(item);
                }
            });
        });
    }
    group.finish();
}

// ============================================================================
// IPC framing
// ============================================================================

fn bench_frames(c: &mut Criterion) {
    let mut result =
        ExecutionResult::failure("exec-1", "fleet", ExecutionStatus::Success, "", "");
    result.error = None;
    result.error_type = None;
    result.result = Some(serde_json::json!({ "rows": (0..64).collect::<Vec<u32>>() }));
    let message = WorkerMessage::Result(result);
    let frame = encode_frame(&message).unwrap();

    c.bench_function("frame_encode", |b| {
        b.iter(|| black_box(encode_frame(black_box(&message)).unwrap()));
    });
    c.bench_function("frame_decode", |b| {
        b.iter(|| black_box(decode_message(black_box(&frame)).unwrap()));
    });
}

// ============================================================================
// End-to-end routing
// ============================================================================

fn bench_route_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("route_round_trip");
    group.sample_size(20);
    for jobs in [10_usize, 100] {
        group.throughput(Throughput::Elements(jobs as u64));
        group.bench_with_input(BenchmarkId::from_parameter(jobs), &jobs, |b, &jobs| {
            b.to_async(Runtime::new().unwrap()).iter(|| async move {
                let store: Arc<dyn ContextStore> = Arc::new(MemoryStore::new());
                let config = PoolConfig::new()
                    .with_min_workers(4)
                    .with_max_workers(4)
                    .with_max_pending_executions(jobs);
                let template = WorkerConfig::new(config.worker_id.clone(), "bench");
                let spawner =
                    InProcessSpawner::new(template, Arc::clone(&store), Arc::new(EchoRunner));
                let callback = CountingCallback::default();
                let supervisor = PoolSupervisor::builder(config)
                    .store(store)
                    .spawner(Arc::new(spawner))
                    .callback(Arc::new(callback.clone()))
                    .background_loops(false)
                    .build()
                    .unwrap();
                supervisor.start().await.unwrap();

                for i in 0..jobs {
                    supervisor
                        .route_execution(&format!("exec-{i}"), &serde_json::json!({ "i": i }), None)
                        .unwrap();
                }
                while callback.0.load(Ordering::SeqCst) < jobs {
                    supervisor.drain_results().await;
                    tokio::task::yield_now().await;
                }
                supervisor.shutdown().await;
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_store_put_get,
    bench_pending_queue,
    bench_frames,
    bench_route_round_trip
);
criterion_main!(benches);
