//! The loop that runs inside every worker.
//!
//! One job at a time: block on the inbound queue, read the job's context from
//! the store, run it, push exactly one result, repeat. Job failures of every
//! kind (missing context, returned errors, panics) become result records; the
//! loop itself only ends on a stop signal, a `Shutdown` command, or a closed
//! inbound pipe.

use std::any::Any;
use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncWrite, BufReader};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::metrics::UsageSample;
use super::runner::{JobContext, JobError, JobOutcome, JobRunner};
use super::startup::{install_requirements, DependencyInstaller, InstallOutcome};
use crate::config::WorkerConfig;
use crate::core::result::{error_types, ExecutionResult, ExecutionStatus, ResourceMetrics};
use crate::core::AppResult;
use crate::infra::store::{ContextStore, StoreExt, StoreKeys};
use crate::ipc::{
    decode_command, read_frame, write_frame, FrameRead, WorkerCommand, WorkerMessage,
};

/// Why [`WorkerLoop::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The inbound pipe closed.
    InboundClosed,
    /// A `Shutdown` command arrived.
    ShutdownCommand,
    /// The stop token fired while idle.
    Stopped,
    /// The stop token fired mid-job and the job outlived the graceful budget.
    Abandoned,
}

/// Worker-side job loop.
pub struct WorkerLoop {
    config: WorkerConfig,
    keys: StoreKeys,
    store: Arc<dyn ContextStore>,
    runner: Arc<dyn JobRunner>,
    installer: Option<Arc<dyn DependencyInstaller>>,
}

impl WorkerLoop {
    /// Build a loop for `config` over `store`, running jobs with `runner`.
    pub fn new(
        config: WorkerConfig,
        store: Arc<dyn ContextStore>,
        runner: Arc<dyn JobRunner>,
    ) -> Self {
        let keys = StoreKeys::new(config.key_prefix.clone());
        Self {
            config,
            keys,
            store,
            runner,
            installer: None,
        }
    }

    /// Install the cached requirements manifest with `installer` at startup.
    #[must_use]
    pub fn with_installer(mut self, installer: Arc<dyn DependencyInstaller>) -> Self {
        self.installer = Some(installer);
        self
    }

    /// Worker configuration.
    #[must_use]
    pub const fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Startup step. Never fails; see [`install_requirements`].
    pub async fn startup(&self) -> Option<InstallOutcome> {
        let installer = self.installer.as_ref()?;
        Some(
            install_requirements(
                self.store.as_ref(),
                &self.keys,
                &self.config,
                installer.as_ref(),
            )
            .await,
        )
    }

    /// Run startup, announce readiness, then serve jobs until stopped.
    ///
    /// # Errors
    ///
    /// Returns an error only when the outbound pipe fails, which means the
    /// supervisor is gone.
    pub async fn run<R, W>(
        &self,
        reader: R,
        mut writer: W,
        stop: CancellationToken,
    ) -> AppResult<LoopExit>
    where
        R: AsyncBufRead + Unpin + Send,
        W: AsyncWrite + Unpin + Send,
    {
        self.startup().await;

        write_frame(
            &mut writer,
            &WorkerMessage::Ready {
                process_id: self.config.process_id.clone(),
                pid: std::process::id(),
            },
        )
        .await?;
        tracing::info!(process_id = %self.config.process_id, "worker ready");

        let mut reader = reader;
        loop {
            let frame = tokio::select! {
                biased;
                () = stop.cancelled() => return Ok(LoopExit::Stopped),
                frame = read_frame(&mut reader) => frame?,
            };
            let line = match frame {
                FrameRead::Line(line) => line,
                FrameRead::Oversized(bytes) => {
                    tracing::warn!(bytes, "ignoring oversized command");
                    continue;
                }
                FrameRead::Closed => {
                    tracing::info!(process_id = %self.config.process_id, "inbound queue closed");
                    return Ok(LoopExit::InboundClosed);
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            let execution_id = match decode_command(&line) {
                Ok(WorkerCommand::Execute { execution_id }) => execution_id,
                Ok(WorkerCommand::Shutdown) => {
                    tracing::info!(process_id = %self.config.process_id, "shutdown requested");
                    return Ok(LoopExit::ShutdownCommand);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "ignoring unreadable command");
                    continue;
                }
            };

            let job = self.execute(&execution_id);
            tokio::pin!(job);
            let result = tokio::select! {
                result = &mut job => result,
                () = graceful_deadline(&stop, self.config.graceful_shutdown()) => {
                    tracing::warn!(
                        execution_id = %execution_id,
                        "job outlived graceful shutdown budget; abandoning"
                    );
                    return Ok(LoopExit::Abandoned);
                }
            };
            write_frame(&mut writer, &WorkerMessage::Result(result)).await?;
        }
    }

    /// Execute one job and build its result. Never fails.
    pub async fn execute(&self, execution_id: &str) -> ExecutionResult {
        let started = Instant::now();
        let before = UsageSample::now();
        let worker_id = self.config.worker_id.clone();

        let mut result = match self.read_context(execution_id) {
            Ok(Some(context)) => {
                let job = JobContext {
                    execution_id: execution_id.to_owned(),
                    worker_id: worker_id.clone(),
                    context,
                };
                match self.run_job(job).await {
                    Ok(outcome) => from_outcome(execution_id, &worker_id, outcome),
                    Err(error) => from_error(execution_id, &worker_id, error),
                }
            }
            Ok(None) => {
                tracing::warn!(execution_id, "execution context not found");
                ExecutionResult::context_not_found(execution_id, &worker_id)
            }
            Err(e) => {
                tracing::error!(execution_id, error = %e, "failed to read execution context");
                ExecutionResult::failure(
                    execution_id,
                    &worker_id,
                    ExecutionStatus::Failed,
                    e.to_string(),
                    error_types::STORE_UNAVAILABLE,
                )
            }
        };

        result.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        result.metrics = before.until(&UsageSample::now());
        tracing::info!(
            execution_id,
            status = ?result.status,
            elapsed_ms = result.duration_ms,
            "execution finished"
        );
        result
    }

    fn read_context(&self, execution_id: &str) -> Result<Option<Value>, crate::core::StoreError> {
        let key = self.keys.context(execution_id);
        let context = self.store.get_json::<Value>(&key)?;
        if context.is_some() {
            if let Err(e) = self.store.delete(&key) {
                tracing::debug!(execution_id, error = %e, "failed to delete consumed context");
            }
        }
        Ok(context)
    }

    async fn run_job(&self, job: JobContext) -> Result<JobOutcome, JobError> {
        let runner = Arc::clone(&self.runner);
        let mut task = JobTask(tokio::spawn(async move { runner.run(job).await }));
        match (&mut task.0).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => Err(JobError::new(
                error_types::PANIC,
                panic_message(&*e.into_panic()),
            )),
            Err(e) => Err(JobError::new("Cancelled", e.to_string())),
        }
    }
}

/// Aborts the job task if the loop is dropped mid-job.
struct JobTask(JoinHandle<Result<JobOutcome, JobError>>);

impl Drop for JobTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn graceful_deadline(stop: &CancellationToken, budget: std::time::Duration) {
    stop.cancelled().await;
    tokio::time::sleep(budget).await;
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "job panicked".to_owned())
}

fn from_outcome(execution_id: &str, worker_id: &str, outcome: JobOutcome) -> ExecutionResult {
    ExecutionResult {
        execution_id: execution_id.to_owned(),
        success: outcome.status.counts_as_success(),
        status: outcome.status,
        result: outcome.result,
        error: outcome.error,
        error_type: outcome.error_type,
        duration_ms: 0,
        logs: outcome.logs,
        variables: outcome.variables,
        integration_calls: outcome.integration_calls,
        roi: outcome.roi,
        metrics: ResourceMetrics::default(),
        cached: outcome.cached,
        cache_expires_at: outcome.cache_expires_at.filter(|_| outcome.cached),
        worker_id: worker_id.to_owned(),
    }
}

fn from_error(execution_id: &str, worker_id: &str, error: JobError) -> ExecutionResult {
    tracing::warn!(execution_id, error_type = %error.error_type, "job raised an error");
    let mut result = ExecutionResult::failure(
        execution_id,
        worker_id,
        ExecutionStatus::Failed,
        error.message,
        error.error_type,
    );
    result.logs = error.logs;
    result
}

/// Run a worker over the process's stdin/stdout, stopping on SIGTERM/SIGINT.
///
/// Intended as the body of a worker binary spawned by
/// [`CommandSpawner`](crate::process::CommandSpawner). Logs go to stderr.
///
/// # Errors
///
/// Fails if the worker configuration is missing from the environment or the
/// supervisor's end of stdout closes.
pub async fn run_stdio(
    store: Arc<dyn ContextStore>,
    runner: Arc<dyn JobRunner>,
    installer: Option<Arc<dyn DependencyInstaller>>,
) -> AppResult<LoopExit> {
    crate::util::telemetry::init_worker_tracing();
    let config = WorkerConfig::from_env().map_err(anyhow::Error::msg)?;
    let mut worker = WorkerLoop::new(config, store, runner);
    if let Some(installer) = installer {
        worker = worker.with_installer(installer);
    }
    let stop = stop_on_signal();
    let exit = worker
        .run(BufReader::new(tokio::io::stdin()), tokio::io::stdout(), stop)
        .await?;
    tracing::info!(?exit, "worker exiting");
    Ok(exit)
}

/// Token cancelled on SIGTERM or SIGINT.
#[must_use]
pub fn stop_on_signal() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        trigger.cancel();
    });
    token
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut term, mut int) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(term), Ok(int)) => (term, int),
        (Err(e), _) | (_, Err(e)) => {
            tracing::error!(error = %e, "failed to install signal handlers");
            return std::future::pending().await;
        }
    };
    tokio::select! {
        _ = term.recv() => tracing::info!("received SIGTERM"),
        _ = int.recv() => tracing::info!("received SIGINT"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install ctrl-c handler");
        std::future::pending::<()>().await;
    }
}
