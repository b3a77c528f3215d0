//! In-process workers backed by tokio tasks.
//!
//! Each worker runs a [`WorkerLoop`] on the current runtime and talks to the
//! supervisor over in-memory pipes using the same framing as OS workers. There
//! is no fault isolation: a job that blocks a runtime thread or aborts the
//! process takes the supervisor with it. Meant for development and tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::BufReader;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{attach_pipes, ProcessSpawner, SpawnedProcess, SupervisableProcess};
use crate::config::WorkerConfig;
use crate::core::PoolError;
use crate::infra::store::ContextStore;
use crate::worker::{DependencyInstaller, JobRunner, WorkerLoop};

const PIPE_CAPACITY: usize = 64 * 1024;

/// Spawns workers as tasks on the current tokio runtime.
#[derive(Clone)]
pub struct InProcessSpawner {
    template: WorkerConfig,
    store: Arc<dyn ContextStore>,
    runner: Arc<dyn JobRunner>,
    installer: Option<Arc<dyn DependencyInstaller>>,
}

impl InProcessSpawner {
    /// Workers share `store` and run jobs with `runner`; `template` supplies
    /// everything but the process id.
    pub fn new(
        template: WorkerConfig,
        store: Arc<dyn ContextStore>,
        runner: Arc<dyn JobRunner>,
    ) -> Self {
        Self {
            template,
            store,
            runner,
            installer: None,
        }
    }

    /// Run the startup install step in every worker.
    #[must_use]
    pub fn with_installer(mut self, installer: Arc<dyn DependencyInstaller>) -> Self {
        self.installer = Some(installer);
        self
    }
}

impl ProcessSpawner for InProcessSpawner {
    fn spawn(&self, process_id: &str) -> Result<SpawnedProcess, PoolError> {
        let config = WorkerConfig {
            process_id: process_id.to_owned(),
            ..self.template.clone()
        };
        let mut worker = WorkerLoop::new(config, Arc::clone(&self.store), Arc::clone(&self.runner));
        if let Some(installer) = &self.installer {
            worker = worker.with_installer(Arc::clone(installer));
        }

        let (command_writer, command_reader) = tokio::io::duplex(PIPE_CAPACITY);
        let (message_writer, message_reader) = tokio::io::duplex(PIPE_CAPACITY);
        let stop = CancellationToken::new();

        let token = stop.clone();
        let id = process_id.to_owned();
        let task = tokio::spawn(async move {
            match worker
                .run(BufReader::new(command_reader), message_writer, token)
                .await
            {
                Ok(exit) => tracing::debug!(process_id = %id, ?exit, "in-process worker exited"),
                Err(e) => tracing::warn!(process_id = %id, error = %e, "in-process worker failed"),
            }
        });

        let (inbound, outbound) = attach_pipes(process_id, command_writer, message_reader);
        Ok(SpawnedProcess {
            process: Box::new(TaskProcess {
                task,
                stop,
                exit: None,
            }),
            inbound,
            outbound,
        })
    }
}

/// A worker running as a tokio task.
#[derive(Debug)]
pub struct TaskProcess {
    task: JoinHandle<()>,
    stop: CancellationToken,
    exit: Option<String>,
}

#[async_trait]
impl SupervisableProcess for TaskProcess {
    fn pid(&self) -> u32 {
        0
    }

    fn is_alive(&mut self) -> bool {
        if self.task.is_finished() {
            if self.exit.is_none() {
                self.exit = Some("worker task finished".into());
            }
            return false;
        }
        true
    }

    fn exit_detail(&self) -> Option<String> {
        self.exit.clone()
    }

    async fn terminate(&mut self, grace: Duration) {
        if !self.is_alive() {
            return;
        }
        self.stop.cancel();
        if tokio::time::timeout(grace, &mut self.task).await.is_err() {
            tracing::warn!("in-process worker ignored stop request; aborting");
            self.kill();
        }
    }

    fn kill(&mut self) {
        self.task.abort();
        self.exit = Some("killed".into());
    }
}
