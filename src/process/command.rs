//! OS child-process workers.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};

use super::{attach_pipes, ProcessSpawner, SpawnedProcess, SupervisableProcess};
use crate::config::worker::{
    ENV_GRACEFUL_SHUTDOWN_SECONDS, ENV_KEY_PREFIX, ENV_PROCESS_ID, ENV_WORKER_ID,
};
use crate::config::PoolConfig;
use crate::core::PoolError;

/// Environment variable naming the worker executable.
pub const ENV_WORKER_BIN: &str = "POOL_WORKER_BIN";

/// Spawns each worker as a child process speaking the stdio protocol.
///
/// The child's stdin carries commands, its stdout carries messages, and its
/// stderr is inherited so worker logs land next to the supervisor's.
#[derive(Debug, Clone)]
pub struct CommandSpawner {
    program: PathBuf,
    args: Vec<OsString>,
    envs: Vec<(OsString, OsString)>,
    worker_id: String,
    key_prefix: String,
    graceful_shutdown_seconds: u64,
}

impl CommandSpawner {
    /// Spawn `program` for every worker, exporting the pool identity.
    pub fn new(program: impl Into<PathBuf>, config: &PoolConfig) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            worker_id: config.worker_id.clone(),
            key_prefix: config.key_prefix.clone(),
            graceful_shutdown_seconds: config.graceful_shutdown_seconds,
        }
    }

    /// Use the executable named by `POOL_WORKER_BIN`, falling back to a
    /// `worker` binary next to the current executable.
    ///
    /// # Errors
    ///
    /// `PoolError::Spawn` if no candidate exists.
    pub fn from_env(config: &PoolConfig) -> Result<Self, PoolError> {
        if let Ok(path) = std::env::var(ENV_WORKER_BIN) {
            return Ok(Self::new(path, config));
        }
        let exe = std::env::current_exe().map_err(|e| PoolError::Spawn(e.to_string()))?;
        let sibling = exe.with_file_name(if cfg!(windows) { "worker.exe" } else { "worker" });
        if sibling.exists() {
            Ok(Self::new(sibling, config))
        } else {
            Err(PoolError::Spawn(format!(
                "worker binary not found; set {ENV_WORKER_BIN} or install {}",
                sibling.display()
            )))
        }
    }

    /// Append an argument passed to every worker.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Set an extra environment variable on every worker.
    #[must_use]
    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }
}

impl ProcessSpawner for CommandSpawner {
    fn spawn(&self, process_id: &str) -> Result<SpawnedProcess, PoolError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k, v)))
            .env(ENV_WORKER_ID, &self.worker_id)
            .env(ENV_PROCESS_ID, process_id)
            .env(ENV_KEY_PREFIX, &self.key_prefix)
            .env(
                ENV_GRACEFUL_SHUTDOWN_SECONDS,
                self.graceful_shutdown_seconds.to_string(),
            )
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| {
            PoolError::Spawn(format!("{}: {e}", self.program.display()))
        })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| PoolError::Spawn("worker stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PoolError::Spawn("worker stdout unavailable".into()))?;

        let pid = child.id().unwrap_or(0);
        tracing::debug!(process_id, pid, program = %self.program.display(), "spawned worker process");
        let (inbound, outbound) = attach_pipes(process_id, stdin, stdout);

        Ok(SpawnedProcess {
            process: Box::new(ChildProcess {
                child,
                pid,
                exit: None,
            }),
            inbound,
            outbound,
        })
    }
}

/// A worker running as an OS child process.
#[derive(Debug)]
pub struct ChildProcess {
    child: Child,
    pid: u32,
    exit: Option<String>,
}

impl ChildProcess {
    #[cfg(unix)]
    #[allow(unsafe_code)]
    fn request_stop(&mut self) {
        let Ok(pid) = libc::pid_t::try_from(self.pid) else {
            return;
        };
        // SAFETY: plain signal delivery to our own child.
        let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
        if rc != 0 {
            tracing::debug!(pid = self.pid, "SIGTERM delivery failed");
        }
    }

    #[cfg(not(unix))]
    fn request_stop(&mut self) {
        let _ = self.child.start_kill();
    }
}

#[async_trait]
impl SupervisableProcess for ChildProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn is_alive(&mut self) -> bool {
        if self.exit.is_some() {
            return false;
        }
        match self.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                self.exit = Some(status.to_string());
                false
            }
            Err(e) => {
                self.exit = Some(format!("wait failed: {e}"));
                false
            }
        }
    }

    fn exit_detail(&self) -> Option<String> {
        self.exit.clone()
    }

    async fn terminate(&mut self, grace: Duration) {
        if !self.is_alive() {
            return;
        }
        self.request_stop();
        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => self.exit = Some(status.to_string()),
            Ok(Err(e)) => self.exit = Some(format!("wait failed: {e}")),
            Err(_) => {
                tracing::warn!(
                    pid = self.pid,
                    grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX),
                    "worker ignored stop request; killing"
                );
                if let Err(e) = self.child.kill().await {
                    tracing::warn!(pid = self.pid, error = %e, "failed to kill worker");
                }
                self.exit = Some("killed after graceful shutdown budget".into());
            }
        }
    }

    fn kill(&mut self) {
        if let Err(e) = self.child.start_kill() {
            tracing::debug!(pid = self.pid, error = %e, "kill on exited worker");
        }
        if self.exit.is_none() {
            self.exit = Some("killed".into());
        }
    }
}
