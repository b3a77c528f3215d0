//! Supervisable worker processes.
//!
//! The supervisor only needs a handful of capabilities from a worker: its pid,
//! a liveness probe that never talks to the worker itself, graceful and forced
//! termination, and a pair of queues. [`ProcessSpawner`] produces all of that
//! for one process id, so pool logic stays the same whether workers are OS
//! children ([`CommandSpawner`]) or tokio tasks ([`InProcessSpawner`]).

pub mod command;
pub mod local;

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::sync::mpsc;

use crate::core::PoolError;
use crate::ipc::{decode_message, read_frame, write_frame, FrameRead, WorkerCommand, WorkerMessage};

pub use command::{ChildProcess, CommandSpawner};
pub use local::{InProcessSpawner, TaskProcess};

/// OS-level handle the supervisor keeps for one worker.
#[async_trait]
pub trait SupervisableProcess: Send {
    /// OS process id; in-process workers report 0.
    fn pid(&self) -> u32;

    /// Non-blocking liveness probe.
    fn is_alive(&mut self) -> bool;

    /// How the process ended, once it has.
    fn exit_detail(&self) -> Option<String>;

    /// Ask the process to stop and wait up to `grace`, then force it.
    async fn terminate(&mut self, grace: Duration);

    /// Stop the process immediately.
    fn kill(&mut self);
}

/// A freshly spawned worker and both ends of its queues.
pub struct SpawnedProcess {
    /// OS handle.
    pub process: Box<dyn SupervisableProcess>,
    /// Commands toward the worker.
    pub inbound: mpsc::UnboundedSender<WorkerCommand>,
    /// Validated messages from the worker.
    pub outbound: mpsc::UnboundedReceiver<WorkerMessage>,
}

/// Capability to start worker processes.
pub trait ProcessSpawner: Send + Sync {
    /// Start a worker identified by `process_id`.
    ///
    /// # Errors
    ///
    /// `PoolError::Spawn` if the worker cannot be started.
    fn spawn(&self, process_id: &str) -> Result<SpawnedProcess, PoolError>;
}

/// Bridge a worker's byte pipes to typed queues.
///
/// Commands are framed onto `writer`; every line read from `reader` is decoded
/// and validated, and lines that fail are logged and dropped.
pub(crate) fn attach_pipes<W, R>(
    process_id: &str,
    mut writer: W,
    reader: R,
) -> (
    mpsc::UnboundedSender<WorkerCommand>,
    mpsc::UnboundedReceiver<WorkerMessage>,
)
where
    W: AsyncWrite + Unpin + Send + 'static,
    R: AsyncRead + Unpin + Send + 'static,
{
    let (command_tx, mut command_rx) = mpsc::unbounded_channel::<WorkerCommand>();
    let (message_tx, message_rx) = mpsc::unbounded_channel::<WorkerMessage>();

    let id = process_id.to_owned();
    tokio::spawn(async move {
        while let Some(command) = command_rx.recv().await {
            if let Err(e) = write_frame(&mut writer, &command).await {
                tracing::debug!(process_id = %id, error = %e, "worker inbound pipe closed");
                break;
            }
        }
    });

    let id = process_id.to_owned();
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        loop {
            match read_frame(&mut reader).await {
                Ok(FrameRead::Line(line)) if line.trim().is_empty() => {}
                Ok(FrameRead::Line(line)) => match decode_message(&line) {
                    Ok(message) => {
                        if message_tx.send(message).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(process_id = %id, error = %e, "discarding worker frame");
                    }
                },
                Ok(FrameRead::Oversized(bytes)) => {
                    tracing::warn!(process_id = %id, bytes, "discarding oversized worker frame");
                }
                Ok(FrameRead::Closed) => break,
                Err(e) => {
                    tracing::debug!(process_id = %id, error = %e, "worker outbound pipe failed");
                    break;
                }
            }
        }
    });

    (command_tx, message_rx)
}
