//! IPC protocol messages for worker processes.
//!
//! Newline-delimited JSON over the worker's stdin (commands) and stdout
//! (messages). Each queue message stays small: job ids go in, result envelopes
//! come out, and the bulky execution context travels through the context store.
//!
//! Every inbound frame is parsed into a tagged enum and, for results,
//! validated before it reaches the supervisor. Frames that fail either step are
//! rejected here rather than passed along as opaque maps.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::core::result::ExecutionResult;

/// Upper bound for one frame. [`read_frame`] never buffers more than this,
/// and longer lines are skipped as corrupt.
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Command sent from the supervisor to a worker process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerCommand {
    /// Run the execution whose context is stored under this id.
    Execute {
        /// Execution identifier.
        execution_id: String,
    },
    /// Finish the current job (if any) and exit.
    Shutdown,
}

/// Message sent from a worker process to the supervisor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    /// Startup finished; the worker is blocking on its inbound queue.
    Ready {
        /// Process handle id assigned by the supervisor.
        process_id: String,
        /// OS process id (0 for in-process workers).
        pid: u32,
    },
    /// Terminal result of one execution.
    Result(ExecutionResult),
}

/// Frame-level protocol failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame exceeded [`MAX_FRAME_BYTES`].
    #[error("frame too large: {0} bytes")]
    Oversized(usize),
    /// Frame was not valid JSON for the expected message type.
    #[error("malformed frame: {0}")]
    Malformed(String),
    /// Frame parsed but violated the result schema.
    #[error("invalid result: {0}")]
    Invalid(String),
}

/// Encode a message as a single newline-terminated JSON frame.
///
/// # Errors
///
/// Returns `ProtocolError::Malformed` if the message cannot be serialized.
pub fn encode_frame<T: Serialize>(message: &T) -> Result<String, ProtocolError> {
    let mut line =
        serde_json::to_string(message).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
    if line.len() > MAX_FRAME_BYTES {
        return Err(ProtocolError::Oversized(line.len()));
    }
    line.push('\n');
    Ok(line)
}

/// Write one frame and flush.
///
/// # Errors
///
/// Returns an I/O error if encoding fails or the pipe is closed.
pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let line = encode_frame(message)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await
}

fn check_size(line: &str) -> Result<&str, ProtocolError> {
    if line.len() > MAX_FRAME_BYTES {
        return Err(ProtocolError::Oversized(line.len()));
    }
    Ok(line.trim_end_matches(['\r', '\n']))
}

/// Decode a command frame read by a worker.
///
/// # Errors
///
/// Returns an error for oversized, empty, or non-JSON frames.
pub fn decode_command(line: &str) -> Result<WorkerCommand, ProtocolError> {
    let line = check_size(line)?.trim();
    if line.is_empty() {
        return Err(ProtocolError::Malformed("empty frame".into()));
    }
    serde_json::from_str(line).map_err(|e| ProtocolError::Malformed(e.to_string()))
}

/// Decode and validate a message frame read by the supervisor.
///
/// # Errors
///
/// Returns an error for oversized, unparsable, or schema-violating frames.
pub fn decode_message(line: &str) -> Result<WorkerMessage, ProtocolError> {
    let line = check_size(line)?;
    let message: WorkerMessage =
        serde_json::from_str(line).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
    if let WorkerMessage::Result(ref result) = message {
        result.validate().map_err(ProtocolError::Invalid)?;
    }
    Ok(message)
}

/// One line pulled off a pipe by [`read_frame`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameRead {
    /// A complete line, terminator included.
    Line(String),
    /// A line longer than the limit; its bytes were skipped, not buffered.
    Oversized(usize),
    /// The writer closed the pipe.
    Closed,
}

/// Read one newline-terminated frame, buffering at most [`MAX_FRAME_BYTES`].
///
/// # Errors
///
/// Returns the underlying I/O error.
pub async fn read_frame<R>(reader: &mut R) -> std::io::Result<FrameRead>
where
    R: AsyncBufRead + Unpin,
{
    read_frame_limited(reader, MAX_FRAME_BYTES).await
}

async fn read_frame_limited<R>(reader: &mut R, limit: usize) -> std::io::Result<FrameRead>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let cap = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1);
    let n = (&mut *reader).take(cap).read_until(b'\n', &mut buf).await?;
    if n == 0 {
        return Ok(FrameRead::Closed);
    }
    if buf.last() == Some(&b'\n') || buf.len() <= limit {
        return Ok(FrameRead::Line(String::from_utf8_lossy(&buf).into_owned()));
    }

    let mut skipped = buf.len();
    loop {
        let (found, used) = {
            let available = reader.fill_buf().await?;
            if available.is_empty() {
                break;
            }
            available
                .iter()
                .position(|&b| b == b'\n')
                .map_or((false, available.len()), |i| (true, i + 1))
        };
        reader.consume(used);
        skipped += used;
        if found {
            break;
        }
    }
    Ok(FrameRead::Oversized(skipped))
}
