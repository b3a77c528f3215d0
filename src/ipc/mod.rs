//! Supervisor <-> worker message protocol.

pub mod protocol;

pub use protocol::{
    decode_command, decode_message, encode_frame, read_frame, write_frame, FrameRead,
    ProtocolError, WorkerCommand, WorkerMessage, MAX_FRAME_BYTES,
};
