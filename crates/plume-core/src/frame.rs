//! Framed-connection capability traits.
//!
//! The transport session and the server listener depend only on these
//! traits; WebSocket and raw-TCP framing are concrete variants provided by
//! the client and server crates.

use async_trait::async_trait;

use crate::error::{PlumeError, PlumeResult};

/// Frame op-codes, aligned with the WebSocket control codes so the WS
/// variant maps one-to-one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    Binary = 0x2,
    Close = 0x8,
    Ping = 0x9,
    Pong = 0xA,
}

impl From<OpCode> for u8 {
    fn from(op: OpCode) -> u8 {
        op as u8
    }
}

impl TryFrom<u8> for OpCode {
    type Error = PlumeError;
    fn try_from(v: u8) -> PlumeResult<Self> {
        match v {
            0x2 => Ok(Self::Binary),
            0x8 => Ok(Self::Close),
            0x9 => Ok(Self::Ping),
            0xA => Ok(Self::Pong),
            _ => Err(PlumeError::Codec(format!("unknown op code: {v:#x}"))),
        }
    }
}

/// One transport frame: an op-code and its payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub op: OpCode,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(op: OpCode, payload: Vec<u8>) -> Self {
        Self { op, payload }
    }
}

/// Read half of a framed connection.
#[async_trait]
pub trait FrameReader: Send {
    /// Read the next frame. Blocks the calling task until a frame arrives,
    /// the peer closes, or the underlying I/O fails.
    async fn read_frame(&mut self) -> PlumeResult<Frame>;
}

/// Write half of a framed connection.
#[async_trait]
pub trait FrameWriter: Send {
    async fn write_frame(&mut self, op: OpCode, payload: &[u8]) -> PlumeResult<()>;

    /// Flush any buffered frames to the wire.
    async fn flush(&mut self) -> PlumeResult<()>;

    /// Close the underlying connection.
    async fn close(&mut self) -> PlumeResult<()>;
}

/// A whole (unsplit) framed connection, as handed to an acceptor before the
/// connection is admitted.
pub trait Conn: FrameReader + FrameWriter {}

impl<T: FrameReader + FrameWriter> Conn for T {}
