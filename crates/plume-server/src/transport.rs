//! Server-side WebSocket framed connection.
//!
//! An accepted stream starts life unsplit as a [`WsConn`] so the acceptor
//! can run its admission exchange on it, then splits into framed halves for
//! the connection's read loop and writer task.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use plume_core::{Frame, FrameReader, FrameWriter, OpCode, PlumeError, PlumeResult};

/// Largest data frame the gateway will accept.
pub(crate) const MAX_FRAME_SIZE: usize = 1 << 20;

type ServerWs = WebSocketStream<TcpStream>;

/// An accepted, unsplit WebSocket connection.
pub struct WsConn {
    ws: ServerWs,
}

impl WsConn {
    pub fn new(ws: ServerWs) -> Self {
        Self { ws }
    }

    /// Split into framed reader/writer halves once admission is done.
    pub fn split(self) -> (WsConnReader, WsConnWriter) {
        let (sink, stream) = self.ws.split();
        (WsConnReader { stream }, WsConnWriter { sink })
    }
}

fn map_message(msg: Message) -> PlumeResult<Option<Frame>> {
    let frame = match msg {
        Message::Binary(data) => {
            if data.len() > MAX_FRAME_SIZE {
                return Err(PlumeError::Codec(format!(
                    "frame too large: {} bytes",
                    data.len()
                )));
            }
            Frame::new(OpCode::Binary, data)
        }
        Message::Ping(payload) => Frame::new(OpCode::Ping, payload),
        Message::Pong(payload) => Frame::new(OpCode::Pong, payload),
        Message::Close(_) => Frame::new(OpCode::Close, Vec::new()),
        // Text and raw frames are not part of the protocol.
        _ => return Ok(None),
    };
    Ok(Some(frame))
}

fn to_message(op: OpCode, payload: &[u8]) -> Message {
    match op {
        OpCode::Binary => Message::Binary(payload.to_vec()),
        OpCode::Ping => Message::Ping(payload.to_vec()),
        OpCode::Pong => Message::Pong(payload.to_vec()),
        OpCode::Close => Message::Close(None),
    }
}

#[async_trait]
impl FrameReader for WsConn {
    async fn read_frame(&mut self) -> PlumeResult<Frame> {
        loop {
            let msg = self
                .ws
                .next()
                .await
                .ok_or_else(|| PlumeError::Transport("connection closed".into()))?
                .map_err(|e| PlumeError::Transport(format!("websocket read error: {e}")))?;
            if let Some(frame) = map_message(msg)? {
                return Ok(frame);
            }
        }
    }
}

#[async_trait]
impl FrameWriter for WsConn {
    async fn write_frame(&mut self, op: OpCode, payload: &[u8]) -> PlumeResult<()> {
        self.ws
            .feed(to_message(op, payload))
            .await
            .map_err(|e| PlumeError::Transport(format!("websocket write error: {e}")))
    }

    async fn flush(&mut self) -> PlumeResult<()> {
        self.ws
            .flush()
            .await
            .map_err(|e| PlumeError::Transport(format!("websocket flush error: {e}")))
    }

    async fn close(&mut self) -> PlumeResult<()> {
        let _ = self.ws.close(None).await;
        Ok(())
    }
}

/// Read half of an admitted connection.
pub struct WsConnReader {
    stream: SplitStream<ServerWs>,
}

/// Write half of an admitted connection.
pub struct WsConnWriter {
    sink: SplitSink<ServerWs, Message>,
}

#[async_trait]
impl FrameReader for WsConnReader {
    async fn read_frame(&mut self) -> PlumeResult<Frame> {
        loop {
            let msg = self
                .stream
                .next()
                .await
                .ok_or_else(|| PlumeError::Transport("connection closed".into()))?
                .map_err(|e| PlumeError::Transport(format!("websocket read error: {e}")))?;
            if let Some(frame) = map_message(msg)? {
                return Ok(frame);
            }
        }
    }
}

#[async_trait]
impl FrameWriter for WsConnWriter {
    async fn write_frame(&mut self, op: OpCode, payload: &[u8]) -> PlumeResult<()> {
        self.sink
            .feed(to_message(op, payload))
            .await
            .map_err(|e| PlumeError::Transport(format!("websocket write error: {e}")))
    }

    async fn flush(&mut self) -> PlumeResult<()> {
        self.sink
            .flush()
            .await
            .map_err(|e| PlumeError::Transport(format!("websocket flush error: {e}")))
    }

    async fn close(&mut self) -> PlumeResult<()> {
        let _ = self.sink.close().await;
        Ok(())
    }
}
