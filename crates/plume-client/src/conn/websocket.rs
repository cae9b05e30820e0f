//! WebSocket framed connection using tokio-tungstenite.
//!
//! Op-codes map one-to-one onto WebSocket message types: binary data frames
//! plus the ping/pong/close control messages.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use plume_core::{Frame, FrameReader, FrameWriter, OpCode, PlumeError, PlumeResult};

use super::MAX_FRAME_SIZE;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Dial a WebSocket endpoint and return the unsplit stream, for a handshake
/// exchange before the connection is handed to the transport session.
pub async fn dial(url: &str) -> PlumeResult<WsStream> {
    let (ws, _response) = connect_async(url)
        .await
        .map_err(|e| PlumeError::Transport(format!("websocket connect error: {e}")))?;
    tracing::debug!(url = %url, "websocket connected");
    Ok(ws)
}

/// Split a WebSocket stream into framed reader/writer halves.
pub fn split(ws: WsStream) -> (WsFrameReader, WsFrameWriter) {
    let (sink, stream) = ws.split();
    (WsFrameReader { stream }, WsFrameWriter { sink })
}

/// Read half of a WebSocket framed connection.
pub struct WsFrameReader {
    stream: SplitStream<WsStream>,
}

/// Write half of a WebSocket framed connection.
pub struct WsFrameWriter {
    sink: SplitSink<WsStream, Message>,
}

#[async_trait]
impl FrameReader for WsFrameReader {
    async fn read_frame(&mut self) -> PlumeResult<Frame> {
        loop {
            let msg = self
                .stream
                .next()
                .await
                .ok_or_else(|| PlumeError::Transport("connection closed".into()))?
                .map_err(|e| PlumeError::Transport(format!("websocket read error: {e}")))?;

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
                _ => continue,
            };
            return Ok(frame);
        }
    }
}

#[async_trait]
impl FrameWriter for WsFrameWriter {
    async fn write_frame(&mut self, op: OpCode, payload: &[u8]) -> PlumeResult<()> {
        let msg = match op {
            OpCode::Binary => Message::Binary(payload.to_vec()),
            OpCode::Ping => Message::Ping(payload.to_vec()),
            OpCode::Pong => Message::Pong(payload.to_vec()),
            OpCode::Close => Message::Close(None),
        };
        self.sink
            .feed(msg)
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
        // SinkExt::close drives the websocket close handshake.
        let _ = self.sink.close().await;
        Ok(())
    }
}
