//! Raw-TCP framed connection.
//!
//! Frame format: `[1-byte op][4-byte big-endian length][payload]`, over
//! buffered read/write halves of a `TcpStream`.

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use plume_core::{Frame, FrameReader, FrameWriter, OpCode, PlumeError, PlumeResult};

use super::MAX_FRAME_SIZE;

/// Dial a TCP endpoint and return framed reader/writer halves.
pub async fn dial(addr: &str) -> PlumeResult<(TcpFrameReader, TcpFrameWriter)> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|e| PlumeError::Transport(format!("tcp connect error: {e}")))?;
    stream.set_nodelay(true)?;
    tracing::debug!(addr = %addr, "tcp connected");
    Ok(split(stream))
}

/// Split a connected `TcpStream` into framed halves.
pub fn split(stream: TcpStream) -> (TcpFrameReader, TcpFrameWriter) {
    let (read_half, write_half) = stream.into_split();
    (
        TcpFrameReader {
            reader: BufReader::new(read_half),
        },
        TcpFrameWriter {
            writer: BufWriter::new(write_half),
        },
    )
}

/// Read half of a TCP framed connection.
pub struct TcpFrameReader {
    reader: BufReader<OwnedReadHalf>,
}

/// Write half of a TCP framed connection.
pub struct TcpFrameWriter {
    writer: BufWriter<OwnedWriteHalf>,
}

#[async_trait]
impl FrameReader for TcpFrameReader {
    async fn read_frame(&mut self) -> PlumeResult<Frame> {
        let op = OpCode::try_from(self.reader.read_u8().await?)?;
        let len = self.reader.read_u32().await? as usize;
        if len > MAX_FRAME_SIZE {
            return Err(PlumeError::Codec(format!("frame too large: {len} bytes")));
        }
        let mut payload = vec![0u8; len];
        self.reader.read_exact(&mut payload).await?;
        Ok(Frame::new(op, payload))
    }
}

#[async_trait]
impl FrameWriter for TcpFrameWriter {
    async fn write_frame(&mut self, op: OpCode, payload: &[u8]) -> PlumeResult<()> {
        self.writer.write_u8(op.into()).await?;
        self.writer.write_u32(payload.len() as u32).await?;
        self.writer.write_all(payload).await?;
        Ok(())
    }

    async fn flush(&mut self) -> PlumeResult<()> {
        self.writer.flush().await?;
        Ok(())
    }

    async fn close(&mut self) -> PlumeResult<()> {
        let _ = self.writer.shutdown().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn frames_survive_the_wire() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (mut reader, mut writer) = split(stream);
            let frame = reader.read_frame().await.unwrap();
            writer.write_frame(frame.op, &frame.payload).await.unwrap();
            writer.flush().await.unwrap();
        });

        let (mut reader, mut writer) = dial(&addr.to_string()).await.unwrap();
        writer.write_frame(OpCode::Binary, b"ping me back").await.unwrap();
        writer.flush().await.unwrap();

        let echoed = reader.read_frame().await.unwrap();
        assert_eq!(echoed.op, OpCode::Binary);
        assert_eq!(echoed.payload, b"ping me back");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn zero_payload_control_frame() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (mut reader, _writer) = split(stream);
            reader.read_frame().await.unwrap()
        });

        let (_reader, mut writer) = dial(&addr.to_string()).await.unwrap();
        writer.write_frame(OpCode::Ping, &[]).await.unwrap();
        writer.flush().await.unwrap();

        let frame = server.await.unwrap();
        assert_eq!(frame.op, OpCode::Ping);
        assert!(frame.payload.is_empty());
    }
}
