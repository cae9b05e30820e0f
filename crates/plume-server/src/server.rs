//! WebSocket listener loop.
//!
//! One task per connection: the acceptor runs its admission exchange on the
//! unsplit stream, then the connection splits into a read loop (feeding the
//! message listener) and a writer task (draining the agent's outbound
//! queue). The logic-tier handler chain lives behind the listener
//! callbacks; the loop itself only moves frames.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use plume_core::{FrameReader, FrameWriter, OpCode, PlumeError, PlumeResult};

use crate::config::GatewayConfig;
use crate::dispatch::LocalDispatcher;
use crate::hooks::{Acceptor, MessageListener, Meta, StateListener, META_KEY_ACCOUNT};
use crate::registry::{ChannelAgent, ChannelRegistry};
use crate::transport::WsConn;

/// An admitted connection that goes silent this long is torn down.
const DEFAULT_READ_WAIT: Duration = Duration::from_secs(3 * 60);
/// Bound on the whole admission exchange.
const DEFAULT_ACCEPT_WAIT: Duration = Duration::from_secs(10);

pub struct GatewayServer {
    service_id: String,
    listen: String,
    read_wait: Duration,
    accept_wait: Duration,
    acceptor: Arc<dyn Acceptor>,
    message_listener: Arc<dyn MessageListener>,
    state_listener: Arc<dyn StateListener>,
    registry: Arc<ChannelRegistry>,
}

impl GatewayServer {
    pub fn new(
        config: &GatewayConfig,
        acceptor: Arc<dyn Acceptor>,
        message_listener: Arc<dyn MessageListener>,
        state_listener: Arc<dyn StateListener>,
    ) -> Self {
        Self {
            service_id: config.service_id.clone(),
            listen: config.listen.clone(),
            read_wait: DEFAULT_READ_WAIT,
            accept_wait: DEFAULT_ACCEPT_WAIT,
            acceptor,
            message_listener,
            state_listener,
            registry: Arc::new(ChannelRegistry::new()),
        }
    }

    pub fn with_read_wait(mut self, read_wait: Duration) -> Self {
        self.read_wait = read_wait;
        self
    }

    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    pub fn registry(&self) -> Arc<ChannelRegistry> {
        self.registry.clone()
    }

    /// Dispatcher delivering to channels admitted by this gateway.
    pub fn dispatcher(&self) -> LocalDispatcher {
        LocalDispatcher::new(self.service_id.clone(), self.registry.clone())
    }

    /// Bind the listener and spawn the accept loop. Returns the bound
    /// address, so a `:0` listen config works for tests.
    pub async fn start(self: Arc<Self>) -> PlumeResult<SocketAddr> {
        let listener = TcpListener::bind(&self.listen)
            .await
            .map_err(|e| PlumeError::Transport(format!("bind {} failed: {e}", self.listen)))?;
        let addr = listener.local_addr()?;
        info!(service = %self.service_id, %addr, "gateway listening");

        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        let server = self.clone();
                        tokio::spawn(async move {
                            if let Err(err) = server.handle_connection(stream, peer).await {
                                debug!(%peer, error = %err, "connection ended with error");
                            }
                        });
                    }
                    Err(err) => {
                        error!(error = %err, "accept failed");
                        break;
                    }
                }
            }
        });
        Ok(addr)
    }

    async fn handle_connection(&self, stream: TcpStream, peer: SocketAddr) -> PlumeResult<()> {
        let ws = tokio_tungstenite::accept_async(stream)
            .await
            .map_err(|e| PlumeError::Transport(format!("websocket upgrade error: {e}")))?;
        let mut conn = WsConn::new(ws);

        let (channel_id, meta) = self.acceptor.accept(&mut conn, self.accept_wait).await?;
        if channel_id.is_empty() {
            return Err(PlumeError::Handshake("empty channel id from acceptor".into()));
        }
        debug!(%peer, channel = %channel_id, "connection admitted");

        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<(OpCode, Vec<u8>)>();
        let agent = Arc::new(ChannelAgent::new(
            channel_id.clone(),
            account_of(&meta),
            outbound,
        ));
        self.registry.add(agent.clone());

        let (mut reader, mut writer) = conn.split();
        tokio::spawn(async move {
            while let Some((op, payload)) = outbound_rx.recv().await {
                if op == OpCode::Close {
                    break;
                }
                if writer.write_frame(op, &payload).await.is_err() {
                    break;
                }
                if writer.flush().await.is_err() {
                    break;
                }
            }
            let _ = writer.close().await;
        });

        let result = loop {
            let frame = match tokio::time::timeout(self.read_wait, reader.read_frame()).await {
                Ok(Ok(frame)) => frame,
                Ok(Err(err)) => break Err(err),
                Err(_) => break Err(PlumeError::Timeout),
            };
            match frame.op {
                OpCode::Binary => {
                    self.message_listener.receive(agent.clone(), &frame.payload);
                }
                OpCode::Ping => {
                    let _ = agent.send_frame(OpCode::Pong, frame.payload);
                }
                OpCode::Pong => {}
                OpCode::Close => break Ok(()),
            }
        };

        self.registry.remove(&channel_id);
        // Stop the writer task; any queued frames ahead of the close marker
        // still drain first.
        let _ = agent.send_frame(OpCode::Close, Vec::new());
        if let Err(err) = self.state_listener.disconnect(&channel_id) {
            warn!(channel = %channel_id, error = %err, "disconnect listener failed");
        }

        match &result {
            Ok(()) => debug!(channel = %channel_id, "connection closed by peer"),
            Err(err) => debug!(channel = %channel_id, error = %err, "connection torn down"),
        }
        result
    }
}

fn account_of(meta: &Meta) -> String {
    meta.get(META_KEY_ACCOUNT).cloned().unwrap_or_default()
}
