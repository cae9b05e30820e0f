//! Dial-and-handshake capability.
//!
//! The transport session delegates network dial plus the application-level
//! login exchange to a pluggable [`Dialer`], so tests and alternative
//! transports can swap the whole connection establishment path.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

use plume_core::bodies::{LoginRequest, LoginResponse};
use plume_core::{
    marshal, token, unmarshal, FrameReader, FrameWriter, Packet, PlumeError, PlumeResult, Status,
    COMMAND_LOGIN_SIGN_IN,
};

use crate::conn::websocket;

/// Issued login tokens are valid for one day.
const TOKEN_TTL_SECS: u64 = 24 * 60 * 60;

/// Everything a dialer needs to establish and authenticate one connection.
#[derive(Debug, Clone)]
pub struct DialerContext {
    /// Account identity to authenticate as.
    pub id: String,
    /// Human-readable client name.
    pub name: String,
    /// Endpoint address (scheme depends on the dialer).
    pub address: String,
    /// Bound on the whole dial + handshake exchange.
    pub timeout: Duration,
}

/// A dialed, authenticated connection: framed halves plus the channel id the
/// gateway assigned during login.
pub struct Handshake {
    pub reader: Box<dyn FrameReader>,
    pub writer: Box<dyn FrameWriter>,
    pub channel_id: String,
}

/// Performs network dial plus the application-level login handshake.
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial_and_handshake(&self, ctx: DialerContext) -> PlumeResult<Handshake>;
}

/// Default dialer: WebSocket dial, then a `login.signin` exchange carrying
/// an HMAC bearer token.
pub struct LoginDialer {
    secret: Vec<u8>,
    app: String,
}

impl LoginDialer {
    pub fn new(secret: Vec<u8>) -> Self {
        Self {
            secret,
            app: "plume".to_string(),
        }
    }

    pub fn with_app(mut self, app: impl Into<String>) -> Self {
        self.app = app.into();
        self
    }
}

#[async_trait]
impl Dialer for LoginDialer {
    async fn dial_and_handshake(&self, ctx: DialerContext) -> PlumeResult<Handshake> {
        let mut ws = websocket::dial(&ctx.address).await?;

        let token = token::issue(&self.secret, &ctx.id, &self.app, TOKEN_TTL_SECS)?;
        let mut login = Packet::new(COMMAND_LOGIN_SIGN_IN);
        login.write_body(&LoginRequest { token })?;

        ws.send(Message::Binary(marshal(&login)?))
            .await
            .map_err(|e| PlumeError::Handshake(format!("login send error: {e}")))?;

        // Await the acknowledgement packet within the handshake window.
        let ack = loop {
            let msg = tokio::time::timeout(ctx.timeout, ws.next())
                .await
                .map_err(|_| PlumeError::Timeout)?
                .ok_or_else(|| PlumeError::Handshake("connection closed during handshake".into()))?
                .map_err(|e| PlumeError::Handshake(format!("login read error: {e}")))?;

            match msg {
                Message::Binary(data) => break unmarshal(&data)?,
                Message::Ping(payload) => {
                    let _ = ws.send(Message::Pong(payload)).await;
                }
                Message::Close(_) => {
                    return Err(PlumeError::Handshake("closed during handshake".into()))
                }
                _ => continue,
            }
        };

        if ack.header.status != Status::Success {
            return Err(PlumeError::Handshake(format!(
                "login rejected with status {:?}",
                ack.header.status
            )));
        }

        let resp: LoginResponse = ack.read_body()?;
        debug!(id = %ctx.id, channel = %resp.channel_id, "login acknowledged");

        let (reader, writer) = websocket::split(ws);
        Ok(Handshake {
            reader: Box::new(reader),
            writer: Box::new(writer),
            channel_id: resp.channel_id,
        })
    }
}
