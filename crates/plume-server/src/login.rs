//! Token-based admission.
//!
//! [`LoginAcceptor`] implements the default admission exchange: the first
//! frame must be a `login.signin` packet carrying an HMAC bearer token.
//! Verified connections get a fresh channel id back in a `LoginResponse`;
//! rejected ones get a status packet explaining why before the connection
//! is dropped.

use std::fmt::Display;
use std::time::Duration;

use async_trait::async_trait;
use rand::RngCore;
use tracing::{info, warn};

use plume_core::bodies::{ErrorResponse, LoginRequest, LoginResponse};
use plume_core::{
    marshal, token, unmarshal, Conn, OpCode, Packet, PlumeError, PlumeResult, Status,
    COMMAND_LOGIN_SIGN_IN,
};

use crate::hooks::{Acceptor, Meta, META_KEY_ACCOUNT, META_KEY_APP};

pub struct LoginAcceptor {
    secret: Vec<u8>,
}

impl LoginAcceptor {
    pub fn new(secret: Vec<u8>) -> Self {
        Self { secret }
    }
}

#[async_trait]
impl Acceptor for LoginAcceptor {
    async fn accept(&self, conn: &mut dyn Conn, timeout: Duration) -> PlumeResult<(String, Meta)> {
        let frame = tokio::time::timeout(timeout, conn.read_frame())
            .await
            .map_err(|_| PlumeError::Timeout)??;
        if frame.op != OpCode::Binary {
            return Err(PlumeError::Handshake(format!(
                "expected a binary login frame, got {:?}",
                frame.op
            )));
        }
        let packet = unmarshal(&frame.payload)?;

        if packet.header.command != COMMAND_LOGIN_SIGN_IN {
            let err = PlumeError::Handshake(format!(
                "expected {COMMAND_LOGIN_SIGN_IN}, got {}",
                packet.header.command
            ));
            reject(conn, &packet, Status::InvalidCommand, &err).await;
            return Err(err);
        }

        let request: LoginRequest = match packet.read_body() {
            Ok(request) => request,
            Err(err) => {
                reject(conn, &packet, Status::InvalidPacket, &err).await;
                return Err(err);
            }
        };

        let claims = match token::verify(&self.secret, &request.token) {
            Ok(claims) => claims,
            Err(err) => {
                warn!(error = %err, "login rejected");
                reject(conn, &packet, Status::Unauthorized, &err).await;
                return Err(err);
            }
        };

        let channel_id = generate_channel_id();
        let mut response = Packet::new_from(&packet.header);
        response.write_body(&LoginResponse {
            channel_id: channel_id.clone(),
        })?;
        conn.write_frame(OpCode::Binary, &marshal(&response)?).await?;
        conn.flush().await?;

        info!(account = %claims.account, channel = %channel_id, "login accepted");

        let mut meta = Meta::new();
        meta.insert(META_KEY_ACCOUNT.to_string(), claims.account);
        meta.insert(META_KEY_APP.to_string(), claims.app);
        Ok((channel_id, meta))
    }
}

/// Best-effort rejection reply; the connection is dropped right after, so
/// write failures are irrelevant.
async fn reject(conn: &mut dyn Conn, request: &Packet, status: Status, reason: &impl Display) {
    let mut response = Packet::new_from(&request.header);
    response.header.status = status;
    let body_ok = response
        .write_body(&ErrorResponse {
            message: reason.to_string(),
        })
        .is_ok();
    if body_ok {
        if let Ok(data) = marshal(&response) {
            let _ = conn.write_frame(OpCode::Binary, &data).await;
            let _ = conn.flush().await;
        }
    }
}

/// Fresh 16-byte random channel id, hex-encoded.
fn generate_channel_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use plume_core::{Flag, Frame, FrameReader, FrameWriter};
    use std::collections::VecDeque;

    /// In-memory connection scripted with inbound frames, recording writes.
    struct MemConn {
        inbound: VecDeque<Frame>,
        written: Vec<Frame>,
    }

    impl MemConn {
        fn with_inbound(frames: Vec<Frame>) -> Self {
            Self {
                inbound: frames.into(),
                written: Vec::new(),
            }
        }

        fn written_packet(&self) -> Packet {
            unmarshal(&self.written[0].payload).unwrap()
        }
    }

    #[async_trait]
    impl FrameReader for MemConn {
        async fn read_frame(&mut self) -> PlumeResult<Frame> {
            match self.inbound.pop_front() {
                Some(frame) => Ok(frame),
                None => std::future::pending().await,
            }
        }
    }

    #[async_trait]
    impl FrameWriter for MemConn {
        async fn write_frame(&mut self, op: OpCode, payload: &[u8]) -> PlumeResult<()> {
            self.written.push(Frame::new(op, payload.to_vec()));
            Ok(())
        }

        async fn flush(&mut self) -> PlumeResult<()> {
            Ok(())
        }

        async fn close(&mut self) -> PlumeResult<()> {
            Ok(())
        }
    }

    const TIMEOUT: Duration = Duration::from_millis(100);

    fn login_frame(secret: &[u8], account: &str) -> Frame {
        let token = token::issue(secret, account, "plume", 60).unwrap();
        let mut packet = Packet::new(COMMAND_LOGIN_SIGN_IN);
        packet.write_body(&LoginRequest { token }).unwrap();
        Frame::new(OpCode::Binary, marshal(&packet).unwrap())
    }

    #[tokio::test]
    async fn admits_a_valid_token() {
        let secret = b"s3cret".to_vec();
        let acceptor = LoginAcceptor::new(secret.clone());
        let mut conn = MemConn::with_inbound(vec![login_frame(&secret, "alice")]);

        let (channel_id, meta) = acceptor.accept(&mut conn, TIMEOUT).await.unwrap();
        assert_eq!(channel_id.len(), 32);
        assert_eq!(meta.get(META_KEY_ACCOUNT).unwrap(), "alice");

        let response = conn.written_packet();
        assert_eq!(response.header.flag, Flag::Response);
        assert_eq!(response.header.status, Status::Success);
        let body: LoginResponse = response.read_body().unwrap();
        assert_eq!(body.channel_id, channel_id);
    }

    #[tokio::test]
    async fn rejects_a_forged_token() {
        let acceptor = LoginAcceptor::new(b"s3cret".to_vec());
        let mut conn = MemConn::with_inbound(vec![login_frame(b"wrong-secret", "mallory")]);

        let err = acceptor.accept(&mut conn, TIMEOUT).await.unwrap_err();
        assert!(matches!(err, PlumeError::Token(_)));

        let response = conn.written_packet();
        assert_eq!(response.header.status, Status::Unauthorized);
        let body: ErrorResponse = response.read_body().unwrap();
        assert!(!body.message.is_empty());
    }

    #[tokio::test]
    async fn rejects_the_wrong_command() {
        let acceptor = LoginAcceptor::new(b"s3cret".to_vec());
        let stray = Packet::new("chat.talk");
        let mut conn = MemConn::with_inbound(vec![Frame::new(
            OpCode::Binary,
            marshal(&stray).unwrap(),
        )]);

        let err = acceptor.accept(&mut conn, TIMEOUT).await.unwrap_err();
        assert!(matches!(err, PlumeError::Handshake(_)));
        assert_eq!(conn.written_packet().header.status, Status::InvalidCommand);
    }

    #[tokio::test]
    async fn times_out_on_a_silent_peer() {
        let acceptor = LoginAcceptor::new(b"s3cret".to_vec());
        let mut conn = MemConn::with_inbound(Vec::new());

        let err = acceptor.accept(&mut conn, TIMEOUT).await.unwrap_err();
        assert!(matches!(err, PlumeError::Timeout));
        assert!(conn.written.is_empty());
    }

    #[tokio::test]
    async fn two_logins_get_distinct_channel_ids() {
        let secret = b"s3cret".to_vec();
        let acceptor = LoginAcceptor::new(secret.clone());

        let mut first = MemConn::with_inbound(vec![login_frame(&secret, "alice")]);
        let mut second = MemConn::with_inbound(vec![login_frame(&secret, "alice")]);
        let (a, _) = acceptor.accept(&mut first, TIMEOUT).await.unwrap();
        let (b, _) = acceptor.accept(&mut second, TIMEOUT).await.unwrap();
        assert_ne!(a, b);
    }
}
