//! The client-side transport session state machine.
//!
//! Lifecycle: `Idle → Connected` only via a successful [`Client::connect`],
//! guarded by an atomic compare-and-swap so concurrent connects race safely;
//! back to `Idle` via the idempotent [`Client::close`]. At most one live
//! underlying connection per instance at a time.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, trace, warn};

use plume_core::{Frame, FrameReader, FrameWriter, OpCode, PlumeError, PlumeResult};

use crate::dialer::{Dialer, DialerContext};

const STATE_IDLE: u32 = 0;
const STATE_CONNECTED: u32 = 1;

pub const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(55);
pub const DEFAULT_READ_WAIT: Duration = Duration::from_secs(3 * 60);
pub const DEFAULT_WRITE_WAIT: Duration = Duration::from_secs(10);
pub const DEFAULT_LOGIN_WAIT: Duration = Duration::from_secs(10);

/// Timeouts of a transport session. A zero heartbeat disables both the
/// heartbeat loop and read-deadline enforcement.
#[derive(Debug, Clone, Copy)]
pub struct ClientOptions {
    pub heartbeat: Duration,
    pub read_wait: Duration,
    pub write_wait: Duration,
    pub login_wait: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            heartbeat: DEFAULT_HEARTBEAT,
            read_wait: DEFAULT_READ_WAIT,
            write_wait: DEFAULT_WRITE_WAIT,
            login_wait: DEFAULT_LOGIN_WAIT,
        }
    }
}

/// A client-side transport session.
pub struct Client {
    id: String,
    name: String,
    meta: HashMap<String, String>,
    options: ClientOptions,
    dialer: Box<dyn Dialer>,

    state: AtomicU32,
    /// Per-connection close guard: only the first `close` tears down.
    closed: AtomicBool,
    channel_id: StdMutex<String>,
    reader: Mutex<Option<Box<dyn FrameReader>>>,
    writer: Arc<Mutex<Option<Box<dyn FrameWriter>>>>,
    heartbeat: StdMutex<Option<JoinHandle<()>>>,
}

impl Client {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        dialer: Box<dyn Dialer>,
        options: ClientOptions,
    ) -> Self {
        Self::with_meta(id, name, HashMap::new(), dialer, options)
    }

    pub fn with_meta(
        id: impl Into<String>,
        name: impl Into<String>,
        meta: HashMap<String, String>,
        dialer: Box<dyn Dialer>,
        mut options: ClientOptions,
    ) -> Self {
        if options.read_wait.is_zero() {
            options.read_wait = DEFAULT_READ_WAIT;
        }
        if options.write_wait.is_zero() {
            options.write_wait = DEFAULT_WRITE_WAIT;
        }
        if options.login_wait.is_zero() {
            options.login_wait = DEFAULT_LOGIN_WAIT;
        }
        Self {
            id: id.into(),
            name: name.into(),
            meta,
            options,
            dialer,
            state: AtomicU32::new(STATE_IDLE),
            closed: AtomicBool::new(true),
            channel_id: StdMutex::new(String::new()),
            reader: Mutex::new(None),
            writer: Arc::new(Mutex::new(None)),
            heartbeat: StdMutex::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.meta
    }

    /// The gateway-assigned channel id, empty until a connect succeeds.
    pub fn channel_id(&self) -> String {
        self.channel_id.lock().unwrap().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state.load(Ordering::SeqCst) == STATE_CONNECTED
    }

    /// Connect and authenticate.
    ///
    /// Exactly one of several concurrent calls wins the state CAS; the rest
    /// fail with [`PlumeError::AlreadyConnected`]. On dialer failure the
    /// state rolls back to `Idle` so a retry (the caller's responsibility)
    /// is possible.
    pub async fn connect(&self, addr: &str) -> PlumeResult<()> {
        if self
            .state
            .compare_exchange(STATE_IDLE, STATE_CONNECTED, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(PlumeError::AlreadyConnected);
        }

        let ctx = DialerContext {
            id: self.id.clone(),
            name: self.name.clone(),
            address: addr.to_string(),
            timeout: self.options.login_wait,
        };

        let handshake =
            match time::timeout(self.options.login_wait, self.dialer.dial_and_handshake(ctx)).await
            {
                Ok(Ok(handshake)) => handshake,
                Ok(Err(err)) => {
                    self.rollback();
                    return Err(err);
                }
                Err(_) => {
                    self.rollback();
                    return Err(PlumeError::Timeout);
                }
            };

        *self.channel_id.lock().unwrap() = handshake.channel_id;
        *self.reader.lock().await = Some(handshake.reader);
        *self.writer.lock().await = Some(handshake.writer);
        self.closed.store(false, Ordering::SeqCst);

        if !self.options.heartbeat.is_zero() {
            let handle = self.spawn_heartbeat();
            *self.heartbeat.lock().unwrap() = Some(handle);
        }

        info!(id = %self.id, addr = %addr, "connected");
        Ok(())
    }

    fn rollback(&self) {
        let _ = self.state.compare_exchange(
            STATE_CONNECTED,
            STATE_IDLE,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    /// Periodic ping loop. A write failure is terminal for the loop but not
    /// for the connection; the read path observes the broken connection on
    /// its own.
    fn spawn_heartbeat(&self) -> JoinHandle<()> {
        let writer = self.writer.clone();
        let interval = self.options.heartbeat;
        let id = self.id.clone();

        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.tick().await; // the first tick completes immediately

            loop {
                ticker.tick().await;

                let mut guard = writer.lock().await;
                let Some(w) = guard.as_mut() else {
                    break;
                };
                trace!(id = %id, "sending ping");
                let result = async {
                    w.write_frame(OpCode::Ping, &[]).await?;
                    w.flush().await
                }
                .await;
                if let Err(err) = result {
                    warn!(id = %id, error = %err, "heartbeat loop stopped");
                    break;
                }
            }
        })
    }

    /// Write one binary data frame and flush. Writes are serialized under the
    /// writer mutex; the underlying I/O error is returned unchanged.
    pub async fn send(&self, payload: &[u8]) -> PlumeResult<()> {
        if self.state.load(Ordering::SeqCst) != STATE_CONNECTED {
            return Err(PlumeError::NotConnected);
        }
        let write = async {
            let mut guard = self.writer.lock().await;
            let w = guard.as_mut().ok_or(PlumeError::NotConnected)?;
            w.write_frame(OpCode::Binary, payload).await?;
            w.flush().await
        };
        match time::timeout(self.options.write_wait, write).await {
            Ok(result) => result,
            Err(_) => Err(PlumeError::Timeout),
        }
    }

    /// Read the next frame.
    ///
    /// With heartbeats enabled the read is bounded by `read_wait`: an idle
    /// connection with no traffic inside that window is abandoned. An
    /// explicit close op-code is surfaced as [`PlumeError::RemoteClosed`] so
    /// the caller can stop its read loop.
    pub async fn read(&self) -> PlumeResult<Frame> {
        let mut guard = self.reader.lock().await;
        let r = guard.as_mut().ok_or(PlumeError::NotConnected)?;

        let frame = if self.options.heartbeat.is_zero() {
            r.read_frame().await?
        } else {
            match time::timeout(self.options.read_wait, r.read_frame()).await {
                Ok(result) => result?,
                Err(_) => return Err(PlumeError::Timeout),
            }
        };

        if frame.op == OpCode::Close {
            return Err(PlumeError::RemoteClosed);
        }
        Ok(frame)
    }

    /// Graceful, idempotent shutdown: safe to call multiple times or
    /// concurrently; only the first call performs the teardown.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(handle) = self.heartbeat.lock().unwrap().take() {
            handle.abort();
        }

        {
            let mut guard = self.writer.lock().await;
            if let Some(w) = guard.as_mut() {
                // Best-effort graceful close of the peer.
                let _ = w.write_frame(OpCode::Close, &[]).await;
                let _ = w.flush().await;
                let _ = w.close().await;
            }
            *guard = None;
        }
        *self.reader.lock().await = None;

        self.state.store(STATE_IDLE, Ordering::SeqCst);
        debug!(id = %self.id, "closed");
    }
}
