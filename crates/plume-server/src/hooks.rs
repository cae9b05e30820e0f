//! Gateway extension points.
//!
//! The listener loop in [`crate::server`] is deliberately dumb: connection
//! admission, inbound payload handling, and disconnect bookkeeping are all
//! delegated through the traits here so the gateway core stays free of
//! application policy.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use plume_core::{Conn, PlumeResult};

/// Per-connection metadata collected during admission (account, app, ...).
pub type Meta = HashMap<String, String>;

/// Metadata key for the authenticated account identity.
pub const META_KEY_ACCOUNT: &str = "account";
/// Metadata key for the application the token was issued for.
pub const META_KEY_APP: &str = "app";

/// Decides whether a freshly-accepted connection is admitted.
///
/// Runs exactly once per connection, before it is registered anywhere. The
/// acceptor owns the whole admission exchange on the unsplit connection and
/// must complete it within `timeout`. Returning an error drops the
/// connection; any rejection frames must already have been written.
#[async_trait]
pub trait Acceptor: Send + Sync {
    async fn accept(&self, conn: &mut dyn Conn, timeout: Duration) -> PlumeResult<(String, Meta)>;
}

/// Receives every inbound data payload from an admitted connection.
///
/// Called from the connection's read task; implementations must not block.
/// Replies go back through the [`Agent`] handle.
pub trait MessageListener: Send + Sync {
    fn receive(&self, agent: Arc<dyn Agent>, payload: &[u8]);
}

/// Notified after a connection has been torn down and deregistered.
pub trait StateListener: Send + Sync {
    fn disconnect(&self, channel_id: &str) -> PlumeResult<()>;
}

/// Handle to one admitted connection: its identity plus an outbound queue.
pub trait Agent: Send + Sync {
    /// Channel id assigned at admission.
    fn id(&self) -> &str;

    /// Enqueue a data payload for delivery to the peer. Non-blocking; fails
    /// only once the connection is gone.
    fn push(&self, payload: Vec<u8>) -> PlumeResult<()>;
}
