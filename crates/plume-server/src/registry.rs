//! In-process channel registry.
//!
//! Tracks every admitted connection on this gateway by channel id and hands
//! out [`ChannelAgent`] handles for pushing outbound frames. Lookups happen
//! on the synchronous dispatch path, so the map sits behind a std `RwLock`
//! rather than an async one.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;
use tracing::{debug, info};

use plume_core::{OpCode, PlumeError, PlumeResult};

use crate::hooks::Agent;

/// Outbound handle for one admitted connection. Frames pushed here are
/// drained by the connection's writer task.
pub struct ChannelAgent {
    id: String,
    account: String,
    outbound: mpsc::UnboundedSender<(OpCode, Vec<u8>)>,
}

impl ChannelAgent {
    pub fn new(
        id: impl Into<String>,
        account: impl Into<String>,
        outbound: mpsc::UnboundedSender<(OpCode, Vec<u8>)>,
    ) -> Self {
        Self {
            id: id.into(),
            account: account.into(),
            outbound,
        }
    }

    /// Account authenticated at admission, if any.
    pub fn account(&self) -> &str {
        &self.account
    }

    pub(crate) fn send_frame(&self, op: OpCode, payload: Vec<u8>) -> PlumeResult<()> {
        self.outbound
            .send((op, payload))
            .map_err(|_| PlumeError::Transport(format!("channel {} is gone", self.id)))
    }
}

impl Agent for ChannelAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn push(&self, payload: Vec<u8>) -> PlumeResult<()> {
        self.send_frame(OpCode::Binary, payload)
    }
}

/// Channel-id -> agent map for one gateway process.
#[derive(Default)]
pub struct ChannelRegistry {
    channels: RwLock<HashMap<String, Arc<ChannelAgent>>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an admitted connection. Replaces any stale entry under the
    /// same channel id.
    pub fn add(&self, agent: Arc<ChannelAgent>) {
        info!(channel = %agent.id(), account = %agent.account(), "channel registered");
        self.lock_write().insert(agent.id().to_string(), agent);
    }

    pub fn remove(&self, channel_id: &str) -> Option<Arc<ChannelAgent>> {
        let removed = self.lock_write().remove(channel_id);
        if removed.is_some() {
            debug!(channel = %channel_id, "channel deregistered");
        }
        removed
    }

    pub fn get(&self, channel_id: &str) -> Option<Arc<ChannelAgent>> {
        self.lock_read().get(channel_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock_read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_read().is_empty()
    }

    fn lock_read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<ChannelAgent>>> {
        self.channels.read().expect("channel registry lock poisoned")
    }

    fn lock_write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<ChannelAgent>>> {
        self.channels
            .write()
            .expect("channel registry lock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(id: &str) -> Arc<ChannelAgent> {
        let (tx, _rx) = mpsc::unbounded_channel();
        Arc::new(ChannelAgent::new(id, "alice", tx))
    }

    #[test]
    fn add_get_remove() {
        let registry = ChannelRegistry::new();
        assert!(registry.is_empty());

        registry.add(agent("C1"));
        registry.add(agent("C2"));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("C1").unwrap().id(), "C1");

        assert!(registry.remove("C1").is_some());
        assert!(registry.remove("C1").is_none());
        assert!(registry.get("C1").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn replacing_keeps_latest_agent() {
        let registry = ChannelRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let first = Arc::new(ChannelAgent::new("C1", "alice", tx));
        let (tx, _rx) = mpsc::unbounded_channel();
        let second = Arc::new(ChannelAgent::new("C1", "bob", tx));

        registry.add(first);
        registry.add(second);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("C1").unwrap().account(), "bob");
    }

    #[test]
    fn push_lands_on_the_outbound_queue() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let agent = ChannelAgent::new("C1", "alice", tx);

        agent.push(b"hello".to_vec()).unwrap();
        let (op, payload) = rx.try_recv().unwrap();
        assert_eq!(op, OpCode::Binary);
        assert_eq!(payload, b"hello");

        drop(rx);
        assert!(agent.push(b"late".to_vec()).is_err());
    }
}
