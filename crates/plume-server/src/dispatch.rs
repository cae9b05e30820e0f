//! Local fan-out of routed packets.
//!
//! [`LocalDispatcher`] is the single-gateway realization of the core
//! [`Dispatcher`] capability: every destination gateway must be this
//! process, and delivery means enqueueing the marshalled packet on each
//! destination channel's outbound queue.

use std::sync::Arc;

use tracing::warn;

use plume_core::{marshal, Dispatcher, Packet, PlumeError, PlumeResult};

use crate::hooks::Agent;
use crate::registry::ChannelRegistry;

pub struct LocalDispatcher {
    gate_id: String,
    registry: Arc<ChannelRegistry>,
}

impl LocalDispatcher {
    pub fn new(gate_id: impl Into<String>, registry: Arc<ChannelRegistry>) -> Self {
        Self {
            gate_id: gate_id.into(),
            registry,
        }
    }
}

impl Dispatcher for LocalDispatcher {
    fn push(&self, gate_id: &str, channel_ids: &[String], packet: &Packet) -> PlumeResult<()> {
        if gate_id != self.gate_id {
            return Err(PlumeError::Dispatch(format!(
                "unknown gateway: {gate_id} (local gateway is {})",
                self.gate_id
            )));
        }

        // Marshal once, share the frame across all destinations.
        let frame = marshal(packet)?;
        for channel_id in channel_ids {
            match self.registry.get(channel_id) {
                Some(agent) => agent.push(frame.clone())?,
                // A channel that disconnected between routing and delivery
                // is not an error for the remaining destinations.
                None => warn!(channel = %channel_id, "push to unknown channel dropped"),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ChannelAgent;
    use plume_core::OpCode;
    use tokio::sync::mpsc;

    fn registry_with(
        ids: &[&str],
    ) -> (
        Arc<ChannelRegistry>,
        Vec<mpsc::UnboundedReceiver<(OpCode, Vec<u8>)>>,
    ) {
        let registry = Arc::new(ChannelRegistry::new());
        let mut receivers = Vec::new();
        for id in ids {
            let (tx, rx) = mpsc::unbounded_channel();
            registry.add(Arc::new(ChannelAgent::new(*id, "", tx)));
            receivers.push(rx);
        }
        (registry, receivers)
    }

    #[test]
    fn delivers_to_every_local_channel() {
        let (registry, mut receivers) = registry_with(&["C1", "C2"]);
        let dispatcher = LocalDispatcher::new("G1", registry);

        let packet = Packet::new("chat.talk");
        dispatcher
            .push("G1", &["C1".into(), "C2".into()], &packet)
            .unwrap();

        let expected = marshal(&packet).unwrap();
        for rx in &mut receivers {
            let (op, payload) = rx.try_recv().unwrap();
            assert_eq!(op, OpCode::Binary);
            assert_eq!(payload, expected);
        }
    }

    #[test]
    fn rejects_a_foreign_gateway() {
        let (registry, _receivers) = registry_with(&["C1"]);
        let dispatcher = LocalDispatcher::new("G1", registry);

        let err = dispatcher
            .push("G9", &["C1".into()], &Packet::new("chat.talk"))
            .unwrap_err();
        assert!(matches!(err, PlumeError::Dispatch(_)));
    }

    #[test]
    fn skips_channels_that_already_left() {
        let (registry, mut receivers) = registry_with(&["C1"]);
        let dispatcher = LocalDispatcher::new("G1", registry);

        dispatcher
            .push("G1", &["ghost".into(), "C1".into()], &Packet::new("chat.talk"))
            .unwrap();
        assert!(receivers[0].try_recv().is_ok());
    }
}
