//! The capability the routing core needs from the inter-node fabric.

use crate::error::PlumeResult;
use crate::packet::Packet;

/// Pushes a packet to named connections on a named gateway node.
///
/// This is the sole method the core requires from the inter-node messaging
/// fabric. Per-gateway delivery semantics (ordering, retries) belong to the
/// implementation; the core only guarantees correct grouping and sequencing
/// of calls.
///
/// The trait is synchronous: the handler chain is a synchronous middleware
/// pipeline, so implementations bridge to async transports by enqueueing
/// (e.g. onto an unbounded channel) rather than awaiting the send.
pub trait Dispatcher: Send + Sync {
    /// Send `packet` to every listed channel on gateway `gate_id`.
    fn push(&self, gate_id: &str, channel_ids: &[String], packet: &Packet) -> PlumeResult<()>;
}
