//! Addressing of live connections.

use serde::{Deserialize, Serialize};

/// `{gate_id, channel_id}` pair identifying exactly one live connection on
/// exactly one gateway node.
///
/// Locations are ephemeral: they come from a presence lookup and must not be
/// cached beyond a single dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub gate_id: String,
    pub channel_id: String,
}

impl Location {
    pub fn new(gate_id: impl Into<String>, channel_id: impl Into<String>) -> Self {
        Self {
            gate_id: gate_id.into(),
            channel_id: channel_id.into(),
        }
    }
}
