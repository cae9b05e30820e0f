//! Session attributes of the connection/account behind a packet.

use serde::{Deserialize, Serialize};

use crate::location::Location;

/// Tag marking a session synthesized by the core rather than resolved from
/// presence storage.
pub const TAG_AUTO_GENERATED: &str = "AutoGenerated";

/// Attributes of the connection that produced (or will receive) a packet.
///
/// Sessions are derived, not stored long-term, inside the core. The
/// `{gate_id, channel_id}` pair of a session is itself a [`Location`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub account: String,
    pub gate_id: String,
    pub channel_id: String,
    pub zone: String,
    pub isp: String,
    pub remote_ip: String,
    pub device: String,
    pub app: String,
    pub tags: Vec<String>,
}

impl Session {
    pub fn new(
        account: impl Into<String>,
        gate_id: impl Into<String>,
        channel_id: impl Into<String>,
    ) -> Self {
        Self {
            account: account.into(),
            gate_id: gate_id.into(),
            channel_id: channel_id.into(),
            ..Default::default()
        }
    }

    /// The routing target addressing this session's connection.
    pub fn location(&self) -> Location {
        Location::new(self.gate_id.clone(), self.channel_id.clone())
    }

    /// Whether this session was synthesized by the core.
    pub fn is_auto_generated(&self) -> bool {
        self.tags.iter().any(|t| t == TAG_AUTO_GENERATED)
    }
}
