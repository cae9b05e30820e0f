//! Logic packet types for the plume wire protocol.
//!
//! A [`Packet`] is a command header plus an opaque CBOR body. The header flag
//! fully determines handling semantics: `Response` packets are never
//! re-dispatched, `Push` packets always go through fan-out.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};

use crate::codec;
use crate::error::PlumeResult;

/// Meta key identifying the gateway a packet was received on. Used to
/// synthesize a session when the inbound packet carries none.
pub const META_DEST_SERVER: &str = "dest_server";

/// Command sent by a client to authenticate a fresh connection.
pub const COMMAND_LOGIN_SIGN_IN: &str = "login.signin";

/// Handling semantics of a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum Flag {
    Request = 1,
    Response = 2,
    Push = 3,
    Delivery = 4,
}

impl From<Flag> for u8 {
    fn from(f: Flag) -> u8 {
        f as u8
    }
}

impl TryFrom<u8> for Flag {
    type Error = String;
    fn try_from(v: u8) -> Result<Self, String> {
        match v {
            1 => Ok(Self::Request),
            2 => Ok(Self::Response),
            3 => Ok(Self::Push),
            4 => Ok(Self::Delivery),
            _ => Err(format!("unknown flag: {v}")),
        }
    }
}

/// Status code carried by response packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum Status {
    Success = 0,
    InvalidPacket = 10,
    InvalidCommand = 20,
    Unauthorized = 40,
    NoDestination = 50,
    SystemException = 90,
}

impl From<Status> for u16 {
    fn from(s: Status) -> u16 {
        s as u16
    }
}

impl TryFrom<u16> for Status {
    type Error = String;
    fn try_from(v: u16) -> Result<Self, String> {
        match v {
            0 => Ok(Self::Success),
            10 => Ok(Self::InvalidPacket),
            20 => Ok(Self::InvalidCommand),
            40 => Ok(Self::Unauthorized),
            50 => Ok(Self::NoDestination),
            90 => Ok(Self::SystemException),
            _ => Err(format!("unknown status: {v}")),
        }
    }
}

/// Packet header: command, sequence, flag, status and free-form meta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub command: String,
    pub sequence: u32,
    pub flag: Flag,
    pub status: Status,
    #[serde(default)]
    pub meta: HashMap<String, String>,
}

/// A logic packet: header plus an opaque serialized body.
///
/// `channel_id` is the gateway-local connection the packet arrived on. It is
/// transient routing state assigned by the receiving gateway and never
/// travels on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    pub header: Header,
    pub body: Vec<u8>,
    #[serde(skip)]
    pub channel_id: String,
}

static SEQUENCE: AtomicU32 = AtomicU32::new(1);

fn next_sequence() -> u32 {
    SEQUENCE.fetch_add(1, Ordering::Relaxed)
}

impl Packet {
    /// Build a fresh `Request` packet with a process-unique sequence number.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            header: Header {
                command: command.into(),
                sequence: next_sequence(),
                flag: Flag::Request,
                status: Status::Success,
                meta: HashMap::new(),
            },
            body: Vec::new(),
            channel_id: String::new(),
        }
    }

    /// Build an outbound packet that answers `header`: command and sequence
    /// are copied so the peer can correlate it with its request.
    pub fn new_from(header: &Header) -> Self {
        Self {
            header: Header {
                command: header.command.clone(),
                sequence: header.sequence,
                flag: Flag::Response,
                status: Status::Success,
                meta: HashMap::new(),
            },
            body: Vec::new(),
            channel_id: String::new(),
        }
    }

    /// Decode the opaque body into a typed message.
    pub fn read_body<T: serde::de::DeserializeOwned>(&self) -> PlumeResult<T> {
        codec::decode_body(&self.body)
    }

    /// Serialize a typed message into the opaque body. Fails only on
    /// serialization-library errors, which are unexpected.
    pub fn write_body<T: Serialize>(&mut self, body: &T) -> PlumeResult<&mut Self> {
        self.body = codec::encode_body(body)?;
        Ok(self)
    }

    pub fn set_meta(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.header.meta.insert(key.into(), value.into());
    }

    pub fn get_meta(&self, key: &str) -> Option<&str> {
        self.header.meta.get(key).map(String::as_str)
    }
}
