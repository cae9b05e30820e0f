//! Length-prefixed CBOR framing for logic packets.
//!
//! Wire format: `[4-byte big-endian length][CBOR packet]`

use std::io::Cursor;

use crate::error::{PlumeError, PlumeResult};
use crate::packet::Packet;

/// Encode a packet into a length-prefixed CBOR frame.
pub fn marshal(packet: &Packet) -> PlumeResult<Vec<u8>> {
    let mut payload = Vec::new();
    ciborium::into_writer(packet, &mut payload)?;

    let len = payload.len() as u32;
    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend(payload);
    Ok(frame)
}

/// Decode one complete length-prefixed frame into a packet.
///
/// Fails on truncated input or a malformed header.
pub fn unmarshal(data: &[u8]) -> PlumeResult<Packet> {
    if data.len() < 4 {
        return Err(PlumeError::Codec(format!(
            "frame too short: {} bytes",
            data.len()
        )));
    }
    let len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
    if data.len() < 4 + len {
        return Err(PlumeError::Codec(format!(
            "truncated frame: want {} payload bytes, have {}",
            len,
            data.len() - 4
        )));
    }

    let cursor = Cursor::new(&data[4..4 + len]);
    let packet: Packet = ciborium::from_reader(cursor)?;
    Ok(packet)
}

/// Decode a raw CBOR body (no length prefix) into a typed message.
///
/// Type or schema mismatch is a [`PlumeError::Decode`], local to the caller.
pub fn decode_body<T: serde::de::DeserializeOwned>(data: &[u8]) -> PlumeResult<T> {
    let cursor = Cursor::new(data);
    ciborium::from_reader(cursor).map_err(|e| PlumeError::Decode(e.to_string()))
}

/// Encode a typed message as a raw CBOR body.
pub fn encode_body<T: serde::Serialize>(value: &T) -> PlumeResult<Vec<u8>> {
    let mut payload = Vec::new();
    ciborium::into_writer(value, &mut payload)?;
    Ok(payload)
}

/// Streaming packet decoder: accumulates bytes and yields complete packets.
///
/// Used by stream-oriented transports where frame boundaries do not line up
/// with read boundaries.
#[derive(Debug, Default)]
pub struct PacketDecoder {
    buffer: Vec<u8>,
}

impl PacketDecoder {
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Feed bytes into the decoder and return all complete packets.
    pub fn feed(&mut self, data: &[u8]) -> PlumeResult<Vec<Packet>> {
        self.buffer.extend_from_slice(data);
        let mut packets = Vec::new();

        loop {
            if self.buffer.len() < 4 {
                break;
            }
            let len =
                u32::from_be_bytes([self.buffer[0], self.buffer[1], self.buffer[2], self.buffer[3]])
                    as usize;

            if self.buffer.len() < 4 + len {
                break;
            }

            let cursor = Cursor::new(&self.buffer[4..4 + len]);
            let packet: Packet = ciborium::from_reader(cursor)?;
            packets.push(packet);

            self.buffer.drain(..4 + len);
        }

        Ok(packets)
    }

    /// Number of bytes waiting in the internal buffer.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Drop any buffered partial frame.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}
