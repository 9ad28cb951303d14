//! Packet factory
//!
//! Builds outbound packets for one logical sender, numbering them with a
//! wrapping 16-bit sequence counter.

use bytes::{Buf, Bytes};
use std::time::SystemTime;

use super::codec::{self, CodecError, CodecResult};
use super::{Packet, PacketType, MAX_DATAGRAM_SIZE, PROTOCOL_VERSION};

/// Payload size used by [`PacketFactory::create_empty`]
pub const EMPTY_PAYLOAD_SIZE: usize = MAX_DATAGRAM_SIZE;

/// Stateful packet builder
#[derive(Debug)]
pub struct PacketFactory {
    version: u8,
    /// Next sequence number. Counts packets, not bytes.
    sequence: u16,
}

impl PacketFactory {
    pub fn new() -> Self {
        Self::with_version(PROTOCOL_VERSION)
    }

    pub fn with_version(version: u8) -> Self {
        Self {
            version,
            sequence: 0,
        }
    }

    /// Protocol version stamped on every packet
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Sequence number the next packet will receive
    pub fn next_sequence(&self) -> u16 {
        self.sequence
    }

    /// Create a packet with a zero-filled payload of [`EMPTY_PAYLOAD_SIZE`] bytes
    pub fn create_empty(&mut self, packet_type: PacketType) -> CodecResult<Packet> {
        self.build(packet_type, Bytes::from(vec![0u8; EMPTY_PAYLOAD_SIZE]))
    }

    /// Create a packet from every byte remaining in `content`.
    ///
    /// The bytes are consumed from `content`, so passing `&mut buf` leaves the
    /// caller's buffer drained.
    pub fn create<B: Buf>(&mut self, packet_type: PacketType, mut content: B) -> CodecResult<Packet> {
        if packet_type == PacketType::Unknown {
            return Err(CodecError::UnknownType);
        }
        let payload = content.copy_to_bytes(content.remaining());
        self.build(packet_type, payload)
    }

    /// Create a packet carrying a copy of `payload`
    pub fn create_with_payload(&mut self, packet_type: PacketType, payload: &[u8]) -> CodecResult<Packet> {
        self.create(packet_type, payload)
    }

    fn build(&mut self, packet_type: PacketType, payload: Bytes) -> CodecResult<Packet> {
        if packet_type == PacketType::Unknown {
            return Err(CodecError::UnknownType);
        }

        let packet = Packet::new(
            packet_type.id(),
            self.version,
            self.sequence,
            payload,
            SystemTime::now(),
        );
        self.sequence = self.sequence.wrapping_add(1);
        Ok(packet)
    }

    /// Parse a received datagram. Independent of any factory's state.
    pub fn parse(bytes: &[u8]) -> CodecResult<Packet> {
        codec::decode_now(bytes)
    }

    /// Parse a received datagram with an explicit timestamp
    pub fn parse_at(bytes: &[u8], timestamp: SystemTime) -> CodecResult<Packet> {
        codec::decode(bytes, timestamp)
    }
}

impl Default for PacketFactory {
    fn default() -> Self {
        Self::new()
    }
}
