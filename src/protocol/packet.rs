//! Packet definitions
//!
//! A [`Packet`] is one protocol message. Apart from the local timestamp, all
//! of its fields travel on the wire.

use bytes::Bytes;
use std::cmp::Ordering;
use std::fmt;
use std::time::SystemTime;

/// Kinds of packets understood by the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PacketType {
    /// Chat message carrying user text
    Message,
    /// Acknowledgement carrying the sequence it answers
    Ack,
    /// Fallback for any type byte outside the known set
    Unknown,
}

impl PacketType {
    /// Number of variants
    pub const COUNT: usize = 3;

    /// Every variant, in declaration order
    pub const ALL: [PacketType; Self::COUNT] = [PacketType::Message, PacketType::Ack, PacketType::Unknown];

    /// Get the wire identifier for this type.
    ///
    /// `Unknown` nominally shares `0x00` with `Message`, so it can never be
    /// produced by [`PacketType::from_id`] and cannot be sent.
    pub fn id(self) -> u8 {
        match self {
            PacketType::Message => 0x00,
            PacketType::Ack => 0x01,
            PacketType::Unknown => 0x00,
        }
    }

    /// Resolve a raw type byte. Total: unrecognized bytes become `Unknown`.
    pub fn from_id(id: u8) -> Self {
        match id {
            0x00 => PacketType::Message,
            0x01 => PacketType::Ack,
            _ => PacketType::Unknown,
        }
    }

    /// Index into per-variant tables
    pub(crate) fn index(self) -> usize {
        match self {
            PacketType::Message => 0,
            PacketType::Ack => 1,
            PacketType::Unknown => 2,
        }
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PacketType::Message => "MESSAGE",
            PacketType::Ack => "ACK",
            PacketType::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

/// One protocol message exchanged over a single datagram.
///
/// Equality covers every field including the local timestamp, so two packets
/// built independently are almost never equal. Use [`Packet::sequence_cmp`]
/// or the ordered sets in [`crate::protocol::PacketSet`] for ordering.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Packet {
    packet_type: u8,
    version: u8,
    sequence: u16,
    payload: Bytes,
    /// Host-side receipt or creation time, never serialized
    timestamp: SystemTime,
}

impl Packet {
    pub fn new(
        packet_type: u8,
        version: u8,
        sequence: u16,
        payload: impl Into<Bytes>,
        timestamp: SystemTime,
    ) -> Self {
        Self {
            packet_type,
            version,
            sequence,
            payload: payload.into(),
            timestamp,
        }
    }

    /// Raw type byte as it appears on the wire
    pub fn type_id(&self) -> u8 {
        self.packet_type
    }

    /// Resolved packet type
    pub fn packet_type(&self) -> PacketType {
        PacketType::from_id(self.packet_type)
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    /// Size of this packet once encoded
    pub fn encoded_len(&self) -> usize {
        super::HEADER_SIZE + self.payload.len()
    }

    /// Payload interpreted as UTF-8 text, lossily
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }

    /// Sequence number carried by an ACK payload.
    ///
    /// Returns `None` for non-ACK packets or payloads shorter than two bytes.
    pub fn acked_sequence(&self) -> Option<u16> {
        if self.packet_type() != PacketType::Ack || self.payload.len() < 2 {
            return None;
        }
        Some(u16::from_be_bytes([self.payload[0], self.payload[1]]))
    }

    /// Order two packets by sequence number alone.
    ///
    /// Plain numeric order: 65535 sorts after 0 even across a wrap.
    pub fn sequence_cmp(a: &Packet, b: &Packet) -> Ordering {
        a.sequence.cmp(&b.sequence)
    }

    /// Order two packets by local timestamp alone
    pub fn timestamp_cmp(a: &Packet, b: &Packet) -> Ordering {
        a.timestamp.cmp(&b.timestamp)
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Packet{{type={}, version={}, sequence={}, payload={} bytes}}",
            self.packet_type(),
            self.version,
            self.sequence,
            self.payload.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    fn packet(sequence: u16, payload: &'static [u8]) -> Packet {
        Packet::new(0, 0, sequence, payload, UNIX_EPOCH)
    }

    #[test]
    fn test_type_resolution_is_total() {
        assert_eq!(PacketType::from_id(0x00), PacketType::Message);
        assert_eq!(PacketType::from_id(0x01), PacketType::Ack);
        for id in 0x02..=u8::MAX {
            assert_eq!(PacketType::from_id(id), PacketType::Unknown);
        }
    }

    #[test]
    fn test_unknown_id_collides_with_message() {
        assert_eq!(PacketType::Unknown.id(), PacketType::Message.id());
        assert_eq!(
            PacketType::from_id(PacketType::Unknown.id()),
            PacketType::Message
        );
    }

    #[test]
    fn test_sequence_comparator() {
        let a = packet(0, &[]);
        let b = packet(0, &[]);
        assert_eq!(Packet::sequence_cmp(&a, &b), Ordering::Equal);

        // Payload and timestamp are ignored
        let c = Packet::new(1, 7, 0, &b"other"[..], UNIX_EPOCH + Duration::from_secs(9));
        assert_eq!(Packet::sequence_cmp(&a, &c), Ordering::Equal);

        assert_eq!(Packet::sequence_cmp(&packet(65535, &[]), &a), Ordering::Greater);
    }

    #[test]
    fn test_equality_includes_timestamp() {
        let a = packet(3, b"hi");
        let b = Packet::new(0, 0, 3, &b"hi"[..], UNIX_EPOCH + Duration::from_nanos(1));
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn test_acked_sequence() {
        let ack = Packet::new(PacketType::Ack.id(), 0, 9, vec![0x01, 0x02], UNIX_EPOCH);
        assert_eq!(ack.acked_sequence(), Some(0x0102));

        let short = Packet::new(PacketType::Ack.id(), 0, 9, vec![0x01], UNIX_EPOCH);
        assert_eq!(short.acked_sequence(), None);

        assert_eq!(packet(1, &[0, 1]).acked_sequence(), None);
    }
}
