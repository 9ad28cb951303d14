//! Packet codec for encoding/decoding datagrams
//!
//! Encoding and decoding are pure: they depend on nothing but the packet or
//! the bytes handed in.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::time::SystemTime;
use thiserror::Error;

use super::{Packet, HEADER_SIZE};

/// Codec errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Malformed packet: {0} bytes is shorter than the 4-byte header")]
    Malformed(usize),

    #[error("Buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },

    #[error("Packets of type UNKNOWN cannot be constructed")]
    UnknownType,
}

pub type CodecResult<T> = Result<T, CodecError>;

/// Encode a packet into a freshly allocated buffer of exactly
/// `HEADER_SIZE + payload.len()` bytes.
pub fn encode(packet: &Packet) -> Bytes {
    let mut buf = BytesMut::with_capacity(packet.encoded_len());
    put_packet(packet, &mut buf);
    buf.freeze()
}

/// Encode a packet into the front of `dst`, returning the number of bytes
/// written. `dst` is left untouched on failure.
pub fn encode_into(packet: &Packet, dst: &mut [u8]) -> CodecResult<usize> {
    let needed = packet.encoded_len();
    if dst.len() < needed {
        return Err(CodecError::BufferTooSmall {
            needed,
            available: dst.len(),
        });
    }

    let mut window = &mut dst[..needed];
    put_packet(packet, &mut window);
    Ok(needed)
}

fn put_packet<B: BufMut>(packet: &Packet, buf: &mut B) {
    buf.put_u8(packet.type_id());
    buf.put_u8(packet.version());
    buf.put_u16(packet.sequence());
    buf.put_slice(packet.payload());
}

/// Decode one datagram. Every byte after the header is payload.
///
/// Type and version are taken verbatim; an unrecognized type byte is not an
/// error and resolves to [`super::PacketType::Unknown`] later.
pub fn decode(bytes: &[u8], timestamp: SystemTime) -> CodecResult<Packet> {
    if bytes.len() < HEADER_SIZE {
        return Err(CodecError::Malformed(bytes.len()));
    }

    let mut buf = bytes;
    let packet_type = buf.get_u8();
    let version = buf.get_u8();
    let sequence = buf.get_u16();
    let payload = Bytes::copy_from_slice(buf);

    Ok(Packet::new(packet_type, version, sequence, payload, timestamp))
}

/// Decode one datagram, stamping it with the current time
pub fn decode_now(bytes: &[u8]) -> CodecResult<Packet> {
    decode(bytes, SystemTime::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{PacketType, MAX_DATAGRAM_SIZE};
    use std::time::UNIX_EPOCH;

    #[test]
    fn test_encode_decode_roundtrip() {
        let original = Packet::new(0, 0, 0, vec![1, 2, 10, 30, 32], UNIX_EPOCH);

        let mut buf = [0u8; MAX_DATAGRAM_SIZE];
        let n = encode_into(&original, &mut buf).unwrap();

        let decoded = decode(&buf[..n], UNIX_EPOCH).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_wire_layout() {
        let packet = Packet::new(0x01, 0x07, 0xABCD, &b"ok"[..], UNIX_EPOCH);
        let bytes = encode(&packet);

        assert_eq!(bytes.len(), HEADER_SIZE + 2);
        assert_eq!(&bytes[..], &[0x01, 0x07, 0xAB, 0xCD, b'o', b'k']);
    }

    #[test]
    fn test_empty_payload() {
        let packet = Packet::new(0, 0, 42, Bytes::new(), UNIX_EPOCH);
        let bytes = encode(&packet);
        assert_eq!(bytes.len(), HEADER_SIZE);

        let decoded = decode(&bytes, UNIX_EPOCH).unwrap();
        assert!(decoded.payload().is_empty());
        assert_eq!(decoded.sequence(), 42);
    }

    #[test]
    fn test_decode_rejects_short_input() {
        for len in 0..HEADER_SIZE {
            let bytes = vec![0u8; len];
            assert_eq!(decode(&bytes, UNIX_EPOCH), Err(CodecError::Malformed(len)));
        }
    }

    #[test]
    fn test_decode_accepts_unrecognized_type() {
        let decoded = decode(&[0x7F, 0x03, 0x00, 0x01, 0xFF], UNIX_EPOCH).unwrap();
        assert_eq!(decoded.type_id(), 0x7F);
        assert_eq!(decoded.packet_type(), PacketType::Unknown);
        assert_eq!(decoded.version(), 3);
        assert_eq!(&decoded.payload()[..], &[0xFF]);
    }

    #[test]
    fn test_encode_into_too_small() {
        let packet = Packet::new(0, 0, 1, vec![9u8; 10], UNIX_EPOCH);
        let mut buf = [0xEEu8; 13];

        let err = encode_into(&packet, &mut buf).unwrap_err();
        assert_eq!(
            err,
            CodecError::BufferTooSmall {
                needed: 14,
                available: 13
            }
        );
        assert!(buf.iter().all(|b| *b == 0xEE));
    }

    #[test]
    fn test_encode_into_leaves_tail() {
        let packet = Packet::new(0, 0, 1, vec![9u8; 2], UNIX_EPOCH);
        let mut buf = [0xEEu8; 8];

        let n = encode_into(&packet, &mut buf).unwrap();
        assert_eq!(n, 6);
        assert_eq!(&buf[6..], &[0xEE, 0xEE]);
    }
}
