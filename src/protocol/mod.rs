//! Protocol module - Defines the datagram wire protocol for udpchat
//!
//! Every datagram carries exactly one packet:
//! - 1 byte packet type
//! - 1 byte protocol version
//! - 2 bytes sequence number (big-endian)
//! - Payload (all remaining bytes, no length field)

mod packet;
pub mod codec;
mod factory;
mod dispatcher;
mod collection;

pub use packet::*;
pub use codec::{CodecError, CodecResult};
pub use factory::*;
pub use dispatcher::*;
pub use collection::*;

/// Protocol version stamped by a default factory
pub const PROTOCOL_VERSION: u8 = 0;

/// Default port for the chat server
pub const DEFAULT_PORT: u16 = 65434;

/// Header size: type(1) + version(1) + sequence(2) = 4 bytes
pub const HEADER_SIZE: usize = 4;

/// Conventional maximum datagram size, header included
pub const MAX_DATAGRAM_SIZE: usize = 2048;

/// Largest payload that fits a conventional datagram
pub const MAX_PAYLOAD_SIZE: usize = MAX_DATAGRAM_SIZE - HEADER_SIZE;
