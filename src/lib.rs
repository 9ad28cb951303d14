//! udpchat - Minimal datagram chat transport
//!
//! The [`protocol`] module is the core: a fixed-layout packet format, a
//! sequence-numbering packet factory, a type-keyed dispatcher and ordered
//! packet sets. [`network`] wraps it in a UDP server and client.
//!
//! The library never installs a `tracing` subscriber; whoever embeds it
//! decides where log events go.

pub mod config;
pub mod network;
pub mod protocol;

pub use protocol::codec;
