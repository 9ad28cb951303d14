//! udpchat Client
//!
//! Sends chat messages to a server and waits for one reply per message.
//! There is no retransmission: a message whose reply never arrives is simply
//! reported as unanswered.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::net::UdpSocket;

use super::server::lock;
use super::SharedLog;
use crate::config::NetworkConfig;
use crate::protocol::{
    codec, CodecError, Dispatcher, Packet, PacketFactory, PacketType, SequenceOrdered, HEADER_SIZE,
};

/// Client errors
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Short send: wrote {sent} of {len} bytes")]
    ShortSend { sent: usize, len: usize },
}

pub type ClientResult<T> = Result<T, ClientError>;

/// Chat client talking to a single server
pub struct Client {
    config: NetworkConfig,
    server_addr: SocketAddr,
    socket: UdpSocket,
    factory: PacketFactory,
    /// One byte longer than `max_datagram_size` to detect oversized replies
    buf: Vec<u8>,
    /// Handlers run for every packet before it is sent
    sent_events: Dispatcher,
    /// Handlers run for every reply received
    received_events: Dispatcher,
    sent: Arc<Mutex<SequenceOrdered>>,
    all_messages: SharedLog,
}

impl Client {
    /// Create a client bound to an ephemeral local port
    pub async fn new(
        config: NetworkConfig,
        version: u8,
        server_addr: SocketAddr,
        all_messages: SharedLog,
    ) -> ClientResult<Self> {
        let wildcard = if server_addr.is_ipv6() {
            IpAddr::V6(Ipv6Addr::UNSPECIFIED)
        } else {
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        };
        let socket = UdpSocket::bind(SocketAddr::new(wildcard, 0)).await?;
        tracing::debug!("Client bound to {}", socket.local_addr()?);

        let sent = Arc::new(Mutex::new(SequenceOrdered::new()));

        let mut sent_events = Dispatcher::new();
        {
            let sent = sent.clone();
            sent_events.register_fn(PacketType::Message, move |packet, _| {
                lock(&sent)?.insert(packet.clone());
                Ok(())
            });
        }
        {
            let all_messages = all_messages.clone();
            sent_events.register_fn(PacketType::Message, move |packet, _| {
                lock(&all_messages)?.insert(packet.clone());
                Ok(())
            });
        }

        Ok(Self {
            buf: vec![0u8; config.max_datagram_size + 1],
            config,
            server_addr,
            socket,
            factory: PacketFactory::with_version(version),
            sent_events,
            received_events: Dispatcher::with_logging_handlers(),
            sent,
            all_messages,
        })
    }

    /// Replace the local socket with one bound to `local_addr`
    pub async fn rebind(&mut self, local_addr: SocketAddr) -> ClientResult<()> {
        self.socket = UdpSocket::bind(local_addr).await?;
        tracing::info!("Client rebound to {}", self.socket.local_addr()?);
        Ok(())
    }

    pub fn local_addr(&self) -> ClientResult<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.server_addr
    }

    /// Messages sent by this client, ordered by sequence
    pub fn sent(&self) -> Arc<Mutex<SequenceOrdered>> {
        self.sent.clone()
    }

    /// The transcript shared with other endpoints
    pub fn all_messages(&self) -> SharedLog {
        self.all_messages.clone()
    }

    /// Dispatcher for replies, to register extra handlers
    pub fn received_events(&mut self) -> &mut Dispatcher {
        &mut self.received_events
    }

    /// Send one chat message and wait for the reply.
    ///
    /// Returns `Ok(None)` when no reply arrived within the configured timeout.
    /// A reply that fails to decode is logged and treated the same way.
    pub async fn send_message(&mut self, text: &str) -> ClientResult<Option<Packet>> {
        let max = self.config.max_datagram_size;
        let needed = HEADER_SIZE + text.len();
        if needed > max {
            // Rejected before the factory hands out a sequence number
            return Err(CodecError::BufferTooSmall { needed, available: max }.into());
        }

        let packet = self
            .factory
            .create_with_payload(PacketType::Message, text.as_bytes())?;
        tracing::info!("Finished crafting packet: {}", packet);

        let len = codec::encode_into(&packet, &mut self.buf[..max])?;

        tracing::info!("Sending packet: {}", packet);
        self.sent_events.dispatch(&packet, self.server_addr);
        let sent = self.socket.send_to(&self.buf[..len], self.server_addr).await?;
        if sent != len {
            return Err(ClientError::ShortSend { sent, len });
        }
        tracing::debug!("Sent packet {} to {}", packet.sequence(), self.server_addr);

        self.recv_reply().await
    }

    /// Wait for the first datagram from the server. Datagrams from any other
    /// address are ignored and do not extend the deadline.
    async fn recv_reply(&mut self) -> ClientResult<Option<Packet>> {
        let timeout = self.config.reply_timeout();
        let deadline = tokio::time::Instant::now() + timeout;
        let max = self.config.max_datagram_size;

        loop {
            let received = tokio::time::timeout_at(deadline, self.socket.recv_from(&mut self.buf)).await;
            let (n, from) = match received {
                Ok(result) => result?,
                Err(_) => {
                    tracing::warn!("No reply from {} within {:?}", self.server_addr, timeout);
                    return Ok(None);
                }
            };

            if from != self.server_addr {
                tracing::debug!("Ignoring datagram from {}, expecting {}", from, self.server_addr);
                continue;
            }
            if n > max {
                tracing::warn!("Dropping reply from {}: larger than {} bytes", from, max);
                continue;
            }

            return match codec::decode_now(&self.buf[..n]) {
                Ok(reply) => {
                    tracing::info!("Got packet: {}", reply);
                    self.received_events.dispatch(&reply, from);
                    Ok(Some(reply))
                }
                Err(e) => {
                    tracing::warn!("Dropping reply from {}: {}", from, e);
                    Ok(None)
                }
            };
        }
    }
}
