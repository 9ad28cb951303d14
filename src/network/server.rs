//! udpchat Server
//!
//! Receives chat datagrams, records them and answers each MESSAGE with an
//! ACK carrying its sequence number.

use bytes::Bytes;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use super::SharedLog;
use crate::config::NetworkConfig;
use crate::protocol::{
    codec, Dispatcher, Handler, PacketFactory, PacketType, SequenceOrdered,
};

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bind failed: {0}")]
    BindFailed(String),
}

pub type ServerResult<T> = Result<T, ServerError>;

/// A datagram waiting to be sent
#[derive(Debug, Clone)]
struct Outgoing {
    bytes: Bytes,
    dest: SocketAddr,
}

/// Chat server bound to one UDP socket
pub struct Server {
    socket: UdpSocket,
    local_addr: SocketAddr,
    max_datagram_size: usize,
    dispatcher: Dispatcher,
    received: Arc<Mutex<SequenceOrdered>>,
    all_messages: SharedLog,
    reply_rx: mpsc::UnboundedReceiver<Outgoing>,
}

impl Server {
    /// Bind the server socket and register the default MESSAGE handlers.
    pub async fn bind(config: &NetworkConfig, version: u8, all_messages: SharedLog) -> ServerResult<Self> {
        let bind_addr = config.listen_addr();
        let socket = UdpSocket::bind(bind_addr).await.map_err(|e| {
            ServerError::BindFailed(format!("Failed to bind to {}: {}", bind_addr, e))
        })?;

        let local_addr = socket.local_addr()?;
        tracing::info!("Server listening on {}", local_addr);

        let received = Arc::new(Mutex::new(SequenceOrdered::new()));
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();

        let mut dispatcher = Dispatcher::with_logging_handlers();
        {
            let received = received.clone();
            dispatcher.register_fn(PacketType::Message, move |packet, _| {
                lock(&received)?.insert(packet.clone());
                Ok(())
            });
        }
        {
            let all_messages = all_messages.clone();
            dispatcher.register_fn(PacketType::Message, move |packet, _| {
                lock(&all_messages)?.insert(packet.clone());
                Ok(())
            });
        }
        {
            let factory = Mutex::new(PacketFactory::with_version(version));
            dispatcher.register_fn(PacketType::Message, move |packet, sender| {
                let ack = lock(&factory)?.create_with_payload(
                    PacketType::Ack,
                    &packet.sequence().to_be_bytes(),
                )?;
                tracing::info!("Sending ACK to {}: {}", sender, ack);
                reply_tx.send(Outgoing {
                    bytes: codec::encode(&ack),
                    dest: sender,
                })?;
                Ok(())
            });
        }

        Ok(Self {
            socket,
            local_addr,
            max_datagram_size: config.max_datagram_size,
            dispatcher,
            received,
            all_messages,
            reply_rx,
        })
    }

    /// Address the socket is actually bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Messages this server received, ordered by sequence
    pub fn received(&self) -> Arc<Mutex<SequenceOrdered>> {
        self.received.clone()
    }

    /// The transcript shared with other endpoints
    pub fn all_messages(&self) -> SharedLog {
        self.all_messages.clone()
    }

    /// Add a handler after the defaults
    pub fn register(&mut self, packet_type: PacketType, handler: Handler) {
        self.dispatcher.register(packet_type, handler);
    }

    /// Serve until `shutdown` resolves.
    ///
    /// A datagram that fails to decode or exceeds `max_datagram_size` is
    /// logged and dropped. Errors tied to a single peer are logged too; only
    /// other socket errors end the loop.
    pub async fn run<F>(mut self, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()>,
    {
        // One spare byte so an oversized datagram is detected instead of cut
        let mut buf = vec![0u8; self.max_datagram_size + 1];
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buf) => {
                    let (n, addr) = match result {
                        Ok(received) => received,
                        Err(e) if is_peer_error(&e) => {
                            tracing::warn!("Ignoring receive error caused by a peer: {}", e);
                            continue;
                        }
                        Err(e) => return Err(e.into()),
                    };
                    if n > self.max_datagram_size {
                        tracing::warn!(
                            "Dropping datagram from {}: larger than {} bytes",
                            addr,
                            self.max_datagram_size
                        );
                        continue;
                    }
                    tracing::debug!("Got a datagram of {} bytes from {}", n, addr);
                    self.handle_datagram(&buf[..n], addr);
                    self.flush_replies().await;
                }
                _ = &mut shutdown => {
                    tracing::info!("Server shutdown requested");
                    break;
                }
            }
        }

        tracing::info!("Server on {} stopped", self.local_addr);
        Ok(())
    }

    fn handle_datagram(&self, bytes: &[u8], addr: SocketAddr) {
        match codec::decode_now(bytes) {
            Ok(packet) => {
                let outcome = self.dispatcher.dispatch(&packet, addr);
                if outcome.failed > 0 {
                    tracing::warn!(
                        "{} of {} handlers failed for packet from {}",
                        outcome.failed,
                        outcome.invoked,
                        addr
                    );
                }
            }
            Err(e) => {
                tracing::warn!("Dropping datagram from {}: {}", addr, e);
            }
        }
    }

    /// Send every queued reply. A failed send is logged and skipped.
    async fn flush_replies(&mut self) -> usize {
        let mut failed = 0;
        while let Ok(reply) = self.reply_rx.try_recv() {
            match self.socket.send_to(&reply.bytes, reply.dest).await {
                Ok(_) => tracing::info!("Finished serving {}", reply.dest),
                Err(e) => {
                    tracing::error!("Failed to send reply to {}: {}", reply.dest, e);
                    failed += 1;
                }
            }
        }
        failed
    }
}

/// Receive errors reported for an earlier send to one peer, such as an ICMP
/// port unreachable surfacing on Windows.
fn is_peer_error(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::ConnectionRefused
    )
}

/// Lock a mutex shared with handlers, surfacing poisoning as a handler error
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> anyhow::Result<std::sync::MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| anyhow::anyhow!("Synchronization primitive poisoned"))
}
