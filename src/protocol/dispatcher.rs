//! Packet dispatcher
//!
//! Routes decoded packets to handlers registered for their [`PacketType`].
//! Handlers run synchronously on the caller, in registration order.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use super::{Packet, PacketType};

type HandlerFn = dyn Fn(&Packet, SocketAddr) -> anyhow::Result<()> + Send + Sync + 'static;

/// A registered packet handler.
///
/// Cloning is cheap and clones compare equal, so the handle returned from
/// [`Dispatcher::register_fn`] can later be passed to
/// [`Dispatcher::unregister`].
#[derive(Clone)]
pub struct Handler {
    inner: Arc<HandlerFn>,
}

impl Handler {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Packet, SocketAddr) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self { inner: Arc::new(f) }
    }

    pub fn call(&self, packet: &Packet, sender: SocketAddr) -> anyhow::Result<()> {
        (self.inner)(packet, sender)
    }
}

impl PartialEq for Handler {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Handler {}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("ptr", &Arc::as_ptr(&self.inner).cast::<()>())
            .finish()
    }
}

/// Result of a single dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Type the packet resolved to
    pub packet_type: PacketType,
    /// Handlers invoked
    pub invoked: usize,
    /// Handlers that returned an error
    pub failed: usize,
}

/// Type-keyed handler registry
pub struct Dispatcher {
    /// One list per variant, indexed by [`PacketType::index`]
    handlers: [Vec<Handler>; PacketType::COUNT],
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    /// Create a dispatcher with no handlers
    pub fn new() -> Self {
        Self {
            handlers: std::array::from_fn(|_| Vec::new()),
        }
    }

    /// Create a dispatcher that logs every MESSAGE and ACK it sees
    pub fn with_logging_handlers() -> Self {
        let mut dispatcher = Self::new();
        dispatcher.register_fn(PacketType::Message, |packet, sender| {
            tracing::info!("Got a MESSAGE from {}: {}", sender, packet);
            Ok(())
        });
        dispatcher.register_fn(PacketType::Ack, |packet, sender| {
            tracing::info!("Got an ACK from {}: {}", sender, packet);
            Ok(())
        });
        dispatcher
    }

    /// Append a handler for `packet_type`. Duplicates are allowed and run
    /// once per registration.
    pub fn register(&mut self, packet_type: PacketType, handler: Handler) {
        self.handlers[packet_type.index()].push(handler);
    }

    /// Append several handlers, preserving their order
    pub fn register_all<I>(&mut self, packet_type: PacketType, handlers: I)
    where
        I: IntoIterator<Item = Handler>,
    {
        self.handlers[packet_type.index()].extend(handlers);
    }

    /// Wrap a closure in a [`Handler`], register it and return the handle
    pub fn register_fn<F>(&mut self, packet_type: PacketType, f: F) -> Handler
    where
        F: Fn(&Packet, SocketAddr) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let handler = Handler::new(f);
        self.register(packet_type, handler.clone());
        handler
    }

    /// Remove the first registration of `handler`. Returns whether one was found.
    pub fn unregister(&mut self, packet_type: PacketType, handler: &Handler) -> bool {
        let list = &mut self.handlers[packet_type.index()];
        match list.iter().position(|h| h == handler) {
            Some(pos) => {
                list.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Copy of the handlers registered for `packet_type`
    pub fn handlers(&self, packet_type: PacketType) -> Vec<Handler> {
        self.handlers[packet_type.index()].clone()
    }

    /// Run every handler registered for the packet's type.
    ///
    /// A failing handler is logged and skipped; the remaining handlers still run.
    pub fn dispatch(&self, packet: &Packet, sender: SocketAddr) -> DispatchOutcome {
        let packet_type = packet.packet_type();
        let mut outcome = DispatchOutcome {
            packet_type,
            invoked: 0,
            failed: 0,
        };

        for handler in &self.handlers[packet_type.index()] {
            outcome.invoked += 1;
            if let Err(e) = handler.call(packet, sender) {
                outcome.failed += 1;
                tracing::warn!(
                    "{} handler failed for packet {} from {}: {:#}",
                    packet_type,
                    packet.sequence(),
                    sender,
                    e
                );
            }
        }

        outcome
    }
}
