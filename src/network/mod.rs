//! Network module - UDP plumbing around the protocol core
//!
//! Provides:
//! - Server that receives datagrams, dispatches them and replies with ACKs
//! - Client that sends chat messages and waits for a reply
//! - The shared, timestamp-ordered transcript both of them write to

mod server;
mod client;

pub use server::*;
pub use client::*;

use std::net::{IpAddr, SocketAddr};

use crate::protocol::{SharedPacketSet, TimestampOrdered};

/// Transcript shared by every endpoint in a session
pub type SharedLog = SharedPacketSet<crate::protocol::ByTimestamp>;

/// Create an empty shared transcript
pub fn shared_log() -> SharedLog {
    TimestampOrdered::shared()
}

/// Resolve a hostname to a socket address.
///
/// `host` may be a name, an IP literal (IPv6 without brackets included) or
/// `host:port`, in which case its own port wins over `port`.
pub async fn resolve_host(host: &str, port: u16) -> std::io::Result<SocketAddr> {
    use tokio::net::lookup_host;

    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }

    let addr_string = if host.contains(':') {
        host.to_string()
    } else {
        format!("{}:{}", host, port)
    };
    let mut addrs = lookup_host(&addr_string).await?;

    addrs.next().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Could not resolve host: {}", host),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[tokio::test]
    async fn test_resolve_ip_literals() {
        let v6 = resolve_host("::1", 4000).await.unwrap();
        assert_eq!(v6, SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), 4000));

        let v4 = resolve_host("127.0.0.1", 4000).await.unwrap();
        assert_eq!(v4, SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 4000));
    }

    #[tokio::test]
    async fn test_resolve_host_with_port() {
        let addr = resolve_host("127.0.0.1:5000", 4000).await.unwrap();
        assert_eq!(addr.port(), 5000);

        let addr = resolve_host("[::1]:5000", 4000).await.unwrap();
        assert_eq!(addr, SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), 5000));
    }
}
