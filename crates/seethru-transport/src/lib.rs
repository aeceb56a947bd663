use std::net::SocketAddr;

use async_trait::async_trait;
use seethru_core::{Message, TransportError};

pub mod memory;
pub mod net;
pub mod udp;

pub use memory::{memory_transport, MemoryPeer, MemoryTransport};
pub use net::{detect_local_ip, probe_session_port, SESSION_PORT_RANGE};
pub use udp::UdpTransport;

// MARK: - Transport trait

/// Datagram transport carrying one [`Message`] per packet.
///
/// Implementations:
/// - [`UdpTransport`]: real sockets, broadcast-capable
/// - [`MemoryTransport`]: in-process channels, used by protocol tests
#[async_trait]
pub trait Transport: Send + Sync {
    /// Encodes and sends `message` to `dest`. `dest` may be a broadcast address.
    async fn send_to(&self, message: &Message, dest: SocketAddr) -> Result<(), TransportError>;

    /// Waits for the next datagram on the listening port.
    ///
    /// Undecodable datagrams surface as [`TransportError::Malformed`]; the
    /// caller is expected to log them and keep receiving.
    async fn recv(&self) -> Result<(Message, SocketAddr), TransportError>;

    /// Port this transport listens on.
    fn listen_port(&self) -> u16;
}
