//! UDP implementation of [`Transport`].
//!
//! Two sockets per transport:
//!
//! ```text
//!   rx  0.0.0.0:<listen_port>   bound for the whole session, receives everything
//!   tx  0.0.0.0:0               SO_BROADCAST enabled, used for unicast and HELLO
//! ```
//!
//! Both are closed when the transport is dropped, which also ends any pending
//! `recv()`.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use async_trait::async_trait;
use seethru_core::{Message, MessageError, TransportError, MAX_DATAGRAM_BYTES};
use tokio::net::UdpSocket;
use tracing::{debug, info};

use crate::Transport;

pub struct UdpTransport {
    rx: UdpSocket,
    tx: UdpSocket,
    listen_port: u16,
}

impl UdpTransport {
    /// Binds the receive socket on `listen_port` (all interfaces) and an
    /// ephemeral broadcast-enabled send socket.
    pub async fn bind(listen_port: u16) -> Result<Self, TransportError> {
        let rx_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, listen_port);
        let rx = UdpSocket::bind(rx_addr)
            .await
            .map_err(|source| TransportError::Bind { addr: rx_addr.to_string(), source })?;

        let tx_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0);
        let tx = UdpSocket::bind(tx_addr)
            .await
            .map_err(|source| TransportError::Bind { addr: tx_addr.to_string(), source })?;
        tx.set_broadcast(true)
            .map_err(|source| TransportError::Bind { addr: tx_addr.to_string(), source })?;

        // Report the real port when the caller asked for an ephemeral one.
        let listen_port = rx.local_addr().map(|a| a.port()).unwrap_or(listen_port);
        info!("[udp] Listening on 0.0.0.0:{}", listen_port);

        Ok(Self { rx, tx, listen_port })
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send_to(&self, message: &Message, dest: SocketAddr) -> Result<(), TransportError> {
        let payload = message.encode().map_err(|e| TransportError::SendFailed {
            dest: dest.to_string(),
            reason: e.to_string(),
        })?;
        self.tx
            .send_to(&payload, dest)
            .await
            .map_err(|e| TransportError::SendFailed { dest: dest.to_string(), reason: e.to_string() })?;
        debug!("[udp] Sent {} to {} ({} bytes)", message.kind(), dest, payload.len());
        Ok(())
    }

    async fn recv(&self) -> Result<(Message, SocketAddr), TransportError> {
        // One spare byte so an oversize datagram is detectable instead of silently truncated.
        let mut buf = [0u8; MAX_DATAGRAM_BYTES + 1];
        let (len, from) = self
            .rx
            .recv_from(&mut buf)
            .await
            .map_err(|e| TransportError::ReceiveFailed { reason: e.to_string() })?;

        if len > MAX_DATAGRAM_BYTES {
            return Err(TransportError::Malformed {
                from: from.to_string(),
                source: MessageError::Oversize { len, max: MAX_DATAGRAM_BYTES },
            });
        }
        let message = Message::decode(&buf[..len])
            .map_err(|source| TransportError::Malformed { from: from.to_string(), source })?;
        Ok((message, from))
    }

    fn listen_port(&self) -> u16 {
        self.listen_port
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seethru_core::PositionVector;

    fn loopback(port: u16) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::LOCALHOST, port))
    }

    #[tokio::test]
    async fn loopback_delivers_messages() {
        let a = UdpTransport::bind(0).await.unwrap();
        let b = UdpTransport::bind(0).await.unwrap();
        assert_ne!(b.listen_port(), 0);

        let msg = Message::data(Ipv4Addr::new(10, 0, 0, 1), PositionVector::default(), 42.0);
        a.send_to(&msg, loopback(b.listen_port())).await.unwrap();

        let (got, _) = b.recv().await.unwrap();
        assert_eq!(got, msg);
    }

    #[tokio::test]
    async fn garbage_is_reported_as_malformed() {
        let t = UdpTransport::bind(0).await.unwrap();
        let raw = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        raw.send_to(b"not json", loopback(t.listen_port())).await.unwrap();

        assert!(matches!(t.recv().await, Err(TransportError::Malformed { .. })));
    }

    #[tokio::test]
    async fn oversize_datagram_is_rejected() {
        let t = UdpTransport::bind(0).await.unwrap();
        let raw = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        raw.send_to(&vec![b' '; MAX_DATAGRAM_BYTES + 100], loopback(t.listen_port()))
            .await
            .unwrap();

        match t.recv().await {
            Err(TransportError::Malformed { source: MessageError::Oversize { .. }, .. }) => {}
            other => panic!("expected oversize error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn busy_port_fails_to_bind() {
        let first = UdpTransport::bind(0).await.unwrap();
        let second = UdpTransport::bind(first.listen_port()).await;
        assert!(matches!(second, Err(TransportError::Bind { .. })));
    }
}
