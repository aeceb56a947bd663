//! In-process [`Transport`] backed by channels.
//!
//! The [`MemoryPeer`] half plays the remote side: it injects datagrams into
//! the transport's receive path and observes everything the transport sends.

use std::net::{Ipv4Addr, SocketAddr};

use async_trait::async_trait;
use seethru_core::{Message, TransportError};
use tokio::sync::{mpsc, Mutex};

use crate::Transport;

pub struct MemoryTransport {
    inbound: Mutex<mpsc::UnboundedReceiver<(Message, SocketAddr)>>,
    outbound: mpsc::UnboundedSender<(Message, SocketAddr)>,
    listen_port: u16,
}

pub struct MemoryPeer {
    inbound: mpsc::UnboundedSender<(Message, SocketAddr)>,
    outbound: mpsc::UnboundedReceiver<(Message, SocketAddr)>,
}

/// Creates a connected transport/peer pair.
pub fn memory_transport(listen_port: u16) -> (MemoryTransport, MemoryPeer) {
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    (
        MemoryTransport {
            inbound: Mutex::new(in_rx),
            outbound: out_tx,
            listen_port,
        },
        MemoryPeer { inbound: in_tx, outbound: out_rx },
    )
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send_to(&self, message: &Message, dest: SocketAddr) -> Result<(), TransportError> {
        self.outbound
            .send((message.clone(), dest))
            .map_err(|_| TransportError::SendFailed { dest: dest.to_string(), reason: "peer dropped".into() })
    }

    async fn recv(&self) -> Result<(Message, SocketAddr), TransportError> {
        self.inbound.lock().await.recv().await.ok_or(TransportError::Closed)
    }

    fn listen_port(&self) -> u16 {
        self.listen_port
    }
}

impl MemoryPeer {
    /// Delivers `message` as if it arrived from its own sender address.
    pub fn deliver(&self, message: Message) {
        let ip = message.sender().addr().unwrap_or(Ipv4Addr::UNSPECIFIED);
        // Receiver side is gone once the session stops; nothing to do then.
        let _ = self.inbound.send((message, SocketAddr::from((ip, 0))));
    }

    /// Next message the transport sent, with its destination.
    pub async fn next_sent(&mut self) -> Option<(Message, SocketAddr)> {
        self.outbound.recv().await
    }

    /// Sent message if one is already queued.
    pub fn try_next_sent(&mut self) -> Option<(Message, SocketAddr)> {
        self.outbound.try_recv().ok()
    }
}
