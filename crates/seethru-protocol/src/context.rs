use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use seethru_core::{
    LocationTracker, Message, NetworkConfig, PositionVector, ProtocolTimings, ValidationParams,
};
use seethru_transport::Transport;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::collaborators::{EventSink, SessionEventKind};
use crate::log::Journal;
use crate::queue::HandoffQueue;
use crate::state::ProtocolState;

/// Outcome of waiting on the queue.
#[derive(Debug)]
pub(crate) enum Wake {
    Message(Message),
    Timeout,
    Cancelled,
}

/// Everything the session tasks share.
pub(crate) struct SessionContext {
    pub local_ip: Ipv4Addr,
    pub network: NetworkConfig,
    pub timings: ProtocolTimings,
    pub params: ValidationParams,
    pub transport: Arc<dyn Transport>,
    pub queue: Arc<HandoffQueue>,
    pub tracker: Arc<LocationTracker>,
    pub cancel: CancellationToken,
    pub state: watch::Sender<ProtocolState>,
    pub journal: Journal,
    pub events: EventSink,
}

impl SessionContext {
    /// Takes the next queued message; `None` waits without limit.
    pub async fn wait(&self, timeout: Option<Duration>) -> Wake {
        let take = self.queue.take(timeout.unwrap_or(Duration::ZERO));
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Wake::Cancelled,
            message = take => match message {
                Some(m) => Wake::Message(m),
                None => Wake::Timeout,
            },
        }
    }

    /// Sleeps for `duration`; `false` if the session was cancelled meanwhile.
    pub async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    /// Sends `message` to `peer:port`. Failures are logged and swallowed.
    pub async fn send(&self, message: &Message, peer: Ipv4Addr, port: u16) {
        let dest = SocketAddr::from((peer, port));
        match self.transport.send_to(message, dest).await {
            Ok(()) => debug!("{} sent to {}", message.kind(), dest),
            Err(e) => warn!("Failed to send {} to {}: {}", message.kind(), dest, e),
        }
    }

    /// Publishes `state` to the receive filter and to event listeners.
    pub fn publish(&self, state: ProtocolState) {
        self.state.send_replace(state);
        self.events.emit(SessionEventKind::StateChanged(state));
    }

    pub fn own_vector(&self) -> Option<PositionVector> {
        self.tracker.vector()
    }

    pub fn reply_timeout(&self) -> Option<Duration> {
        Some(self.timings.reply_timeout())
    }
}
