//! Server state machine and HELLO advertiser.
//!
//! ```text
//!   ──▶ NOTIFY ── REQUEST ──▶ REPLY ── valid ──▶ STREAM ── END / 3 × timeout ──▶ END
//!         ▲                     │                                                 │
//!         └───── invalid ───────┘◀────────────────────────────────────────────────┘
//! ```
//!
//! While STREAM is active the advertiser keeps broadcasting HELLO, but with
//! the busy sentinel as sender so listening clients skip this server.

use std::net::Ipv4Addr;
use std::sync::Arc;

use seethru_core::{check_alignment, Message, MessageType, PeerAddress, RelativeBearing, Resolution};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::collaborators::{DeviceGuard, SessionEventKind, StreamSource};
use crate::context::{SessionContext, Wake};
use crate::state::{ProtocolState, ServerState};

pub(crate) struct ServerMachine {
    ctx: Arc<SessionContext>,
    source: Arc<dyn StreamSource>,
    device: Arc<DeviceGuard>,
    session_port: u16,
    state: ServerState,
    client: Option<Ipv4Addr>,
    client_valid: bool,
    client_resolution: Resolution,
}

impl ServerMachine {
    pub(crate) fn new(
        ctx: Arc<SessionContext>,
        source: Arc<dyn StreamSource>,
        device: Arc<DeviceGuard>,
        session_port: u16,
    ) -> Self {
        Self {
            ctx,
            source,
            device,
            session_port,
            state: ServerState::Notify,
            client: None,
            client_valid: false,
            client_resolution: Resolution::default(),
        }
    }

    pub(crate) async fn run(mut self) {
        self.ctx.journal.record("Session starts");
        while !self.ctx.cancel.is_cancelled() {
            match self.state {
                ServerState::Notify => self.notify().await,
                ServerState::Reply => self.reply().await,
                ServerState::Stream => self.stream().await,
                ServerState::End => self.end(),
            }
        }
        self.ctx.journal.record("Session ends");
        info!("[server] State machine stopped");
    }

    fn transition(&mut self, to: ServerState) {
        info!("[server] {} → {}", self.state, to);
        self.state = to;
        self.ctx.publish(ProtocolState::Server(to));
    }

    // MARK: - NOTIFY

    async fn notify(&mut self) {
        loop {
            debug!("[server] Waiting <REQUEST>");
            match self.ctx.wait(None).await {
                Wake::Cancelled => return,
                Wake::Timeout => continue,
                Wake::Message(msg) if msg.kind() == MessageType::Request => {
                    let Some(client) = msg.sender().addr() else { continue };
                    info!("[server] <REQUEST> received from {} (max {})", client, msg.max_resolution());
                    self.ctx.journal.record(format!("<REQUEST> received from {client}"));

                    let own = self.ctx.own_vector();
                    let verdict = check_alignment(
                        own.as_ref(),
                        &msg.location(),
                        RelativeBearing::Behind,
                        &self.ctx.params,
                    );
                    if !verdict.is_valid() {
                        debug!("[server] Client {} rejected: {}", client, verdict);
                        self.ctx.journal.validation(verdict);
                        self.ctx.events.emit(SessionEventKind::PeerRejected {
                            peer: client,
                            reason: verdict.to_string(),
                        });
                    }

                    self.client = Some(client);
                    self.client_valid = verdict.is_valid();
                    self.client_resolution = msg.max_resolution();
                    self.transition(ServerState::Reply);
                    return;
                }
                Wake::Message(other) => debug!("[server] Ignoring {} in NOTIFY", other),
            }
        }
    }

    // MARK: - REPLY

    async fn reply(&mut self) {
        let Some(client) = self.client else {
            self.transition(ServerState::Notify);
            return;
        };
        let local_ip = self.ctx.local_ip;

        let reply = if self.client_valid {
            info!("[server] Valid client: {}", client);
            self.ctx.journal.record(format!("Valid client: {client}"));
            let reply = Message::ready(
                local_ip,
                self.ctx.tracker.vector_or_zero(),
                self.ctx.tracker.speed_kmh(),
                self.session_port,
            );
            self.ctx.queue.clear();
            self.source.adjust_quality(self.client_resolution);
            self.device.mute();
            self.transition(ServerState::Stream);
            reply
        } else {
            info!("[server] Invalid client: {}", client);
            self.ctx.journal.record(format!("Invalid client: {client}"));
            self.client = None;
            self.transition(ServerState::Notify);
            Message::reject(local_ip)
        };

        // Sent back-to-back; one copy surviving is enough.
        for _ in 0..self.ctx.timings.reply_copies {
            self.ctx.send(&reply, client, self.ctx.network.client_port).await;
        }
        self.ctx.journal.record(format!("Reply sent to {client}"));
    }

    // MARK: - STREAM

    async fn stream(&mut self) {
        let Some(client) = self.client else {
            self.transition(ServerState::End);
            return;
        };
        let budget = self.ctx.timings.retry_budget;

        self.ctx.events.emit(SessionEventKind::StreamingStarted { peer: client, port: self.session_port });
        self.ctx.journal.record(format!("Sending video stream to {client}"));

        let mut attempts = 1;
        self.send_data(client).await;
        loop {
            match self.ctx.wait(self.ctx.reply_timeout()).await {
                Wake::Cancelled => return,
                Wake::Timeout => {
                    debug!("[server] TIMEOUT waiting <DATA_ACK> or <END> from {}", client);
                    attempts += 1;
                    if attempts > budget {
                        break;
                    }
                    self.send_data(client).await;
                }
                Wake::Message(msg) if msg.is_from(client) => match msg.kind() {
                    MessageType::DataAck => {
                        debug!("[server] <DATA_ACK> received from {}", client);
                        attempts = 1;
                        if !self.ctx.pause(self.ctx.timings.stream_pacing()).await {
                            return;
                        }
                        self.send_data(client).await;
                    }
                    MessageType::End => {
                        info!("[server] <END> received from {}", client);
                        self.ctx.journal.record(format!("<END> received from {client}"));
                        break;
                    }
                    other => debug!("[server] Ignoring {} in STREAM", other),
                },
                Wake::Message(msg) => {
                    debug!("[server] Message from an unknown client: {}", msg.sender());
                    attempts += 1;
                    if attempts > budget {
                        break;
                    }
                    self.send_data(client).await;
                }
            }
        }

        self.transition(ServerState::End);
    }

    async fn send_data(&self, client: Ipv4Addr) {
        let data = Message::data(
            self.ctx.local_ip,
            self.ctx.tracker.vector_or_zero(),
            self.ctx.tracker.speed_kmh(),
        );
        self.ctx.send(&data, client, self.ctx.network.client_port).await;
    }

    // MARK: - END

    fn end(&mut self) {
        if let Some(client) = self.client.take() {
            info!("[server] Streaming session ended with {}", client);
            self.ctx.journal.record(format!("Streaming session ended with: {client}"));
            self.ctx.events.emit(SessionEventKind::StreamingStopped { peer: client });
        }
        self.ctx.queue.clear();
        self.device.restore();
        self.client_valid = false;
        self.client_resolution = Resolution::default();
        self.transition(ServerState::Notify);
    }
}

// MARK: - Advertiser

/// Broadcasts HELLO once per advertise interval until the session is cancelled.
pub(crate) async fn advertise(ctx: Arc<SessionContext>, state: watch::Receiver<ProtocolState>) {
    let dest_ip = ctx.network.broadcast_addr;
    let dest_port = ctx.network.client_port;
    let mut ticker = tokio::time::interval(ctx.timings.advertise_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("[server] Advertising on {}:{}", dest_ip, dest_port);
    loop {
        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let streaming = *state.borrow() == ProtocolState::Server(ServerState::Stream);
        let sender = if streaming { PeerAddress::Busy } else { PeerAddress::Addr(ctx.local_ip) };
        let hello = Message::hello(sender, ctx.tracker.vector_or_zero());
        ctx.send(&hello, dest_ip, dest_port).await;
    }
    debug!("[server] Advertiser stopped");
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use seethru_core::{PositionVector, CLIENT_PORT};
    use seethru_transport::{memory_transport, MemoryPeer};
    use tokio::time::Instant;

    use super::*;
    use crate::collaborators::StreamQuality;
    use crate::log::RecentLog;
    use crate::session::{RoleSetup, Session};
    use crate::testkit::*;

    struct Harness {
        session: Session,
        peer: MemoryPeer,
        source: Arc<RecordingSource>,
        device: Arc<CountingDevice>,
        log: Arc<RecentLog>,
    }

    fn start_server() -> Harness {
        let (transport, peer) = memory_transport(7777);
        let source = Arc::new(RecordingSource::default());
        let device = Arc::new(CountingDevice::default());
        let log = Arc::new(RecentLog::new());
        let mut opts = options(SERVER_IP, tracker_at(northbound(40.001)), log.clone());
        opts.device = device.clone();
        let session = Session::start_with_transport(
            Arc::new(transport),
            opts,
            RoleSetup::Server { source: source.clone() },
        )
        .unwrap();
        Harness { session, peer, source, device, log }
    }

    fn request_from(ip: Ipv4Addr, location: PositionVector) -> Message {
        Message::request(ip, location, Resolution::HD)
    }

    async fn wait_state(session: &Session, state: ServerState) {
        let mut rx = session.subscribe();
        rx.wait_for(|s| *s == ProtocolState::Server(state)).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn serves_default_quality_on_probed_port() {
        let h = start_server();
        let (port, quality) = h.source.serving.lock().unwrap().unwrap();
        assert!(seethru_transport::SESSION_PORT_RANGE.contains(&port));
        assert_eq!(quality, StreamQuality::default());
        assert_eq!(quality.resolution, Resolution::new(480, 320));
        assert_eq!(h.device.locks.load(Ordering::SeqCst), 1);
        h.session.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn degenerate_client_is_rejected() {
        let mut h = start_server();
        let parked = PositionVector::point(seethru_core::GeoPoint::new(-3.7, 40.0));
        h.peer.deliver(request_from(CLIENT_IP, parked));

        for _ in 0..3 {
            let (reject, dest) = next_of(&mut h.peer, MessageType::Reject).await;
            assert!(reject.is_from(SERVER_IP));
            assert_eq!(dest, SocketAddr::from((CLIENT_IP, CLIENT_PORT)));
        }
        assert_eq!(h.session.state(), ProtocolState::Server(ServerState::Notify));
        assert!(h.source.adjusted.lock().unwrap().is_empty());
        assert_eq!(h.log.count_containing("(VAL) One point vector"), 1);
        h.session.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn client_ahead_is_rejected() {
        let mut h = start_server();
        h.peer.deliver(request_from(CLIENT_IP, northbound(40.01)));
        next_of(&mut h.peer, MessageType::Reject).await;
        h.session.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn valid_client_gets_ready_and_paced_data() {
        let mut h = start_server();
        let (port, _) = h.source.serving.lock().unwrap().unwrap();
        h.peer.deliver(request_from(CLIENT_IP, northbound(40.0)));

        for _ in 0..3 {
            let (ready, _) = next_of(&mut h.peer, MessageType::Ready).await;
            assert_eq!(ready.session_port(), port);
            assert_eq!(ready.location(), northbound(40.001));
        }
        assert_eq!(*h.source.adjusted.lock().unwrap(), [Resolution::HD]);
        assert_eq!(h.device.mutes.load(Ordering::SeqCst), 1);

        let mut last = None;
        for _ in 0..4 {
            let (data, _) = next_of(&mut h.peer, MessageType::Data).await;
            assert!(data.is_from(SERVER_IP));
            let now = Instant::now();
            if let Some(prev) = last {
                assert!(now.duration_since(prev) >= Duration::from_millis(800));
            }
            last = Some(now);
            h.peer.deliver(Message::data_ack(CLIENT_IP));
        }

        h.peer.deliver(Message::end(CLIENT_IP));
        wait_state(&h.session, ServerState::Notify).await;
        assert_eq!(h.device.restores.load(Ordering::SeqCst), 1);
        h.session.stop().await;
        assert_eq!(h.device.restores.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_client_ends_stream_after_three_timeouts() {
        let mut h = start_server();
        h.peer.deliver(request_from(CLIENT_IP, northbound(40.0)));
        wait_state(&h.session, ServerState::Stream).await;
        let streaming_since = Instant::now();

        for _ in 0..3 {
            next_of(&mut h.peer, MessageType::Data).await;
        }
        wait_state(&h.session, ServerState::Notify).await;
        assert!(streaming_since.elapsed() >= Duration::from_millis(9_000));
        h.session.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn foreign_acks_resend_data_until_budget_runs_out() {
        let mut h = start_server();
        h.peer.deliver(request_from(CLIENT_IP, northbound(40.0)));
        next_of(&mut h.peer, MessageType::Data).await;

        for _ in 0..3 {
            h.peer.deliver(Message::data_ack(OTHER_IP));
        }
        wait_state(&h.session, ServerState::Notify).await;
        // First DATA plus one resend per foreign ack while the budget lasts.
        let resent = drain_sent(&mut h.peer).iter().filter(|k| **k == MessageType::Data).count();
        assert_eq!(resent, 2);
        h.session.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn hello_carries_busy_sentinel_while_streaming() {
        let mut h = start_server();
        let (hello, dest) = next_of(&mut h.peer, MessageType::Hello).await;
        assert_eq!(dest, SocketAddr::from((Ipv4Addr::BROADCAST, CLIENT_PORT)));
        assert!(hello.is_from(SERVER_IP));
        assert_eq!(hello.location(), northbound(40.001));

        h.peer.deliver(request_from(CLIENT_IP, northbound(40.0)));
        wait_state(&h.session, ServerState::Stream).await;
        let (busy, _) = next_of(&mut h.peer, MessageType::Hello).await;
        assert!(busy.sender().is_busy());
        h.session.stop().await;
    }

    #[tokio::test]
    async fn failing_source_aborts_start() {
        let (transport, _peer) = memory_transport(7777);
        let source = Arc::new(RecordingSource { fail: true, ..Default::default() });
        let device = Arc::new(CountingDevice::default());
        let mut opts = options(SERVER_IP, tracker_at(northbound(40.001)), Arc::new(RecentLog::new()));
        opts.device = device.clone();

        let result = Session::start_with_transport(Arc::new(transport), opts, RoleSetup::Server { source });
        assert!(result.is_err());
        assert_eq!(device.locks.load(Ordering::SeqCst), 0);
    }
}
