//! Client state machine.
//!
//! ```text
//!            ┌──────── REJECT / 3 × timeout ────────┐
//!            ▼                                      │
//!   ──▶ LISTEN ── window expired ──▶ REQUEST ── READY ──▶ PLAY ── END sent / 3 × timeout ──▶ END
//!         ▲                                                                                  │
//!         └──────────────────────────────────────────────────────────────────────────────────┘
//! ```

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use seethru_core::{
    check_alignment, still_behind, CandidateSet, Message, MessageType, PositionVector,
    RelativeBearing, Resolution,
};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::collaborators::{Player, SessionEventKind};
use crate::context::{SessionContext, Wake};
use crate::state::{ClientState, ProtocolState};

pub(crate) struct ClientMachine {
    ctx: Arc<SessionContext>,
    player: Arc<dyn Player>,
    max_resolution: Resolution,
    playing: Arc<AtomicBool>,
    state: ClientState,
    server: Option<Ipv4Addr>,
    session_port: u16,
}

impl ClientMachine {
    pub(crate) fn new(
        ctx: Arc<SessionContext>,
        player: Arc<dyn Player>,
        max_resolution: Resolution,
        playing: Arc<AtomicBool>,
    ) -> Self {
        Self {
            ctx,
            player,
            max_resolution,
            playing,
            state: ClientState::Listen,
            server: None,
            session_port: 0,
        }
    }

    pub(crate) async fn run(mut self) {
        self.ctx.journal.record("Session starts");
        while !self.ctx.cancel.is_cancelled() {
            match self.state {
                ClientState::Listen => self.listen().await,
                ClientState::Request => self.request().await,
                ClientState::Play => self.play().await,
                ClientState::End => self.end(),
            }
        }
        self.ctx.journal.record("Session ends");
        info!("[client] State machine stopped");
    }

    fn transition(&mut self, to: ClientState) {
        info!("[client] {} → {}", self.state, to);
        self.state = to;
        self.ctx.publish(ProtocolState::Client(to));
    }

    // MARK: - LISTEN

    async fn listen(&mut self) {
        let window = self.ctx.timings.collection_window();
        let mut candidates = CandidateSet::new();
        let mut deadline: Option<Instant> = None;

        loop {
            debug!("[client] Waiting <HELLO>");
            let wake = match deadline {
                None => self.ctx.wait(None).await,
                Some(deadline) => {
                    let left = deadline.saturating_duration_since(Instant::now());
                    if left.is_zero() {
                        Wake::Timeout
                    } else {
                        self.ctx.wait(Some(left)).await
                    }
                }
            };

            match wake {
                Wake::Cancelled => return,
                Wake::Timeout => {
                    let own = self.ctx.own_vector().map(|v| v.b);
                    if let Some(server) = candidates.select_nearest(own) {
                        info!("[client] Selected the best server: {} ({} candidates)", server, candidates.len());
                        self.ctx.journal.record(format!("Selected the best server: {server}"));
                        self.ctx.events.emit(SessionEventKind::PeerSelected(server));
                        self.server = Some(server);
                        self.ctx.queue.clear();
                        self.transition(ClientState::Request);
                        return;
                    }
                }
                Wake::Message(msg) if msg.kind() == MessageType::Hello => {
                    // The receive filter already drops busy servers.
                    let Some(server) = msg.sender().addr() else { continue };
                    debug!("[client] <HELLO> received from {}", server);
                    self.ctx.journal.record(format!("<HELLO> received from {server}"));

                    if self.is_valid_server(server, &msg.location()) {
                        self.ctx.journal.record(format!("Valid server: {server}"));
                        candidates.upsert(server, msg.location());
                        deadline.get_or_insert_with(|| Instant::now() + window);
                    } else {
                        self.ctx.journal.record(format!("Invalid server: {server}"));
                    }
                }
                Wake::Message(other) => debug!("[client] Ignoring {} in LISTEN", other),
            }
        }
    }

    fn is_valid_server(&self, server: Ipv4Addr, location: &PositionVector) -> bool {
        let own = self.ctx.own_vector();
        let verdict = check_alignment(own.as_ref(), location, RelativeBearing::Ahead, &self.ctx.params);
        if !verdict.is_valid() {
            debug!("[client] Server {} rejected: {}", server, verdict);
            self.ctx.journal.validation(verdict);
            self.ctx.events.emit(SessionEventKind::PeerRejected { peer: server, reason: verdict.to_string() });
        }
        verdict.is_valid()
    }

    // MARK: - REQUEST

    async fn request(&mut self) {
        let Some(server) = self.server else {
            self.transition(ClientState::Listen);
            return;
        };
        let budget = self.ctx.timings.retry_budget;
        let mut attempts = 1;

        self.send_request(server).await;
        loop {
            match self.ctx.wait(self.ctx.reply_timeout()).await {
                Wake::Cancelled => return,
                Wake::Timeout => {
                    debug!("[client] TIMEOUT waiting <READY> or <REJECT> from {}", server);
                    self.ctx.journal.record("TIMEOUT waiting <READY> or <REJECT>");
                    attempts += 1;
                    if attempts > budget {
                        break;
                    }
                    self.send_request(server).await;
                }
                Wake::Message(msg) if msg.is_from(server) => match msg.kind() {
                    MessageType::Ready => {
                        info!("[client] <READY> received from {} (port {})", server, msg.session_port());
                        self.ctx.journal.record(format!("<READY> received from {server}"));
                        self.ctx.queue.clear();
                        self.session_port = msg.session_port();
                        self.transition(ClientState::Play);
                        return;
                    }
                    MessageType::Reject => {
                        info!("[client] <REJECT> received from {}", server);
                        self.ctx.journal.record(format!("<REJECT> received from {server}"));
                        self.ctx.queue.clear();
                        break;
                    }
                    other => debug!("[client] Ignoring {} in REQUEST", other),
                },
                Wake::Message(msg) => {
                    debug!("[client] Message from an unknown server: {}", msg.sender());
                    attempts += 1;
                    if attempts > budget {
                        break;
                    }
                }
            }
        }

        self.server = None;
        self.transition(ClientState::Listen);
    }

    async fn send_request(&self, server: Ipv4Addr) {
        let request = Message::request(
            self.ctx.local_ip,
            self.ctx.tracker.vector_or_zero(),
            self.max_resolution,
        );
        self.ctx.send(&request, server, self.ctx.network.server_port).await;
        self.ctx.journal.record(format!("<REQUEST> sent to {server}"));
    }

    // MARK: - PLAY

    async fn play(&mut self) {
        let Some(server) = self.server else {
            self.transition(ClientState::End);
            return;
        };
        let budget = self.ctx.timings.retry_budget;
        let server_port = self.ctx.network.server_port;

        self.player.start_streaming(server, self.session_port);
        self.playing.store(true, Ordering::SeqCst);
        self.ctx.events.emit(SessionEventKind::StreamingStarted { peer: server, port: self.session_port });
        self.ctx.journal.record(format!("Receiving video stream from {server}"));

        let mut attempts = 1;
        loop {
            match self.ctx.wait(self.ctx.reply_timeout()).await {
                Wake::Cancelled => return,
                Wake::Timeout => {
                    debug!("[client] TIMEOUT waiting <DATA> from {}", server);
                    attempts += 1;
                    if attempts > budget {
                        break;
                    }
                    // Keep-alive probe in case our last DATA_ACK was lost.
                    self.ctx.send(&Message::data_ack(self.ctx.local_ip), server, server_port).await;
                }
                Wake::Message(msg) if msg.is_from(server) && msg.kind() == MessageType::Data => {
                    debug!("[client] <DATA> received from {} ({:.1} km/h)", server, msg.speed());
                    self.player.update_speed(msg.speed());
                    attempts = 1;

                    if self.is_streaming_useful(&msg.location()) {
                        self.ctx.send(&Message::data_ack(self.ctx.local_ip), server, server_port).await;
                    } else {
                        info!("[client] Streaming from {} no longer useful, sending <END>", server);
                        self.ctx.send(&Message::end(self.ctx.local_ip), server, server_port).await;
                        break;
                    }
                }
                Wake::Message(msg) => {
                    debug!("[client] Message from an unknown server: {}", msg.sender());
                    attempts += 1;
                    if attempts > budget {
                        break;
                    }
                }
            }
        }

        self.transition(ClientState::End);
    }

    fn is_streaming_useful(&self, server_location: &PositionVector) -> bool {
        if !self.playing.load(Ordering::SeqCst) {
            return false;
        }
        let own = self.ctx.own_vector();
        still_behind(own.as_ref(), server_location, &self.ctx.params)
    }

    // MARK: - END

    fn end(&mut self) {
        let peer = self.server.take();
        if let Some(server) = peer {
            info!("[client] Streaming session ended with {}", server);
            self.ctx.journal.record(format!("Streaming session ended with: {server}"));
        }

        self.player.stop_streaming();
        self.ctx.queue.clear();
        self.playing.store(false, Ordering::SeqCst);
        self.session_port = 0;
        if let Some(server) = peer {
            self.ctx.events.emit(SessionEventKind::StreamingStopped { peer: server });
        }
        self.transition(ClientState::Listen);
    }
}
