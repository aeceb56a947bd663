//! Session runtime: spawns and tears down the per-session tasks.
//!
//! ```text
//!                       ┌──────────────┐  watch<ProtocolState>
//!  Transport ──recv──▶  │ receive task │ ◀───────────────────────┐
//!                       └──────┬───────┘                         │
//!          filter: not self, state accepts type, (client) dedup  │
//!                              ▼                                 │
//!                        HandoffQueue ──take──▶ state machine ───┘
//!                                                     │
//!                                        send_to ◀────┘   (+ advertiser, server only)
//! ```
//!
//! Every task holds the session's `CancellationToken`; [`Session::stop`]
//! cancels it, joins the tasks (dropping the transport with them) and then
//! releases whatever the session acquired on the platform side.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use seethru_core::{
    LocationTracker, MessageType, NetworkConfig, ProtocolTimings, Resolution, Role, SeethruError,
    SettingsReader, TransportError, ValidationParams,
};
use seethru_transport::{detect_local_ip, probe_session_port, Transport, UdpTransport};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::client::ClientMachine;
use crate::collaborators::{
    DeviceControls, DeviceGuard, EventSink, Player, SessionEvent, SessionEventKind, StreamQuality,
    StreamSource,
};
use crate::context::SessionContext;
use crate::log::{Journal, SessionLog};
use crate::queue::HandoffQueue;
use crate::server::{advertise, ServerMachine};
use crate::state::{ClientState, ProtocolState, ServerState};

// MARK: - Options

/// Collaborators and configuration shared by both roles.
pub struct SessionOptions {
    pub network: NetworkConfig,
    pub timings: ProtocolTimings,
    pub settings: Arc<dyn SettingsReader>,
    pub location: Arc<LocationTracker>,
    pub log: Arc<dyn SessionLog>,
    pub device: Arc<dyn DeviceControls>,
    pub events: Option<mpsc::Sender<SessionEvent>>,
}

/// Role-specific collaborators.
pub enum RoleSetup {
    Client {
        player: Arc<dyn Player>,
        /// Device screen; the advertised maximum resolution is derived from it.
        screen: Resolution,
    },
    Server {
        source: Arc<dyn StreamSource>,
    },
}

impl RoleSetup {
    pub fn role(&self) -> Role {
        match self {
            Self::Client { .. } => Role::Client,
            Self::Server { .. } => Role::Server,
        }
    }
}

enum Teardown {
    Client { player: Arc<dyn Player>, playing: Arc<AtomicBool> },
    Server { source: Arc<dyn StreamSource> },
}

// MARK: - Session

/// A running hand-off session in one role.
pub struct Session {
    id: Uuid,
    role: Role,
    local_ip: Ipv4Addr,
    cancel: CancellationToken,
    state: watch::Receiver<ProtocolState>,
    queue: Arc<HandoffQueue>,
    device: Arc<DeviceGuard>,
    events: EventSink,
    teardown: Teardown,
    tasks: Vec<JoinHandle<()>>,
}

impl Session {
    /// Binds the role's well-known UDP port and starts the session.
    pub async fn start(options: SessionOptions, setup: RoleSetup) -> Result<Self, SeethruError> {
        let port = match setup.role() {
            Role::Client => options.network.client_port,
            Role::Server => options.network.server_port,
        };
        let transport = UdpTransport::bind(port).await?;
        Self::start_with_transport(Arc::new(transport), options, setup)
    }

    /// Starts the session on an already-bound transport.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start_with_transport(
        transport: Arc<dyn Transport>,
        options: SessionOptions,
        setup: RoleSetup,
    ) -> Result<Self, SeethruError> {
        options.timings.validate()?;

        let id = Uuid::new_v4();
        let role = setup.role();
        let local_ip = options.network.local_addr.unwrap_or_else(detect_local_ip);
        let params = ValidationParams::from_settings(options.settings.as_ref());
        let journal = Journal::new(options.log.clone());
        let events = EventSink::new(id, options.events.clone());
        let device = Arc::new(DeviceGuard::new(options.device.clone()));

        let initial = match role {
            Role::Client => ProtocolState::Client(ClientState::Listen),
            Role::Server => ProtocolState::Server(ServerState::Notify),
        };
        let (state_tx, state_rx) = watch::channel(initial);
        let queue = Arc::new(HandoffQueue::new(options.timings.queue_capacity));
        let cancel = CancellationToken::new();

        // Platform side first: a failing stream source must leave nothing running.
        let session_port = match &setup {
            RoleSetup::Server { source } => {
                let port = probe_session_port()?;
                source.start_serving(port, StreamQuality::default())?;
                info!("[server] Stream source serving on port {}", port);
                port
            }
            RoleSetup::Client { .. } => 0,
        };
        journal.reset();
        device.acquire_wake_lock();
        events.emit(SessionEventKind::StateChanged(initial));

        let ctx = Arc::new(SessionContext {
            local_ip,
            network: options.network.clone(),
            timings: options.timings,
            params,
            transport,
            queue: queue.clone(),
            tracker: options.location.clone(),
            cancel: cancel.clone(),
            state: state_tx,
            journal,
            events: events.clone(),
        });

        let span = info_span!("session", id = %id, role = %role);
        let mut tasks = Vec::with_capacity(3);
        tasks.push(tokio::spawn(receive_loop(ctx.clone(), state_rx.clone()).instrument(span.clone())));

        let teardown = match setup {
            RoleSetup::Client { player, screen } => {
                let playing = Arc::new(AtomicBool::new(false));
                let max_resolution = Resolution::max_supported_for(screen);
                info!("[client] Max playback resolution {} (screen {})", max_resolution, screen);
                let machine = ClientMachine::new(ctx.clone(), player.clone(), max_resolution, playing.clone());
                tasks.push(tokio::spawn(machine.run().instrument(span.clone())));
                Teardown::Client { player, playing }
            }
            RoleSetup::Server { source } => {
                let machine = ServerMachine::new(ctx.clone(), source.clone(), device.clone(), session_port);
                tasks.push(tokio::spawn(machine.run().instrument(span.clone())));
                tasks.push(tokio::spawn(advertise(ctx.clone(), state_rx.clone()).instrument(span)));
                Teardown::Server { source }
            }
        };

        info!("Session {} started as {} on {} (validation {:?})", id, role, local_ip, params);

        Ok(Self {
            id,
            role,
            local_ip,
            cancel,
            state: state_rx,
            queue,
            device,
            events,
            teardown,
            tasks,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn local_ip(&self) -> Ipv4Addr {
        self.local_ip
    }

    pub fn state(&self) -> ProtocolState {
        *self.state.borrow()
    }

    /// Receiver that observes every published state.
    pub fn subscribe(&self) -> watch::Receiver<ProtocolState> {
        self.state.clone()
    }

    /// The viewer was closed by the user. The next DATA is answered with END.
    pub fn playback_stopped(&self) {
        if let Teardown::Client { playing, .. } = &self.teardown {
            playing.store(false, Ordering::SeqCst);
        }
    }

    /// Cancels every task, waits for them and releases platform resources.
    pub async fn stop(mut self) {
        info!("Stopping session {}", self.id);
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!("Session task ended abnormally: {}", e);
            }
        }
        self.queue.clear();

        match &self.teardown {
            Teardown::Client { player, playing } => {
                if playing.swap(false, Ordering::SeqCst) {
                    player.stop_streaming();
                }
            }
            Teardown::Server { source } => source.stop_serving(),
        }
        self.device.restore();
        self.device.release_wake_lock();

        self.events.emit(SessionEventKind::SessionStopped);
        info!("Session {} stopped", self.id);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Tasks exit on their own once cancelled; stop() is the orderly path.
        self.cancel.cancel();
        self.device.restore();
        self.device.release_wake_lock();
    }
}

// MARK: - Receive task

/// Reads datagrams, filters them and feeds the queue.
async fn receive_loop(ctx: Arc<SessionContext>, state: watch::Receiver<ProtocolState>) {
    // Client only: server address → when its last HELLO was queued.
    let mut recent_hellos: HashMap<Ipv4Addr, Instant> = HashMap::new();
    let dedup = ctx.timings.hello_dedup();

    loop {
        let received = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => break,
            received = ctx.transport.recv() => received,
        };

        let (message, from) = match received {
            Ok(r) => r,
            Err(TransportError::Closed) => {
                warn!("[udp] Transport closed, receive task exiting");
                break;
            }
            Err(e @ TransportError::Malformed { .. }) => {
                debug!("[udp] Dropping datagram: {}", e);
                continue;
            }
            Err(e) => {
                warn!("[udp] {}", e);
                continue;
            }
        };

        // Our own broadcasts come back to us.
        if message.is_from(ctx.local_ip) {
            continue;
        }

        let current = *state.borrow();
        if current != ProtocolState::Client(ClientState::Listen) && !recent_hellos.is_empty() {
            recent_hellos.clear();
        }
        if !current.accepts(message.kind()) {
            debug!("[udp] {} from {} not wanted in {}", message.kind(), from, current);
            continue;
        }

        if message.kind() == MessageType::Hello {
            let Some(server) = message.sender().addr() else {
                debug!("[udp] Skipping busy server");
                continue;
            };
            let now = Instant::now();
            if let Some(seen) = recent_hellos.get(&server) {
                if now.duration_since(*seen) < dedup {
                    continue;
                }
            }
            recent_hellos.insert(server, now);
        }

        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => break,
            _ = ctx.queue.put(message) => {}
        }
    }
    debug!("[udp] Receive task stopped");
}
