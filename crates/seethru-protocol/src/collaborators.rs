//! Interfaces to the platform around the protocol.
//!
//! The state machines never touch video, audio or power management
//! directly; they signal through these traits. Calls are synchronous and
//! must return quickly; implementations that need to do real work hand it
//! off to their own tasks.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use seethru_core::{Resolution, SeethruError};
use tracing::debug;
use uuid::Uuid;

use crate::state::ProtocolState;

// MARK: - Player (client)

/// Client-side video viewer.
pub trait Player: Send + Sync {
    /// Open the server's stream at `server:port`.
    fn start_streaming(&self, server: Ipv4Addr, port: u16);
    fn stop_streaming(&self);
    /// Server ground speed in km/h, shown as an overlay.
    fn update_speed(&self, kmh: f32);
}

// MARK: - StreamSource (server)

/// Encoder settings the server starts serving with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamQuality {
    pub resolution: Resolution,
    pub fps: u32,
    pub bitrate_bps: u32,
}

impl Default for StreamQuality {
    fn default() -> Self {
        Self {
            resolution: Resolution::HVGA,
            fps: 30,
            bitrate_bps: 2_000_000,
        }
    }
}

/// Server-side video pipeline.
pub trait StreamSource: Send + Sync {
    /// Bring the stream up on `port`. Failure aborts session start.
    fn start_serving(&self, port: u16, quality: StreamQuality) -> Result<(), SeethruError>;
    /// Cap the encoder at the client's maximum playback resolution.
    fn adjust_quality(&self, max: Resolution);
    fn stop_serving(&self);
}

// MARK: - DeviceControls

/// Power and notification management. Every method defaults to a no-op.
pub trait DeviceControls: Send + Sync {
    fn acquire_wake_lock(&self) {}
    fn release_wake_lock(&self) {}
    /// Silence notifications; the implementation remembers the prior mode.
    fn mute_notifications(&self) {}
    fn restore_notifications(&self) {}
}

/// [`DeviceControls`] for hosts without any.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDeviceControls;

impl DeviceControls for NoDeviceControls {}

/// Makes sure every acquire/mute is paired with exactly one release/restore,
/// however many times the session asks.
pub(crate) struct DeviceGuard {
    controls: Arc<dyn DeviceControls>,
    wake_locked: AtomicBool,
    muted: AtomicBool,
}

impl DeviceGuard {
    pub(crate) fn new(controls: Arc<dyn DeviceControls>) -> Self {
        Self {
            controls,
            wake_locked: AtomicBool::new(false),
            muted: AtomicBool::new(false),
        }
    }

    pub(crate) fn acquire_wake_lock(&self) {
        if !self.wake_locked.swap(true, Ordering::SeqCst) {
            self.controls.acquire_wake_lock();
        }
    }

    pub(crate) fn release_wake_lock(&self) {
        if self.wake_locked.swap(false, Ordering::SeqCst) {
            self.controls.release_wake_lock();
        }
    }

    pub(crate) fn mute(&self) {
        if !self.muted.swap(true, Ordering::SeqCst) {
            self.controls.mute_notifications();
        }
    }

    pub(crate) fn restore(&self) {
        if self.muted.swap(false, Ordering::SeqCst) {
            self.controls.restore_notifications();
        }
    }
}

// MARK: - SessionEvent

#[derive(Debug, Clone, PartialEq)]
pub struct SessionEvent {
    pub session_id: Uuid,
    pub kind: SessionEventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEventKind {
    StateChanged(ProtocolState),
    /// Client picked this server out of the collected candidates.
    PeerSelected(Ipv4Addr),
    /// Peer failed geometric validation.
    PeerRejected { peer: Ipv4Addr, reason: String },
    StreamingStarted { peer: Ipv4Addr, port: u16 },
    StreamingStopped { peer: Ipv4Addr },
    SessionStopped,
}

/// Non-blocking event sink; events are dropped when nobody keeps up.
#[derive(Clone)]
pub(crate) struct EventSink {
    session_id: Uuid,
    tx: Option<tokio::sync::mpsc::Sender<SessionEvent>>,
}

impl EventSink {
    pub(crate) fn new(session_id: Uuid, tx: Option<tokio::sync::mpsc::Sender<SessionEvent>>) -> Self {
        Self { session_id, tx }
    }

    pub(crate) fn emit(&self, kind: SessionEventKind) {
        let Some(tx) = &self.tx else { return };
        let event = SessionEvent { session_id: self.session_id, kind };
        if let Err(e) = tx.try_send(event) {
            debug!("Session event dropped: {}", e);
        }
    }
}
