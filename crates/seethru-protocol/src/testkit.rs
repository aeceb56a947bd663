//! Recording collaborators and helpers for the state-machine tests.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use seethru_core::{
    Fix, GeoPoint, LatestFix, LocationTracker, MemorySettings, Message, MessageType, NetworkConfig,
    PositionVector, ProtocolTimings, Resolution, SeethruError,
};
use seethru_transport::MemoryPeer;

use crate::collaborators::{DeviceControls, Player, StreamQuality, StreamSource};
use crate::log::RecentLog;
use crate::session::SessionOptions;

pub(crate) const CLIENT_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
pub(crate) const SERVER_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);
pub(crate) const OTHER_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 3);

/// Vehicle driving north along a meridian; 1e-4 deg ≈ 11 m between fixes.
pub(crate) fn northbound(lat: f64) -> PositionVector {
    PositionVector::new(GeoPoint::new(-3.7, lat), GeoPoint::new(-3.7, lat + 1e-4))
}

/// Tracker that currently reports `vector`.
pub(crate) fn tracker_at(vector: PositionVector) -> Arc<LocationTracker> {
    let feed = Arc::new(LatestFix::new());
    let tracker = Arc::new(LocationTracker::new(feed.clone()));
    let now = seethru_core::location::now_ms();
    feed.push(Fix::new(vector.a.lat, vector.a.lon, now));
    tracker.vector();
    feed.push(Fix::new(vector.b.lat, vector.b.lon, now + 1));
    tracker.vector();
    tracker
}

pub(crate) fn options(local_ip: Ipv4Addr, tracker: Arc<LocationTracker>, log: Arc<RecentLog>) -> SessionOptions {
    SessionOptions {
        network: NetworkConfig { local_addr: Some(local_ip), ..Default::default() },
        timings: ProtocolTimings::default(),
        settings: Arc::new(MemorySettings::new()),
        location: tracker,
        log,
        device: Arc::new(CountingDevice::default()),
        events: None,
    }
}

/// Next sent message of `kind`, skipping everything else (e.g. HELLO broadcasts).
pub(crate) async fn next_of(peer: &mut MemoryPeer, kind: MessageType) -> (Message, SocketAddr) {
    loop {
        match peer.next_sent().await {
            Some((m, dest)) if m.kind() == kind => return (m, dest),
            Some(_) => continue,
            None => panic!("transport dropped while waiting for {kind}"),
        }
    }
}

/// Everything sent so far, HELLO broadcasts excluded.
pub(crate) fn drain_sent(peer: &mut MemoryPeer) -> Vec<MessageType> {
    std::iter::from_fn(|| peer.try_next_sent())
        .map(|(m, _)| m.kind())
        .filter(|k| *k != MessageType::Hello)
        .collect()
}

// MARK: - Collaborators

#[derive(Default)]
pub(crate) struct RecordingPlayer {
    pub starts: Mutex<Vec<(Ipv4Addr, u16)>>,
    pub stops: AtomicUsize,
    pub speeds: Mutex<Vec<f32>>,
}

impl RecordingPlayer {
    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl Player for RecordingPlayer {
    fn start_streaming(&self, server: Ipv4Addr, port: u16) {
        self.starts.lock().unwrap().push((server, port));
    }

    fn stop_streaming(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn update_speed(&self, kmh: f32) {
        self.speeds.lock().unwrap().push(kmh);
    }
}

#[derive(Default)]
pub(crate) struct RecordingSource {
    pub fail: bool,
    pub serving: Mutex<Option<(u16, StreamQuality)>>,
    pub adjusted: Mutex<Vec<Resolution>>,
    pub stops: AtomicUsize,
}

impl StreamSource for RecordingSource {
    fn start_serving(&self, port: u16, quality: StreamQuality) -> Result<(), SeethruError> {
        if self.fail {
            return Err(SeethruError::StreamSource { reason: "encoder unavailable".into() });
        }
        *self.serving.lock().unwrap() = Some((port, quality));
        Ok(())
    }

    fn adjust_quality(&self, max: Resolution) {
        self.adjusted.lock().unwrap().push(max);
    }

    fn stop_serving(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub(crate) struct CountingDevice {
    pub locks: AtomicUsize,
    pub unlocks: AtomicUsize,
    pub mutes: AtomicUsize,
    pub restores: AtomicUsize,
}

impl DeviceControls for CountingDevice {
    fn acquire_wake_lock(&self) {
        self.locks.fetch_add(1, Ordering::SeqCst);
    }

    fn release_wake_lock(&self) {
        self.unlocks.fetch_add(1, Ordering::SeqCst);
    }

    fn mute_notifications(&self) {
        self.mutes.fetch_add(1, Ordering::SeqCst);
    }

    fn restore_notifications(&self) {
        self.restores.fetch_add(1, Ordering::SeqCst);
    }
}
