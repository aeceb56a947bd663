//! Console stand-ins for the platform collaborators.
//!
//! The node binary has no camera, player, or display; these implementations
//! trace what a real platform would be asked to do so a pair of nodes can be
//! exercised end to end on a LAN.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};

use seethru_core::{Resolution, SeethruError};
use seethru_protocol::{Player, SessionLog, StreamQuality, StreamSource};
use tracing::info;

// MARK: - Player

#[derive(Debug, Default)]
pub struct LoggingPlayer;

impl Player for LoggingPlayer {
    fn start_streaming(&self, server: Ipv4Addr, port: u16) {
        info!("[player] Would open udp://{}:{}", server, port);
    }

    fn stop_streaming(&self) {
        info!("[player] Playback stopped");
    }

    fn update_speed(&self, kmh: f32) {
        info!("[player] Vehicle ahead at {:.1} km/h", kmh);
    }
}

// MARK: - StreamSource

#[derive(Debug, Default)]
pub struct LoggingSource {
    serving: AtomicBool,
}

impl StreamSource for LoggingSource {
    fn start_serving(&self, port: u16, quality: StreamQuality) -> Result<(), SeethruError> {
        if self.serving.swap(true, Ordering::SeqCst) {
            return Err(SeethruError::StreamSource { reason: "already serving".into() });
        }
        info!(
            "[source] Serving {} @ {} fps, {} kbps on port {}",
            quality.resolution,
            quality.fps,
            quality.bitrate_bps / 1000,
            port
        );
        Ok(())
    }

    fn adjust_quality(&self, max: Resolution) {
        info!("[source] Capping output at {}", max);
    }

    fn stop_serving(&self) {
        if self.serving.swap(false, Ordering::SeqCst) {
            info!("[source] Stopped serving");
        }
    }
}

// MARK: - SessionLog

/// Forwards session log lines to `tracing`.
#[derive(Debug, Default)]
pub struct ConsoleLog;

impl SessionLog for ConsoleLog {
    fn append(&self, timestamp: &str, text: &str) {
        info!(target: "seethru::session", "{} {}", timestamp, text);
    }
}
