use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use seethru_core::location::now_ms;
use seethru_core::{
    Fix, JsonSettings, LatestFix, LocationTracker, MemorySettings, NetworkConfig, ProtocolTimings,
    Resolution, SettingsReader,
};
use seethru_protocol::{NoDeviceControls, RoleSetup, Session, SessionEvent, SessionEventKind, SessionOptions};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::demo::{ConsoleLog, LoggingPlayer, LoggingSource};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub role: RoleArg,

    /// Validation settings: flat JSON object, e.g. {"direction": 20, "disable_val": 0}
    #[arg(long, global = true, env = "SEETHRU_SETTINGS")]
    pub settings: Option<PathBuf>,

    /// Protocol timing overrides as JSON
    #[arg(long, global = true)]
    pub timings: Option<PathBuf>,

    /// Address written into outgoing messages (detected when omitted)
    #[arg(long, global = true)]
    pub local_ip: Option<Ipv4Addr>,

    /// Broadcast address for HELLO
    #[arg(long, global = true, default_value_t = Ipv4Addr::BROADCAST)]
    pub broadcast: Ipv4Addr,

    /// Screen size used to pick the advertised playback resolution
    #[arg(long, global = true, default_value = "1280x720")]
    pub screen: Resolution,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleArg {
    /// Look for a vehicle ahead and watch its feed
    Client,
    /// Offer this vehicle's forward feed
    Server,
}

/// Runs one session until Ctrl-C.
///
/// Location fixes are read from stdin, one per line: `LAT LON [SPEED_MPS]`.
pub async fn run(args: Args) -> Result<()> {
    let settings: Arc<dyn SettingsReader> = match &args.settings {
        Some(path) => Arc::new(
            JsonSettings::load(path).with_context(|| format!("Loading settings from {}", path.display()))?,
        ),
        None => Arc::new(MemorySettings::new()),
    };
    let timings = match &args.timings {
        Some(path) => load_timings(path)?,
        None => ProtocolTimings::default(),
    };
    let network = NetworkConfig {
        local_addr: args.local_ip,
        broadcast_addr: args.broadcast,
        ..Default::default()
    };

    let feed = Arc::new(LatestFix::new());
    let tracker = Arc::new(LocationTracker::with_max_age(feed.clone(), timings.fix_max_age_ms));
    let (events_tx, mut events_rx) = mpsc::channel::<SessionEvent>(64);

    let options = SessionOptions {
        network,
        timings,
        settings,
        location: tracker,
        log: Arc::new(ConsoleLog),
        device: Arc::new(NoDeviceControls),
        events: Some(events_tx),
    };
    let setup = role_setup(args.role, args.screen);

    let session = Session::start(options, setup).await.context("Starting session")?;
    info!("Session {} running as {} from {}", session.id(), session.role(), session.local_ip());
    info!("Feed fixes on stdin as `LAT LON [SPEED_MPS]`; Ctrl-C to stop.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received");
                break;
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => match parse_fix(&line, now_ms()) {
                    Some(fix) => {
                        debug!("Fix {:.6},{:.6}", fix.lat, fix.lon);
                        feed.push(fix);
                    }
                    None if line.trim().is_empty() => {}
                    None => warn!("Ignoring malformed fix line: {:?}", line),
                },
                Ok(None) => {
                    info!("stdin closed; keeping last fix");
                    stdin_open = false;
                }
                Err(e) => {
                    warn!("stdin read failed: {}", e);
                    stdin_open = false;
                }
            },
            Some(event) = events_rx.recv() => log_event(&event),
        }
    }

    session.stop().await;
    Ok(())
}

fn role_setup(role: RoleArg, screen: Resolution) -> RoleSetup {
    match role {
        RoleArg::Client => RoleSetup::Client { player: Arc::new(LoggingPlayer), screen },
        RoleArg::Server => RoleSetup::Server { source: Arc::new(LoggingSource::default()) },
    }
}

fn load_timings(path: &Path) -> Result<ProtocolTimings> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Reading timings from {}", path.display()))?;
    let timings: ProtocolTimings =
        serde_json::from_str(&raw).with_context(|| format!("Parsing timings in {}", path.display()))?;
    timings.validate()?;
    Ok(timings)
}

/// Parses `LAT LON [SPEED_MPS]`, separated by whitespace or commas.
fn parse_fix(line: &str, timestamp_ms: u64) -> Option<Fix> {
    let mut fields = line
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|f| !f.is_empty());
    let lat: f64 = fields.next()?.parse().ok()?;
    let lon: f64 = fields.next()?.parse().ok()?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return None;
    }
    let fix = Fix::new(lat, lon, timestamp_ms);
    match fields.next() {
        Some(speed) => Some(fix.with_speed(speed.parse().ok()?)),
        None => Some(fix),
    }
}

fn log_event(event: &SessionEvent) {
    match &event.kind {
        SessionEventKind::StateChanged(state) => debug!("[event] state {}", state),
        SessionEventKind::PeerSelected(peer) => info!("[event] selected {}", peer),
        SessionEventKind::PeerRejected { peer, reason } => info!("[event] rejected {}: {}", peer, reason),
        SessionEventKind::StreamingStarted { peer, port } => {
            info!("[event] streaming with {} on port {}", peer, port)
        }
        SessionEventKind::StreamingStopped { peer } => info!("[event] streaming with {} stopped", peer),
        SessionEventKind::SessionStopped => info!("[event] session {} stopped", event.session_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fix_lines() {
        let fix = parse_fix("40.4168 -3.7038", 1_000).unwrap();
        assert_eq!((fix.lat, fix.lon, fix.timestamp_ms), (40.4168, -3.7038, 1_000));
        assert_eq!(fix.speed_mps, None);

        let fix = parse_fix("40.4168, -3.7038, 13.5", 0).unwrap();
        assert_eq!(fix.speed_mps, Some(13.5));
    }

    #[test]
    fn rejects_bad_fix_lines() {
        assert!(parse_fix("", 0).is_none());
        assert!(parse_fix("40.0", 0).is_none());
        assert!(parse_fix("north -3.7", 0).is_none());
        assert!(parse_fix("95.0 -3.7", 0).is_none());
        assert!(parse_fix("40.0 -3.7 fast", 0).is_none());
    }

    #[test]
    fn role_setup_matches_cli_role() {
        let screen = Resolution::new(800, 480);
        assert_eq!(role_setup(RoleArg::Client, screen).role(), seethru_core::Role::Client);
        assert_eq!(role_setup(RoleArg::Server, screen).role(), seethru_core::Role::Server);
    }

    #[test]
    fn cli_parses_role_and_globals() {
        let args = Args::try_parse_from([
            "seethru", "client", "--screen", "800x480", "--local-ip", "192.168.43.5",
        ])
        .unwrap();
        assert_eq!(args.role, RoleArg::Client);
        assert_eq!(args.screen, Resolution::new(800, 480));
        assert_eq!(args.local_ip, Some(Ipv4Addr::new(192, 168, 43, 5)));
        assert_eq!(args.broadcast, Ipv4Addr::BROADCAST);

        assert!(Args::try_parse_from(["seethru", "client", "--screen", "big"]).is_err());
    }
}
