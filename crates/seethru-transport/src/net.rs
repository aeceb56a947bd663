use std::net::{Ipv4Addr, UdpSocket};
use std::ops::RangeInclusive;

use rand::Rng;
use seethru_core::SeethruError;
use tracing::debug;

/// Registered port range the streaming session port is drawn from.
pub const SESSION_PORT_RANGE: RangeInclusive<u16> = 1024..=49151;

const MAX_PORT_PROBES: u32 = 64;

// ── Local IP detection ────────────────────────────────────────────────────────

/// Detect the primary LAN IPv4 address by probing an external socket.
///
/// No packets are actually sent; this only queries the OS routing table.
/// Falls back to loopback when there is no route.
pub fn detect_local_ip() -> Ipv4Addr {
    UdpSocket::bind("0.0.0.0:0")
        .and_then(|s| {
            s.connect("8.8.8.8:80")?;
            s.local_addr()
        })
        .ok()
        .and_then(|a| match a.ip() {
            std::net::IpAddr::V4(v4) => Some(v4),
            std::net::IpAddr::V6(_) => None,
        })
        .unwrap_or(Ipv4Addr::LOCALHOST)
}

// ── Session port ──────────────────────────────────────────────────────────────

/// Picks a random port in [`SESSION_PORT_RANGE`] that can currently be bound.
///
/// The probe socket is closed before returning, so the port is only known to
/// be free at that instant.
pub fn probe_session_port() -> Result<u16, SeethruError> {
    let mut rng = rand::thread_rng();
    for attempt in 1..=MAX_PORT_PROBES {
        let port = rng.gen_range(SESSION_PORT_RANGE);
        match UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port)) {
            Ok(_) => return Ok(port),
            Err(e) => debug!("[udp] Port {} busy (attempt {}): {}", port, attempt, e),
        }
    }
    Err(SeethruError::NoFreePort { attempts: MAX_PORT_PROBES })
}
