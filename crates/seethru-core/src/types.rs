use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::errors::MessageError;

// MARK: - Resolution

/// Video resolution in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const FHD: Self = Self { width: 1920, height: 1080 };
    pub const HD: Self = Self { width: 1280, height: 720 };
    pub const SD: Self = Self { width: 720, height: 480 };
    pub const HVGA: Self = Self { width: 480, height: 320 };
    pub const QVGA: Self = Self { width: 320, height: 240 };

    /// Playback resolutions a client may advertise, largest first.
    pub const SUPPORTED: [Self; 5] = [Self::FHD, Self::HD, Self::SD, Self::HVGA, Self::QVGA];

    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn fits_within(&self, screen: Resolution) -> bool {
        self.width <= screen.width && self.height <= screen.height
    }

    /// Largest supported resolution that fits on `screen`.
    ///
    /// Falls back to the smallest entry ([`Resolution::QVGA`]) when the
    /// screen is smaller than every entry in the table.
    pub fn max_supported_for(screen: Resolution) -> Self {
        Self::SUPPORTED
            .iter()
            .copied()
            .find(|r| r.fits_within(screen))
            .unwrap_or(Self::QVGA)
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl std::str::FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {s:?}"))?;
        let width = w.trim().parse().map_err(|_| format!("bad width in {s:?}"))?;
        let height = h.trim().parse().map_err(|_| format!("bad height in {s:?}"))?;
        Ok(Self { width, height })
    }
}

// MARK: - PeerAddress

/// Originator field of a wire message.
///
/// A server that is already streaming advertises itself with the busy
/// sentinel so listening clients skip it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PeerAddress {
    Addr(Ipv4Addr),
    Busy,
}

impl PeerAddress {
    pub const BUSY_SENTINEL: &'static str = "X.X.X.X";

    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy)
    }

    pub fn addr(&self) -> Option<Ipv4Addr> {
        match self {
            Self::Addr(ip) => Some(*ip),
            Self::Busy => None,
        }
    }
}

impl From<Ipv4Addr> for PeerAddress {
    fn from(ip: Ipv4Addr) -> Self {
        Self::Addr(ip)
    }
}

impl TryFrom<String> for PeerAddress {
    type Error = MessageError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.eq_ignore_ascii_case(Self::BUSY_SENTINEL) {
            return Ok(Self::Busy);
        }
        value
            .parse::<Ipv4Addr>()
            .map(Self::Addr)
            .map_err(|_| MessageError::InvalidSender { value })
    }
}

impl From<PeerAddress> for String {
    fn from(p: PeerAddress) -> Self {
        p.to_string()
    }
}

impl std::fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Addr(ip) => write!(f, "{ip}"),
            Self::Busy => f.write_str(Self::BUSY_SENTINEL),
        }
    }
}

// MARK: - Role

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Client,
    Server,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Client => f.write_str("client"),
            Self::Server => f.write_str("server"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_resolution_picks_largest_fitting_entry() {
        assert_eq!(Resolution::max_supported_for(Resolution::new(2560, 1600)), Resolution::FHD);
        assert_eq!(Resolution::max_supported_for(Resolution::new(1280, 800)), Resolution::HD);
        assert_eq!(Resolution::max_supported_for(Resolution::new(800, 480)), Resolution::SD);
    }

    #[test]
    fn max_resolution_falls_back_to_smallest() {
        assert_eq!(Resolution::max_supported_for(Resolution::new(240, 160)), Resolution::QVGA);
    }

    #[test]
    fn resolution_parses_from_cli_form() {
        assert_eq!("1280x720".parse::<Resolution>().unwrap(), Resolution::HD);
        assert!("1280-720".parse::<Resolution>().is_err());
    }

    #[test]
    fn peer_address_sentinel_round_trip() {
        let busy: PeerAddress = serde_json::from_str("\"X.X.X.X\"").unwrap();
        assert!(busy.is_busy());
        assert_eq!(serde_json::to_string(&busy).unwrap(), "\"X.X.X.X\"");

        let ip: PeerAddress = serde_json::from_str("\"192.168.43.7\"").unwrap();
        assert_eq!(ip.addr(), Some(Ipv4Addr::new(192, 168, 43, 7)));
    }

    #[test]
    fn peer_address_rejects_garbage() {
        assert!(serde_json::from_str::<PeerAddress>("\"not-an-ip\"").is_err());
    }
}
