//! Wire messages exchanged between client and server vehicles.
//!
//! Every datagram carries exactly one JSON-encoded [`Message`]:
//!
//! ```text
//! {
//!   "type":          "hello" | "request" | "ready" | "reject" | "data" | "data_ack" | "end",
//!   "sender":        "192.168.43.12" | "X.X.X.X",
//!   "location":      [a_lon, a_lat, b_lon, b_lat],
//!   "speed":         42.5,                          // km/h       (READY, DATA)
//!   "maxResolution": {"width": 1280, "height": 720}, //            (REQUEST)
//!   "sessionPort":   40123                           //            (READY)
//! }
//! ```
//!
//! | Type       | Sent by | Meaningful fields                  |
//! |------------|---------|------------------------------------|
//! | `hello`    | server  | sender, location                   |
//! | `request`  | client  | sender, location, maxResolution    |
//! | `ready`    | server  | sender, location, speed, sessionPort |
//! | `reject`   | server  | sender                             |
//! | `data`     | server  | sender, location, speed            |
//! | `data_ack` | client  | sender                             |
//! | `end`      | client  | sender                             |
//!
//! Fields outside a type's row hold defaults and are ignored by receivers.
//! Messages are only built through the typed constructors below.

use std::net::Ipv4Addr;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::errors::MessageError;
use crate::geo::PositionVector;
use crate::types::{PeerAddress, Resolution};

/// Largest datagram accepted by [`Message::decode`].
pub const MAX_DATAGRAM_BYTES: usize = 2048;

// MARK: - MessageType

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Hello,
    Request,
    Ready,
    Reject,
    Data,
    DataAck,
    End,
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Hello => "HELLO",
            Self::Request => "REQUEST",
            Self::Ready => "READY",
            Self::Reject => "REJECT",
            Self::Data => "DATA",
            Self::DataAck => "DATA_ACK",
            Self::End => "END",
        };
        write!(f, "<{s}>")
    }
}

// MARK: - Message

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    kind: MessageType,
    sender: PeerAddress,
    #[serde(default)]
    location: PositionVector,
    #[serde(default)]
    speed: f32,
    #[serde(rename = "maxResolution", default)]
    max_resolution: Resolution,
    #[serde(rename = "sessionPort", default)]
    session_port: u16,
}

impl Message {
    fn bare(kind: MessageType, sender: PeerAddress) -> Self {
        Self {
            kind,
            sender,
            location: PositionVector::default(),
            speed: 0.0,
            max_resolution: Resolution::default(),
            session_port: 0,
        }
    }

    /// Server advertisement. Pass [`PeerAddress::Busy`] while streaming.
    pub fn hello(sender: PeerAddress, location: PositionVector) -> Self {
        Self { location, ..Self::bare(MessageType::Hello, sender) }
    }

    pub fn request(sender: Ipv4Addr, location: PositionVector, max_resolution: Resolution) -> Self {
        Self {
            location,
            max_resolution,
            ..Self::bare(MessageType::Request, sender.into())
        }
    }

    pub fn ready(sender: Ipv4Addr, location: PositionVector, speed: f32, session_port: u16) -> Self {
        Self {
            location,
            speed,
            session_port,
            ..Self::bare(MessageType::Ready, sender.into())
        }
    }

    pub fn reject(sender: Ipv4Addr) -> Self {
        Self::bare(MessageType::Reject, sender.into())
    }

    pub fn data(sender: Ipv4Addr, location: PositionVector, speed: f32) -> Self {
        Self {
            location,
            speed,
            ..Self::bare(MessageType::Data, sender.into())
        }
    }

    pub fn data_ack(sender: Ipv4Addr) -> Self {
        Self::bare(MessageType::DataAck, sender.into())
    }

    pub fn end(sender: Ipv4Addr) -> Self {
        Self::bare(MessageType::End, sender.into())
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn kind(&self) -> MessageType {
        self.kind
    }

    pub fn sender(&self) -> PeerAddress {
        self.sender
    }

    /// `true` if the message originates from `addr`.
    pub fn is_from(&self, addr: Ipv4Addr) -> bool {
        self.sender == PeerAddress::Addr(addr)
    }

    pub fn location(&self) -> PositionVector {
        self.location
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn max_resolution(&self) -> Resolution {
        self.max_resolution
    }

    pub fn session_port(&self) -> u16 {
        self.session_port
    }

    // ── Codec ────────────────────────────────────────────────────────────────

    pub fn encode(&self) -> Result<Bytes, MessageError> {
        serde_json::to_vec(self).map(Bytes::from).map_err(MessageError::Encode)
    }

    pub fn decode(datagram: &[u8]) -> Result<Self, MessageError> {
        if datagram.len() > MAX_DATAGRAM_BYTES {
            return Err(MessageError::Oversize {
                len: datagram.len(),
                max: MAX_DATAGRAM_BYTES,
            });
        }
        serde_json::from_slice(datagram).map_err(MessageError::Decode)
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} from {}", self.kind, self.sender)
    }
}
