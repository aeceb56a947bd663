pub mod config;
pub mod errors;
pub mod geo;
pub mod location;
pub mod message;
pub mod selector;
pub mod types;
pub mod validation;

pub use config::{
    JsonSettings, MemorySettings, NetworkConfig, ProtocolTimings, SettingsReader, ValidationParams,
    CLIENT_PORT, SERVER_PORT,
};
pub use errors::{MessageError, SeethruError, TransportError};
pub use geo::{GeoPoint, PositionVector};
pub use location::{Fix, LatestFix, LocationProvider, LocationTracker};
pub use message::{Message, MessageType, MAX_DATAGRAM_BYTES};
pub use selector::CandidateSet;
pub use types::{PeerAddress, Resolution, Role};
pub use validation::{check_alignment, still_behind, RelativeBearing, Verdict};
