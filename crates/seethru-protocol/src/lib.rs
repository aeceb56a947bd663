//! SeeThru hand-off protocol.
//!
//! A server vehicle advertises its forward video feed; a client vehicle
//! behind it on the same heading picks the nearest such server, negotiates a
//! session and keeps it alive until it overtakes the server or the link
//! drops. See [`session::Session`] for the runtime and the `client` /
//! `server` modules for the two state machines.

mod client;
mod context;
mod server;
#[cfg(test)]
mod testkit;

pub mod collaborators;
pub mod log;
pub mod queue;
pub mod session;
pub mod state;

pub use collaborators::{
    DeviceControls, NoDeviceControls, Player, SessionEvent, SessionEventKind, StreamQuality,
    StreamSource,
};
pub use log::{LogEntry, RecentLog, SessionLog};
pub use queue::HandoffQueue;
pub use session::{RoleSetup, Session, SessionOptions};
pub use state::{ClientState, ProtocolState, ServerState};
