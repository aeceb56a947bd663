use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::SeethruError;

/// Port the server listens on for client-originated traffic.
pub const SERVER_PORT: u16 = 7777;
/// Port the client listens on for server-originated and broadcast traffic.
pub const CLIENT_PORT: u16 = 8888;

// MARK: - SettingsReader

/// Read-only access to persisted integer settings.
pub trait SettingsReader: Send + Sync {
    fn get_int(&self, key: &str, default: i32) -> i32;
}

/// In-memory settings, mostly for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct MemorySettings {
    values: HashMap<String, i32>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: i32) -> Self {
        self.values.insert(key.into(), value);
        self
    }
}

impl SettingsReader for MemorySettings {
    fn get_int(&self, key: &str, default: i32) -> i32 {
        self.values.get(key).copied().unwrap_or(default)
    }
}

/// Flat JSON object of integer settings, e.g. `{"direction": 25, "disable_val": 0}`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct JsonSettings {
    values: HashMap<String, i32>,
}

impl JsonSettings {
    pub fn from_json(json: &str) -> Result<Self, SeethruError> {
        serde_json::from_str(json).map_err(|e| SeethruError::ConfigurationInvalid {
            reason: format!("settings JSON: {e}"),
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SeethruError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let settings = Self::from_json(&raw)?;
        debug!("Loaded {} setting(s) from {}", settings.values.len(), path.as_ref().display());
        Ok(settings)
    }
}

impl SettingsReader for JsonSettings {
    fn get_int(&self, key: &str, default: i32) -> i32 {
        self.values.get(key).copied().unwrap_or(default)
    }
}

// MARK: - ValidationParams

/// Geometric tolerances, loaded once per session start.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationParams {
    /// Maximum angle between both vehicles' headings.
    pub direction_deg: f64,
    /// Maximum angle between the own heading and the bearing to the peer.
    pub position_deg: f64,
    /// Client only: bearing to the server beyond which the client has overtaken it.
    pub overtaking_deg: f64,
    /// Skip all geometric checks.
    pub disabled: bool,
}

impl Default for ValidationParams {
    fn default() -> Self {
        Self {
            direction_deg: 20.0,
            position_deg: 5.0,
            overtaking_deg: 90.0,
            disabled: false,
        }
    }
}

impl ValidationParams {
    pub const KEY_DIRECTION: &'static str = "direction";
    pub const KEY_POSITION: &'static str = "location";
    pub const KEY_OVERTAKING: &'static str = "overtaking";
    pub const KEY_DISABLED: &'static str = "disable_val";

    pub fn from_settings(settings: &dyn SettingsReader) -> Self {
        let d = Self::default();
        Self {
            direction_deg: settings.get_int(Self::KEY_DIRECTION, d.direction_deg as i32) as f64,
            position_deg: settings.get_int(Self::KEY_POSITION, d.position_deg as i32) as f64,
            overtaking_deg: settings.get_int(Self::KEY_OVERTAKING, d.overtaking_deg as i32) as f64,
            disabled: settings.get_int(Self::KEY_DISABLED, 0) == 1,
        }
    }
}

// MARK: - ProtocolTimings

/// Timeouts, windows and retry budgets of both state machines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolTimings {
    /// Client: how long to keep collecting candidates after the first valid HELLO.
    pub collection_window_ms: u64,
    /// Client: HELLOs from an address seen this recently are dropped.
    pub hello_dedup_ms: u64,
    /// Wait for a reply (READY/REJECT, DATA, DATA_ACK/END).
    pub reply_timeout_ms: u64,
    /// Attempts / consecutive timeouts before giving up.
    pub retry_budget: u32,
    /// Server: HELLO broadcast period.
    pub advertise_interval_ms: u64,
    /// Server: pause after each DATA_ACK before the next DATA.
    pub stream_pacing_ms: u64,
    /// Server: copies of READY/REJECT sent back-to-back.
    pub reply_copies: u32,
    /// Location fixes older than this invalidate the position vector.
    pub fix_max_age_ms: u64,
    pub queue_capacity: usize,
}

impl Default for ProtocolTimings {
    fn default() -> Self {
        Self {
            collection_window_ms: 2_000,
            hello_dedup_ms: 2_500,
            reply_timeout_ms: 3_000,
            retry_budget: 3,
            advertise_interval_ms: 1_000,
            stream_pacing_ms: 800,
            reply_copies: 3,
            fix_max_age_ms: 5_000,
            queue_capacity: 30,
        }
    }
}

impl ProtocolTimings {
    pub fn collection_window(&self) -> Duration {
        Duration::from_millis(self.collection_window_ms)
    }

    pub fn hello_dedup(&self) -> Duration {
        Duration::from_millis(self.hello_dedup_ms)
    }

    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }

    pub fn advertise_interval(&self) -> Duration {
        Duration::from_millis(self.advertise_interval_ms)
    }

    pub fn stream_pacing(&self) -> Duration {
        Duration::from_millis(self.stream_pacing_ms)
    }

    pub fn validate(&self) -> Result<(), SeethruError> {
        let invalid = |reason: &str| {
            Err(SeethruError::ConfigurationInvalid { reason: reason.to_owned() })
        };
        if self.retry_budget == 0 {
            return invalid("retry_budget must be at least 1");
        }
        if self.reply_copies == 0 {
            return invalid("reply_copies must be at least 1");
        }
        if self.queue_capacity == 0 {
            return invalid("queue_capacity must be at least 1");
        }
        if self.reply_timeout_ms == 0 || self.collection_window_ms == 0 {
            return invalid("timeouts must be non-zero");
        }
        Ok(())
    }
}

// MARK: - NetworkConfig

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub server_port: u16,
    pub client_port: u16,
    pub broadcast_addr: Ipv4Addr,
    /// Address written into outgoing messages; detected from the routing
    /// table when absent.
    pub local_addr: Option<Ipv4Addr>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            server_port: SERVER_PORT,
            client_port: CLIENT_PORT,
            broadcast_addr: Ipv4Addr::BROADCAST,
            local_addr: None,
        }
    }
}
