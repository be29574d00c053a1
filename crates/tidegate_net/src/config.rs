//! # Bridge Configuration
//!
//! Loaded once at startup, usually from a TOML file:
//!
//! ```toml
//! bind_address = "0.0.0.0"
//! port = 7777
//! max_peers = 64
//! channels = ["reliable", "unreliable", "unreliable_fragmented"]
//! poll_interval_ms = 1
//! packet_buffer_capacity = 4096
//!
//! [server.queues]
//! packet_capacity = 4096
//! event_capacity = 256
//! ```
//!
//! Bad values are corrected with a warning by [`BridgeConfig::validate`];
//! configuration problems are never fatal once the file has parsed.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use crate::channel::{ChannelTable, DeliveryMode};
use crate::error::{BridgeError, BridgeResult};
use crate::scratch::DEFAULT_PACKET_BUFFER_CAPACITY;
use crate::MAX_PACKET_SIZE_CAP;

/// Queue capacities for one role.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct QueueCapacities {
    /// Incoming and outgoing packet queues.
    pub packet_capacity: usize,
    /// Connection and disconnection event queues.
    pub event_capacity: usize,
    /// Command queue.
    pub command_capacity: usize,
    /// Status snapshot queue (client only).
    pub status_capacity: usize,
}

impl QueueCapacities {
    /// Server defaults: many peers share the packet queues.
    pub const SERVER: Self = Self {
        packet_capacity: 4096,
        event_capacity: 256,
        command_capacity: 64,
        status_capacity: 16,
    };

    /// Client defaults: one link.
    pub const CLIENT: Self = Self {
        packet_capacity: 1024,
        event_capacity: 16,
        command_capacity: 16,
        status_capacity: 16,
    };

    fn corrected(mut self, role: &str) -> Self {
        for (name, value) in [
            ("packet_capacity", &mut self.packet_capacity),
            ("event_capacity", &mut self.event_capacity),
            ("command_capacity", &mut self.command_capacity),
            ("status_capacity", &mut self.status_capacity),
        ] {
            if *value == 0 {
                tracing::warn!("{}.queues.{} is 0; using 1", role, name);
                *value = 1;
            }
        }
        self
    }
}

/// Per-role settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct RoleConfig {
    /// Queue capacities.
    pub queues: QueueCapacities,
}

impl RoleConfig {
    /// Server role defaults.
    pub const SERVER: Self = Self { queues: QueueCapacities::SERVER };

    /// Client role defaults.
    pub const CLIENT: Self = Self { queues: QueueCapacities::CLIENT };

    fn deserialize_server<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        RoleOverrides::deserialize(deserializer).map(|role| role.over(Self::SERVER))
    }

    fn deserialize_client<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        RoleOverrides::deserialize(deserializer).map(|role| role.over(Self::CLIENT))
    }
}

/// `[server]` / `[client]` table as written; absent keys fall back to the
/// role's own defaults.
#[derive(Default, Deserialize)]
#[serde(default)]
struct RoleOverrides {
    queues: QueueOverrides,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct QueueOverrides {
    packet_capacity: Option<usize>,
    event_capacity: Option<usize>,
    command_capacity: Option<usize>,
    status_capacity: Option<usize>,
}

impl RoleOverrides {
    fn over(self, base: RoleConfig) -> RoleConfig {
        let q = self.queues;
        let defaults = base.queues;
        RoleConfig {
            queues: QueueCapacities {
                packet_capacity: q.packet_capacity.unwrap_or(defaults.packet_capacity),
                event_capacity: q.event_capacity.unwrap_or(defaults.event_capacity),
                command_capacity: q.command_capacity.unwrap_or(defaults.command_capacity),
                status_capacity: q.status_capacity.unwrap_or(defaults.status_capacity),
            },
        }
    }
}

/// Everything the bridge and its engine need at initialization.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Address the server binds to.
    pub bind_address: String,
    /// Server port; also the default client target port.
    pub port: u16,
    /// Maximum simultaneous peers on the server.
    pub max_peers: usize,
    /// Delivery mode per channel. Index 0 and 1 are fixed.
    pub channels: Vec<DeliveryMode>,
    /// Engine poll interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Largest payload on reliably fragmenting channels (capped at 32 MiB).
    pub max_packet_size: usize,
    /// Scratch buffer size per role.
    pub packet_buffer_capacity: usize,
    /// Server queues.
    #[serde(deserialize_with = "RoleConfig::deserialize_server")]
    pub server: RoleConfig,
    /// Client queues.
    #[serde(deserialize_with = "RoleConfig::deserialize_client")]
    pub client: RoleConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 7777,
            max_peers: 100,
            channels: vec![DeliveryMode::Reliable, DeliveryMode::Unreliable],
            poll_interval_ms: 1,
            max_packet_size: MAX_PACKET_SIZE_CAP,
            packet_buffer_capacity: DEFAULT_PACKET_BUFFER_CAPACITY,
            server: RoleConfig::SERVER,
            client: RoleConfig::CLIENT,
        }
    }
}

impl BridgeConfig {
    /// Parses a TOML document. Missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// `Config` if the document does not parse.
    pub fn from_toml_str(source: &str) -> BridgeResult<Self> {
        toml::from_str(source).map_err(|e| BridgeError::Config(e.to_string()))
    }

    /// Reads and parses a TOML file.
    ///
    /// # Errors
    ///
    /// `Io` if the file cannot be read, `Config` if it does not parse.
    pub fn load(path: impl AsRef<Path>) -> BridgeResult<Self> {
        let source = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&source)
    }

    /// Corrects out-of-policy values, warning about each one.
    #[must_use]
    pub fn validate(mut self) -> Self {
        if self.max_packet_size > MAX_PACKET_SIZE_CAP {
            tracing::warn!(
                "max_packet_size {} exceeds the {} byte cap; clamping",
                self.max_packet_size,
                MAX_PACKET_SIZE_CAP
            );
            self.max_packet_size = MAX_PACKET_SIZE_CAP;
        }
        if self.max_peers == 0 {
            tracing::warn!("max_peers is 0; using 1");
            self.max_peers = 1;
        }
        if self.packet_buffer_capacity == 0 {
            tracing::warn!(
                "packet_buffer_capacity is 0; using {}",
                DEFAULT_PACKET_BUFFER_CAPACITY
            );
            self.packet_buffer_capacity = DEFAULT_PACKET_BUFFER_CAPACITY;
        }
        self.channels = ChannelTable::configure(&self.channels).modes().to_vec();
        self.server.queues = self.server.queues.corrected("server");
        self.client.queues = self.client.queues.corrected("client");
        self
    }

    /// Channel table for these settings.
    #[must_use]
    pub fn channel_table(&self) -> ChannelTable {
        ChannelTable::configure(&self.channels).with_max_packet_size(self.max_packet_size)
    }

    /// Engine poll interval.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
