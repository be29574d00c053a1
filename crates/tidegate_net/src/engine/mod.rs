//! # Engine Seam
//!
//! The bridge never touches sockets. An engine owns the network thread and
//! the engine end of the role's queues; the bridge only starts it, stops it
//! and asks whether it is still alive.
//!
//! ## Contract
//!
//! - `start` takes ownership of the engine link and returns without blocking
//! - The engine observes `Command::Stop` on its own schedule
//! - `stop` may wait for the thread to exit but must not wait on the consumer

pub mod loopback;

pub use loopback::{LoopbackClientEngine, LoopbackHub, LoopbackServerEngine};

use std::time::Duration;

use crate::config::BridgeConfig;
use crate::error::BridgeResult;
use crate::link::{ClientEngineLink, ServerEngineLink};

/// Settings a server engine starts with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerParams {
    /// Address to bind.
    pub bind_address: String,
    /// Port to bind.
    pub port: u16,
    /// Maximum simultaneous peers; native ids stay below this.
    pub max_peers: usize,
    /// Number of channels.
    pub channels: usize,
    /// How often the engine thread polls.
    pub poll_interval: Duration,
    /// Largest payload the engine must accept.
    pub max_packet_size: usize,
}

impl ServerParams {
    /// Extracts server settings from a validated config.
    #[must_use]
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            bind_address: config.bind_address.clone(),
            port: config.port,
            max_peers: config.max_peers,
            channels: config.channels.len(),
            poll_interval: config.poll_interval(),
            max_packet_size: config.max_packet_size,
        }
    }
}

/// Settings a client engine starts with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientParams {
    /// Server host.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Number of channels.
    pub channels: usize,
    /// How often the engine thread polls.
    pub poll_interval: Duration,
    /// Largest payload the engine must accept.
    pub max_packet_size: usize,
}

/// Server-side network engine.
pub trait ServerEngine {
    /// Starts the engine thread with the given queue ends.
    ///
    /// # Errors
    ///
    /// `EngineStart` if the engine cannot bind or spawn.
    fn start(&mut self, link: ServerEngineLink, params: &ServerParams) -> BridgeResult<()>;

    /// Stops the engine thread.
    fn stop(&mut self);

    /// Returns true while the engine thread runs.
    fn is_alive(&self) -> bool;
}

/// Client-side network engine.
pub trait ClientEngine {
    /// Starts the engine thread with the given queue ends.
    ///
    /// # Errors
    ///
    /// `EngineStart` if the engine cannot spawn.
    fn start(&mut self, link: ClientEngineLink, params: &ClientParams) -> BridgeResult<()>;

    /// Stops the engine thread.
    fn stop(&mut self);

    /// Returns true while the engine thread runs.
    fn is_alive(&self) -> bool;
}
