//! # TIDEGATE Networking - Tick-Loop Bridge
//!
//! Connects a frame-driven application (one `tick` per frame) to a network
//! engine that runs on its own thread.
//!
//! ## Architecture
//!
//! ```text
//!  TICK LOOP THREAD                          ENGINE THREAD
//!  ┌──────────────────────┐   outgoing   ┌──────────────────────┐
//!  │ ServerBridge /       │ ───────────▶ │ ServerEngine /       │
//!  │ ClientBridge         │   commands   │ ClientEngine         │
//!  │                      │ ───────────▶ │                      │
//!  │  tick(listener)      │   incoming   │  sockets, peers,     │
//!  │   └─ callbacks       │ ◀─────────── │  reliability         │
//!  │                      │   events     │                      │
//!  │                      │ ◀─────────── │                      │
//!  └──────────────────────┘              └──────────────────────┘
//! ```
//!
//! - Every queue is bounded and single-producer/single-consumer
//! - Neither side ever blocks on the other; a full queue drops and logs
//! - Callbacks run on the tick-loop thread, at most one drain per frame
//! - Connection ids seen by the application are native peer ids + 1, so
//!   id 0 never names a peer
//!
//! ## Example
//!
//! ```rust,ignore
//! use tidegate_net::{BridgeConfig, LoopbackHub, LoopbackServerEngine, ServerBridge, ServerEvent};
//!
//! let hub = LoopbackHub::new();
//! let mut server = ServerBridge::new(BridgeConfig::default(), LoopbackServerEngine::new(hub));
//! server.start()?;
//!
//! let mut events: Vec<ServerEvent> = Vec::new();
//! loop {
//!     server.tick(&mut events);
//!     server.finish_frame();
//! }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod channel;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod identity;
pub mod link;
pub mod listener;
pub mod packet;
pub mod peers;
pub mod queue;
pub mod scratch;
pub mod server;
pub mod tick;

// Re-exports for convenience
pub use channel::{ChannelTable, DeliveryMode, PacketFlags};
pub use client::{ClientBridge, ConnectTarget, ConnectionState};
pub use config::{BridgeConfig, QueueCapacities, RoleConfig};
pub use engine::{
    ClientEngine, ClientParams, LoopbackClientEngine, LoopbackHub, LoopbackServerEngine,
    ServerEngine, ServerParams,
};
pub use error::{BridgeError, BridgeResult};
pub use identity::{to_logical, to_native, ConnectionId, NativePeerId};
pub use listener::{ClientEvent, ClientListener, ServerEvent, ServerListener};
pub use packet::ClientStatus;
pub use peers::UNAVAILABLE;
pub use server::ServerBridge;

/// Largest payload that fits one datagram on any common path.
///
/// Unreliable channels do not fragment, so larger payloads on them only
/// get an advisory warning and are left to the engine.
pub const PATH_MTU: usize = 1200;

/// Hard ceiling for `max_packet_size` (32 MiB).
pub const MAX_PACKET_SIZE_CAP: usize = 32 * 1024 * 1024;
