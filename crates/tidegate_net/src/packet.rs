//! # Queue Items
//!
//! Everything that travels through the cross-thread queues.
//!
//! ```text
//! consumer ──OutgoingPacket──▶ engine
//! consumer ──Command─────────▶ engine
//! engine ───IncomingPacket───▶ consumer
//! engine ───ConnectionEvent──▶ consumer
//! engine ───ClientStatus─────▶ consumer   (client only)
//! ```
//!
//! Payloads are owned `Vec<u8>`s. Whoever dequeues an item owns its payload
//! and is responsible for releasing it.

use std::net::SocketAddr;

use crate::channel::PacketFlags;
use crate::identity::NativePeerId;

/// A send queued by the consumer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutgoingPacket {
    /// Target peer. `None` on the client, where the only peer is the server.
    pub peer: Option<NativePeerId>,
    /// Logical channel index.
    pub channel: u8,
    /// Engine delivery flags derived from the channel table.
    pub flags: PacketFlags,
    /// Payload bytes.
    pub payload: Vec<u8>,
}

/// A receive queued by the engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IncomingPacket {
    /// Sending peer. The server's own id on the client side.
    pub peer: NativePeerId,
    /// Logical channel index.
    pub channel: u8,
    /// Payload bytes, owned until staged.
    pub payload: Vec<u8>,
}

/// What happened to a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    /// Peer connected.
    Connected,
    /// Peer disconnected, was kicked or timed out.
    Disconnected,
    /// A kind this bridge does not understand, carried as the raw engine code.
    Other(u8),
}

/// Connection lifecycle notification from the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConnectionEvent {
    /// Engine peer id.
    pub peer: NativePeerId,
    /// Remote address.
    pub addr: SocketAddr,
    /// Event kind.
    pub kind: EventKind,
}

impl ConnectionEvent {
    /// Shorthand for a `Connected` event.
    #[must_use]
    pub const fn connected(peer: NativePeerId, addr: SocketAddr) -> Self {
        Self { peer, addr, kind: EventKind::Connected }
    }

    /// Shorthand for a `Disconnected` event.
    #[must_use]
    pub const fn disconnected(peer: NativePeerId, addr: SocketAddr) -> Self {
        Self { peer, addr, kind: EventKind::Disconnected }
    }
}

/// Out-of-band control signal from the consumer to the engine.
///
/// Never acknowledged synchronously; effects arrive later as events.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    /// Shut the engine thread down.
    Stop,
    /// Disconnect one peer (server only).
    Kick(NativePeerId),
    /// Publish a status snapshot (client only).
    RequestStatus,
}

/// Periodic client link statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClientStatus {
    /// Round-trip time estimate in milliseconds.
    pub rtt_ms: u32,
    /// Packets handed to the engine.
    pub packets_sent: u64,
    /// Packets delivered by the engine.
    pub packets_received: u64,
    /// Payload bytes sent.
    pub bytes_sent: u64,
    /// Payload bytes received.
    pub bytes_received: u64,
    /// Packets the engine gave up on.
    pub packets_lost: u64,
}
