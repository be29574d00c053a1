//! # Role Links
//!
//! The queue bundle for each role, split into the end the tick loop owns
//! and the end the engine thread owns.
//!
//! ```text
//!            ServerLink (tick loop)          ServerEngineLink (engine thread)
//! outgoing   Producer  ───────────────────▶  Consumer
//! commands   Producer  ───────────────────▶  Consumer
//! incoming   Consumer  ◀───────────────────  Producer
//! connects   Consumer  ◀───────────────────  Producer
//! disconnects Consumer ◀───────────────────  Producer
//! ```
//!
//! The client bundle swaps the disconnection queue for a status queue and
//! reports both connects and disconnects on its event queue.

use crate::config::QueueCapacities;
use crate::packet::{ClientStatus, Command, ConnectionEvent, IncomingPacket, OutgoingPacket};
use crate::queue::{self, Consumer, Producer};

/// Tick-loop end of the server queues.
#[derive(Debug)]
pub struct ServerLink {
    /// Sends to peers.
    pub outgoing: Producer<OutgoingPacket>,
    /// Control signals.
    pub commands: Producer<Command>,
    /// Received packets.
    pub incoming: Consumer<IncomingPacket>,
    /// New connections.
    pub connections: Consumer<ConnectionEvent>,
    /// Lost connections.
    pub disconnections: Consumer<ConnectionEvent>,
}

/// Engine end of the server queues.
#[derive(Debug)]
pub struct ServerEngineLink {
    /// Sends to peers.
    pub outgoing: Consumer<OutgoingPacket>,
    /// Control signals.
    pub commands: Consumer<Command>,
    /// Received packets.
    pub incoming: Producer<IncomingPacket>,
    /// New connections.
    pub connections: Producer<ConnectionEvent>,
    /// Lost connections.
    pub disconnections: Producer<ConnectionEvent>,
}

/// Builds a fresh set of server queues.
#[must_use]
pub fn server_link(caps: &QueueCapacities) -> (ServerLink, ServerEngineLink) {
    let (outgoing_tx, outgoing_rx) = queue::bounded("server.outgoing", caps.packet_capacity);
    let (commands_tx, commands_rx) = queue::bounded("server.commands", caps.command_capacity);
    let (incoming_tx, incoming_rx) = queue::bounded("server.incoming", caps.packet_capacity);
    let (connect_tx, connect_rx) = queue::bounded("server.connections", caps.event_capacity);
    let (disconnect_tx, disconnect_rx) =
        queue::bounded("server.disconnections", caps.event_capacity);

    (
        ServerLink {
            outgoing: outgoing_tx,
            commands: commands_tx,
            incoming: incoming_rx,
            connections: connect_rx,
            disconnections: disconnect_rx,
        },
        ServerEngineLink {
            outgoing: outgoing_rx,
            commands: commands_rx,
            incoming: incoming_tx,
            connections: connect_tx,
            disconnections: disconnect_tx,
        },
    )
}

/// Tick-loop end of the client queues.
#[derive(Debug)]
pub struct ClientLink {
    /// Sends to the server.
    pub outgoing: Producer<OutgoingPacket>,
    /// Control signals.
    pub commands: Producer<Command>,
    /// Received packets.
    pub incoming: Consumer<IncomingPacket>,
    /// Connect and disconnect notifications.
    pub connections: Consumer<ConnectionEvent>,
    /// Link statistics.
    pub status: Consumer<ClientStatus>,
}

/// Engine end of the client queues.
#[derive(Debug)]
pub struct ClientEngineLink {
    /// Sends to the server.
    pub outgoing: Consumer<OutgoingPacket>,
    /// Control signals.
    pub commands: Consumer<Command>,
    /// Received packets.
    pub incoming: Producer<IncomingPacket>,
    /// Connect and disconnect notifications.
    pub connections: Producer<ConnectionEvent>,
    /// Link statistics.
    pub status: Producer<ClientStatus>,
}

/// Builds a fresh set of client queues.
#[must_use]
pub fn client_link(caps: &QueueCapacities) -> (ClientLink, ClientEngineLink) {
    let (outgoing_tx, outgoing_rx) = queue::bounded("client.outgoing", caps.packet_capacity);
    let (commands_tx, commands_rx) = queue::bounded("client.commands", caps.command_capacity);
    let (incoming_tx, incoming_rx) = queue::bounded("client.incoming", caps.packet_capacity);
    let (connect_tx, connect_rx) = queue::bounded("client.connections", caps.event_capacity);
    let (status_tx, status_rx) = queue::bounded("client.status", caps.status_capacity);

    (
        ClientLink {
            outgoing: outgoing_tx,
            commands: commands_tx,
            incoming: incoming_rx,
            connections: connect_rx,
            status: status_rx,
        },
        ClientEngineLink {
            outgoing: outgoing_rx,
            commands: commands_rx,
            incoming: incoming_tx,
            connections: connect_tx,
            status: status_tx,
        },
    )
}
