//! # Consumer Callbacks
//!
//! The dispatch loop reports everything it drains through these traits,
//! synchronously, on the tick-loop thread, in queue order.
//!
//! Payload slices borrow the role's scratch buffer and are only valid for
//! the duration of the call. Copy them out to keep them.
//!
//! `Vec<ServerEvent>` and `Vec<ClientEvent>` implement the traits by
//! recording owned copies, for consumers that prefer a message stream over
//! callbacks.

use crate::identity::ConnectionId;

/// Server-side callbacks.
pub trait ServerListener {
    /// A peer connected.
    fn on_connected(&mut self, connection: ConnectionId);

    /// A peer sent data.
    fn on_data(&mut self, connection: ConnectionId, payload: &[u8], channel: u8);

    /// A peer disconnected.
    fn on_disconnected(&mut self, connection: ConnectionId);

    /// Returning false stops the incoming drain until the next tick.
    fn is_active(&self) -> bool {
        true
    }
}

/// Client-side callbacks.
pub trait ClientListener {
    /// The link to the server is up.
    fn on_connected(&mut self);

    /// The server sent data.
    fn on_data(&mut self, payload: &[u8], channel: u8);

    /// The link to the server is gone.
    fn on_disconnected(&mut self);

    /// Returning false stops the incoming drain until the next tick.
    fn is_active(&self) -> bool {
        true
    }
}

/// Owned record of a server callback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServerEvent {
    /// See [`ServerListener::on_connected`].
    Connected(ConnectionId),
    /// See [`ServerListener::on_data`].
    Data {
        /// Sender.
        connection: ConnectionId,
        /// Copied payload.
        payload: Vec<u8>,
        /// Channel index.
        channel: u8,
    },
    /// See [`ServerListener::on_disconnected`].
    Disconnected(ConnectionId),
}

impl ServerListener for Vec<ServerEvent> {
    fn on_connected(&mut self, connection: ConnectionId) {
        self.push(ServerEvent::Connected(connection));
    }

    fn on_data(&mut self, connection: ConnectionId, payload: &[u8], channel: u8) {
        self.push(ServerEvent::Data {
            connection,
            payload: payload.to_vec(),
            channel,
        });
    }

    fn on_disconnected(&mut self, connection: ConnectionId) {
        self.push(ServerEvent::Disconnected(connection));
    }
}

/// Owned record of a client callback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientEvent {
    /// See [`ClientListener::on_connected`].
    Connected,
    /// See [`ClientListener::on_data`].
    Data {
        /// Copied payload.
        payload: Vec<u8>,
        /// Channel index.
        channel: u8,
    },
    /// See [`ClientListener::on_disconnected`].
    Disconnected,
}

impl ClientListener for Vec<ClientEvent> {
    fn on_connected(&mut self) {
        self.push(ClientEvent::Connected);
    }

    fn on_data(&mut self, payload: &[u8], channel: u8) {
        self.push(ClientEvent::Data {
            payload: payload.to_vec(),
            channel,
        });
    }

    fn on_disconnected(&mut self) {
        self.push(ClientEvent::Disconnected);
    }
}
