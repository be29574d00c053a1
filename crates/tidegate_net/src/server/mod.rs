//! # Server Bridge
//!
//! Owns the server engine, the tick-loop end of the server queues, the peer
//! registry and the server scratch buffer.
//!
//! ## Drain Order (once per tick)
//!
//! ```text
//! 1. connections     -> record peer, on_connected(id)
//! 2. incoming        -> stage payload, on_data(id, bytes, channel)
//!                       (stops early if the listener goes inactive)
//! 3. disconnections  -> clear peer, on_disconnected(id)
//! ```
//!
//! Sends and kicks are queued for the engine thread; a kick takes effect
//! when the resulting disconnection event is drained.

use crate::channel::ChannelTable;
use crate::config::BridgeConfig;
use crate::engine::{ServerEngine, ServerParams};
use crate::error::BridgeResult;
use crate::identity::{to_logical, to_native, ConnectionId};
use crate::link::{server_link, ServerLink};
use crate::listener::ServerListener;
use crate::packet::{Command, EventKind, OutgoingPacket};
use crate::peers::{PeerRegistry, UNAVAILABLE};
use crate::scratch::ScratchBuffer;
use crate::tick::TickGuard;

/// Tick-driven server side of the bridge.
pub struct ServerBridge<E: ServerEngine> {
    config: BridgeConfig,
    channels: ChannelTable,
    engine: E,
    link: Option<ServerLink>,
    peers: PeerRegistry,
    scratch: ScratchBuffer,
    guard: TickGuard,
}

impl<E: ServerEngine> ServerBridge<E> {
    /// Creates a stopped server. The config is validated here.
    #[must_use]
    pub fn new(config: BridgeConfig, engine: E) -> Self {
        let config = config.validate();
        Self {
            channels: config.channel_table(),
            peers: PeerRegistry::new(config.max_peers),
            scratch: ScratchBuffer::new(config.packet_buffer_capacity),
            guard: TickGuard::new(),
            link: None,
            engine,
            config,
        }
    }

    /// Builds fresh queues and starts the engine.
    ///
    /// Starting a running server is a no-op.
    ///
    /// # Errors
    ///
    /// Whatever the engine reports when it cannot start.
    pub fn start(&mut self) -> BridgeResult<()> {
        if self.link.is_some() {
            if self.engine.is_alive() {
                tracing::warn!("server already running");
                return Ok(());
            }
            tracing::error!("server backend died unexpectedly; rebuilding it");
            self.link = None;
        }

        let (link, engine_link) = server_link(&self.config.server.queues);
        self.peers = PeerRegistry::new(self.config.max_peers);
        self.engine.start(engine_link, &ServerParams::from_config(&self.config))?;
        self.link = Some(link);
        tracing::info!(
            "server started on {}:{} ({} peers, {} channels)",
            self.config.bind_address,
            self.config.port,
            self.config.max_peers,
            self.channels.len()
        );
        Ok(())
    }

    /// Asks the engine to stop and releases the queues.
    pub fn shutdown(&mut self) {
        let Some(link) = self.link.take() else {
            tracing::debug!("shutdown on a server that is not running");
            return;
        };
        if let Err(e) = link.commands.enqueue(Command::Stop) {
            tracing::warn!("could not queue stop command: {}", e);
        }
        self.engine.stop();
        self.peers.clear_all();
        tracing::info!("server stopped");
    }

    /// Returns true while the server has queues and a live engine.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.link.is_some() && self.engine.is_alive()
    }

    /// Drains every server queue once and reports to `listener`.
    ///
    /// Further calls in the same frame are ignored until
    /// [`finish_frame`](Self::finish_frame).
    pub fn tick<L: ServerListener>(&mut self, listener: &mut L) {
        if !self.guard.should_run() {
            return;
        }
        let Some(link) = self.link.as_ref() else {
            return;
        };

        for event in link.connections.pending() {
            match event.kind {
                EventKind::Connected => {
                    let connection = to_logical(event.peer);
                    self.peers.record(event.peer, event.addr);
                    tracing::info!(
                        "{} connected from {} as {}",
                        event.peer,
                        event.addr,
                        connection
                    );
                    listener.on_connected(connection);
                }
                other => tracing::warn!(
                    "unexpected {:?} event for {} on the connection queue; ignoring",
                    other,
                    event.peer
                ),
            }
        }

        let mut incoming = link.incoming.pending();
        while listener.is_active() {
            let Some(packet) = incoming.next() else {
                break;
            };
            let connection = to_logical(packet.peer);
            let staged = self.scratch.stage(packet.payload);
            listener.on_data(connection, &staged, packet.channel);
        }
        if !listener.is_active() && !link.incoming.is_empty() {
            tracing::debug!(
                "listener inactive; leaving {} packets for the next tick",
                link.incoming.len()
            );
        }

        for event in link.disconnections.pending() {
            if event.kind != EventKind::Disconnected {
                tracing::warn!(
                    "unexpected {:?} event for {} on the disconnection queue; ignoring",
                    event.kind,
                    event.peer
                );
                continue;
            }
            let connection = to_logical(event.peer);
            self.peers.clear(event.peer);
            tracing::info!("{} disconnected", connection);
            listener.on_disconnected(connection);
        }

        self.guard.mark_ran();
    }

    /// Opens the next frame for [`tick`](Self::tick).
    pub fn finish_frame(&mut self) {
        self.guard.reset();
    }

    /// Queues `payload` for `connection` on `channel`.
    ///
    /// Returns false (after logging) when the server is not running, the
    /// channel or connection is invalid, the payload is too large, or the
    /// outgoing queue is full.
    pub fn send(&mut self, connection: ConnectionId, channel: usize, payload: &[u8]) -> bool {
        let Some(link) = self.link.as_ref() else {
            tracing::error!("send to {} on a server that is not running", connection);
            return false;
        };

        let flags = match self.channels.flags_for(channel, payload.len()) {
            Ok(flags) => flags,
            Err(e) => {
                tracing::error!("dropping send to {}: {}", connection, e);
                return false;
            }
        };
        if payload.len() > self.config.max_packet_size {
            tracing::error!(
                "dropping send to {}: {} bytes exceeds max packet size {}",
                connection,
                payload.len(),
                self.config.max_packet_size
            );
            return false;
        }
        let peer = match to_native(connection) {
            Ok(peer) => peer,
            Err(e) => {
                tracing::error!("dropping send: {}", e);
                return false;
            }
        };
        let Ok(channel) = u8::try_from(channel) else {
            tracing::error!("dropping send to {}: channel {} not addressable", connection, channel);
            return false;
        };

        link.outgoing
            .enqueue(OutgoingPacket {
                peer: Some(peer),
                channel,
                flags,
                payload: payload.to_vec(),
            })
            .is_ok()
    }

    /// Asks the engine to disconnect `connection`.
    ///
    /// The peer stays in the registry until its disconnection event is
    /// drained.
    pub fn disconnect(&mut self, connection: ConnectionId) -> bool {
        let Some(link) = self.link.as_ref() else {
            tracing::error!("disconnect {} on a server that is not running", connection);
            return false;
        };
        match to_native(connection) {
            Ok(peer) => link.commands.enqueue(Command::Kick(peer)).is_ok(),
            Err(e) => {
                tracing::error!("cannot disconnect: {}", e);
                false
            }
        }
    }

    /// `"ip:port"` of a connected peer (`"[ip]:port"` for IPv6), `"(unavailable)"`
    /// otherwise.
    #[must_use]
    pub fn connection_address(&self, connection: ConnectionId) -> String {
        to_native(connection)
            .map_or_else(|_| UNAVAILABLE.to_string(), |peer| self.peers.address_of(peer))
    }

    /// Number of peers currently in the registry.
    #[must_use]
    pub fn connected_peers(&self) -> usize {
        self.peers.connected()
    }

    /// Peer registry.
    #[must_use]
    pub const fn peers(&self) -> &PeerRegistry {
        &self.peers
    }

    /// Validated channel table.
    #[must_use]
    pub const fn channels(&self) -> &ChannelTable {
        &self.channels
    }

    /// Validated configuration.
    #[must_use]
    pub const fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Scratch buffer statistics.
    #[must_use]
    pub const fn scratch(&self) -> &ScratchBuffer {
        &self.scratch
    }

    /// Tick guard statistics.
    #[must_use]
    pub const fn tick_guard(&self) -> &TickGuard {
        &self.guard
    }

    /// The engine.
    #[must_use]
    pub const fn engine(&self) -> &E {
        &self.engine
    }
}

impl<E: ServerEngine> Drop for ServerBridge<E> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::PacketFlags;
    use crate::identity::NativePeerId;
    use crate::link::ServerEngineLink;
    use crate::listener::ServerEvent;
    use crate::packet::{ConnectionEvent, IncomingPacket};
    use std::net::SocketAddr;

    /// Engine that does nothing on its own; tests play the engine thread.
    #[derive(Default)]
    struct ManualEngine {
        link: Option<ServerEngineLink>,
        alive: bool,
        stops: usize,
    }

    impl ServerEngine for ManualEngine {
        fn start(&mut self, link: ServerEngineLink, _params: &ServerParams) -> BridgeResult<()> {
            self.link = Some(link);
            self.alive = true;
            Ok(())
        }

        fn stop(&mut self) {
            self.alive = false;
            self.stops += 1;
        }

        fn is_alive(&self) -> bool {
            self.alive
        }
    }

    fn addr() -> SocketAddr {
        "10.1.2.3:4567".parse().unwrap()
    }

    fn started(config: BridgeConfig) -> ServerBridge<ManualEngine> {
        let mut server = ServerBridge::new(config, ManualEngine::default());
        server.start().unwrap();
        server
    }

    fn engine(server: &ServerBridge<ManualEngine>) -> &ServerEngineLink {
        server.engine().link.as_ref().unwrap()
    }

    fn incoming(peer: u32, payload: &[u8], channel: u8) -> IncomingPacket {
        IncomingPacket {
            peer: NativePeerId(peer),
            channel,
            payload: payload.to_vec(),
        }
    }

    #[test]
    fn test_connect_and_disconnect_in_one_tick() {
        let mut server = started(BridgeConfig { max_peers: 8, ..BridgeConfig::default() });
        let link = engine(&server);
        link.connections.enqueue(ConnectionEvent::connected(NativePeerId(5), addr())).unwrap();
        link.disconnections
            .enqueue(ConnectionEvent::disconnected(NativePeerId(5), addr()))
            .unwrap();

        let mut events = Vec::new();
        server.tick(&mut events);

        assert_eq!(
            events,
            vec![
                ServerEvent::Connected(ConnectionId(6)),
                ServerEvent::Disconnected(ConnectionId(6)),
            ]
        );
        assert!(server.peers().get(NativePeerId(5)).is_none());
        assert_eq!(server.connection_address(ConnectionId(6)), UNAVAILABLE);
    }

    #[test]
    fn test_data_is_delivered_with_logical_id() {
        let mut server = started(BridgeConfig::default());
        let payload: Vec<u8> = (0..50).collect();
        engine(&server).incoming.enqueue(incoming(0, &payload, 1)).unwrap();

        let mut events = Vec::new();
        server.tick(&mut events);

        assert_eq!(
            events,
            vec![ServerEvent::Data { connection: ConnectionId(1), payload, channel: 1 }]
        );
    }

    #[test]
    fn test_oversized_payload_falls_back() {
        let mut server = started(BridgeConfig {
            packet_buffer_capacity: 8,
            ..BridgeConfig::default()
        });
        engine(&server).incoming.enqueue(incoming(0, &[9; 100], 0)).unwrap();
        engine(&server).incoming.enqueue(incoming(0, &[1; 4], 0)).unwrap();

        let mut events = Vec::new();
        server.tick(&mut events);

        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], ServerEvent::Data { payload, .. } if payload.len() == 100));
        assert_eq!(server.scratch().oversized_count(), 1);
    }

    #[test]
    fn test_address_lookup() {
        let mut server = started(BridgeConfig::default());
        engine(&server)
            .connections
            .enqueue(ConnectionEvent::connected(NativePeerId(0), addr()))
            .unwrap();
        server.tick(&mut Vec::new());

        assert_eq!(server.connection_address(ConnectionId(1)), "10.1.2.3:4567");
        assert_eq!(server.connection_address(ConnectionId(2)), UNAVAILABLE);
        assert_eq!(server.connection_address(ConnectionId::NONE), UNAVAILABLE);
        assert_eq!(server.connected_peers(), 1);
    }

    #[test]
    fn test_tick_runs_once_per_frame() {
        let mut server = started(BridgeConfig::default());
        let mut events = Vec::new();

        engine(&server)

            .connections

            .enqueue(ConnectionEvent::connected(NativePeerId(0), addr()))

            .unwrap();
        server.tick(&mut events);
        engine(&server)
            .connections
            .enqueue(ConnectionEvent::connected(NativePeerId(1), addr()))
            .unwrap();
        server.tick(&mut events);
        assert_eq!(events.len(), 1);
        assert_eq!(server.tick_guard().collapsed(), 1);

        server.finish_frame();
        server.tick(&mut events);
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_empty_tick() {
        let mut server = started(BridgeConfig::default());
        let mut events = Vec::new();
        server.tick(&mut events);
        assert!(events.is_empty());
        assert_eq!(server.connected_peers(), 0);
    }

    #[test]
    fn test_inactive_listener_stops_incoming_drain() {
        struct Budgeted {
            received: usize,
            budget: usize,
        }

        impl ServerListener for Budgeted {
            fn on_connected(&mut self, _connection: ConnectionId) {}
            fn on_data(&mut self, _connection: ConnectionId, _payload: &[u8], _channel: u8) {
                self.received += 1;
            }
            fn on_disconnected(&mut self, _connection: ConnectionId) {}
            fn is_active(&self) -> bool {
                self.received < self.budget
            }
        }

        let mut server = started(BridgeConfig::default());
        for i in 0..3 {
            engine(&server).incoming.enqueue(incoming(0, &[i], 1)).unwrap();
        }

        let mut listener = Budgeted { received: 0, budget: 1 };
        server.tick(&mut listener);
        assert_eq!(listener.received, 1);
        assert_eq!(engine(&server).incoming.len(), 2);

        server.finish_frame();
        listener.budget = 10;
        server.tick(&mut listener);
        assert_eq!(listener.received, 3);
    }

    #[test]
    fn test_unexpected_event_kind_is_ignored() {
        let mut server = started(BridgeConfig::default());
        let mut odd = ConnectionEvent::connected(NativePeerId(0), addr());
        odd.kind = EventKind::Other(42);
        engine(&server).connections.enqueue(odd).unwrap();
        engine(&server)
            .connections
            .enqueue(ConnectionEvent::connected(NativePeerId(1), addr()))
            .unwrap();
        let mut stray = ConnectionEvent::connected(NativePeerId(1), addr());
        stray.kind = EventKind::Other(7);
        engine(&server).disconnections.enqueue(stray).unwrap();

        let mut events = Vec::new();
        server.tick(&mut events);
        assert_eq!(events, vec![ServerEvent::Connected(ConnectionId(2))]);
        assert_eq!(server.connected_peers(), 1);
    }

    #[test]
    fn test_send_translates_and_flags() {
        let mut server = started(BridgeConfig::default());
        assert!(server.send(ConnectionId(3), 0, b"hi"));

        let packet = engine(&server).outgoing.try_dequeue().unwrap();
        assert_eq!(packet.peer, Some(NativePeerId(2)));
        assert_eq!(packet.channel, 0);
        assert_eq!(packet.flags, PacketFlags::RELIABLE);
        assert_eq!(packet.payload, b"hi");
    }

    #[test]
    fn test_send_out_of_range_channel_is_dropped() {
        let mut server = started(BridgeConfig::default());
        let len = server.channels().len();
        assert!(!server.send(ConnectionId(1), len, b"nope"));
        assert!(engine(&server).outgoing.is_empty());
    }

    #[test]
    fn test_send_to_connection_zero_is_dropped() {
        let mut server = started(BridgeConfig::default());
        assert!(!server.send(ConnectionId::NONE, 0, b"nope"));
        assert!(engine(&server).outgoing.is_empty());
    }

    #[test]
    fn test_send_over_max_packet_size_is_dropped() {
        let mut server = started(BridgeConfig { max_packet_size: 16, ..BridgeConfig::default() });
        assert!(!server.send(ConnectionId(1), 0, &[0; 17]));
        assert!(server.send(ConnectionId(1), 0, &[0; 16]));
    }

    #[test]
    fn test_disconnect_queues_kick() {
        let mut server = started(BridgeConfig::default());
        engine(&server)
            .connections
            .enqueue(ConnectionEvent::connected(NativePeerId(0), addr()))
            .unwrap();
        server.tick(&mut Vec::new());

        assert!(server.disconnect(ConnectionId(1)));
        assert_eq!(engine(&server).commands.try_dequeue(), Some(Command::Kick(NativePeerId(0))));
        // Removal waits for the engine's disconnection event.
        assert_eq!(server.connected_peers(), 1);
    }

    #[test]
    fn test_not_started_is_noop() {
        let mut server = ServerBridge::new(BridgeConfig::default(), ManualEngine::default());
        assert!(!server.is_running());
        assert!(!server.send(ConnectionId(1), 0, b"x"));
        assert!(!server.disconnect(ConnectionId(1)));

        let mut events = Vec::new();
        server.tick(&mut events);
        assert!(events.is_empty());
    }

    #[test]
    fn test_shutdown_queues_stop() {
        let mut server = started(BridgeConfig::default());
        engine(&server)
            .connections
            .enqueue(ConnectionEvent::connected(NativePeerId(0), addr()))
            .unwrap();
        server.tick(&mut Vec::new());

        server.shutdown();
        assert!(!server.is_running());
        assert_eq!(server.connected_peers(), 0);
        assert_eq!(server.engine().stops, 1);
        assert_eq!(engine(&server).commands.try_dequeue(), Some(Command::Stop));
    }

    #[test]
    fn test_restart_after_engine_death() {
        let mut server = started(BridgeConfig::default());
        server.engine.alive = false;
        assert!(!server.is_running());

        server.start().unwrap();
        assert!(server.is_running());
    }
}
