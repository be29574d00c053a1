//! # Client Bridge
//!
//! Owns the client engine, the tick-loop end of the client queues and the
//! client scratch buffer, and tracks the session phase.
//!
//! ## Drain Order (once per tick)
//!
//! ```text
//! 1. connection events -> Connected / Disconnected transitions + callbacks
//! 2. incoming          -> stage payload, on_data(bytes, channel)
//!                         (skipped while ignoring data after a disconnect)
//! 3. status            -> keep only the newest snapshot
//! ```
//!
//! ## Session Phases
//!
//! ```text
//! Disconnected --connect()--> Connecting --event--> Connected
//!      ^                                               |
//!      +----event---- Disconnecting <--disconnect()----+
//! ```

mod target;

pub use target::{ConnectTarget, SCHEME};

use crate::channel::ChannelTable;
use crate::config::BridgeConfig;
use crate::engine::{ClientEngine, ClientParams};
use crate::error::BridgeResult;
use crate::link::{client_link, ClientLink};
use crate::listener::ClientListener;
use crate::packet::{ClientStatus, Command, EventKind, OutgoingPacket};
use crate::scratch::ScratchBuffer;
use crate::tick::TickGuard;

/// Client session phase.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// Engine started, waiting for the server.
    Connecting,
    /// Link is up.
    Connected,
    /// Stop requested, waiting for the engine to confirm.
    Disconnecting,
    /// No link.
    #[default]
    Disconnected,
}

/// Tick-driven client side of the bridge.
pub struct ClientBridge<E: ClientEngine> {
    config: BridgeConfig,
    channels: ChannelTable,
    engine: E,
    link: Option<ClientLink>,
    scratch: ScratchBuffer,
    guard: TickGuard,
    state: ConnectionState,
    ignore_incoming: bool,
    latest_status: Option<ClientStatus>,
    target: Option<ConnectTarget>,
}

impl<E: ClientEngine> ClientBridge<E> {
    /// Creates a disconnected client. The config is validated here.
    #[must_use]
    pub fn new(config: BridgeConfig, engine: E) -> Self {
        let config = config.validate();
        Self {
            channels: config.channel_table(),
            scratch: ScratchBuffer::new(config.packet_buffer_capacity),
            guard: TickGuard::new(),
            link: None,
            state: ConnectionState::Disconnected,
            ignore_incoming: false,
            latest_status: None,
            target: None,
            engine,
            config,
        }
    }

    /// Starts connecting to `target` (`host`, `host:port`, `udp://host[:port]`).
    ///
    /// Connecting while a session is active is logged and ignored.
    ///
    /// # Errors
    ///
    /// `UnsupportedScheme` / `InvalidTarget` for malformed targets, or the
    /// engine's error if it cannot start.
    pub fn connect(&mut self, target: &str) -> BridgeResult<()> {
        let target = ConnectTarget::parse(target, self.config.port)?;

        if self.state != ConnectionState::Disconnected {
            tracing::error!("connect to {} while {:?}; ignoring", target, self.state);
            return Ok(());
        }
        if self.engine.is_alive() {
            tracing::error!("previous client backend still alive; stopping it");
            self.engine.stop();
        }

        let (link, engine_link) = client_link(&self.config.client.queues);
        let params = ClientParams {
            host: target.host.clone(),
            port: target.port,
            channels: self.channels.len(),
            poll_interval: self.config.poll_interval(),
            max_packet_size: self.config.max_packet_size,
        };
        self.engine.start(engine_link, &params)?;

        tracing::info!("connecting to {}", target);
        self.link = Some(link);
        self.state = ConnectionState::Connecting;
        self.latest_status = None;
        self.target = Some(target);
        Ok(())
    }

    /// Asks the engine to close the link.
    ///
    /// The state becomes `Disconnected` when the engine's disconnect event
    /// is drained; incoming data is ignored from now on.
    pub fn disconnect(&mut self) {
        let Some(link) = self.link.as_ref() else {
            tracing::error!("disconnect on a client that is not connected");
            return;
        };
        if matches!(self.state, ConnectionState::Disconnecting | ConnectionState::Disconnected) {
            tracing::debug!("disconnect while {:?}; nothing to do", self.state);
            return;
        }

        self.state = ConnectionState::Disconnecting;
        self.ignore_incoming = true;
        if let Err(e) = link.commands.enqueue(Command::Stop) {
            tracing::warn!("could not queue stop command: {}", e);
        }
        self.engine.stop();
    }

    /// Drains every client queue once and reports to `listener`.
    ///
    /// Further calls in the same frame are ignored until
    /// [`finish_frame`](Self::finish_frame).
    pub fn tick<L: ClientListener>(&mut self, listener: &mut L) {
        if !self.guard.should_run() {
            return;
        }
        let Some(link) = self.link.as_ref() else {
            return;
        };

        for event in link.connections.pending() {
            match event.kind {
                EventKind::Connected => {
                    self.state = ConnectionState::Connected;
                    self.ignore_incoming = false;
                    tracing::info!("connected to {}", event.addr);
                    listener.on_connected();
                }
                EventKind::Disconnected => {
                    self.state = ConnectionState::Disconnected;
                    self.ignore_incoming = true;
                    tracing::info!("disconnected from {}", event.addr);
                    listener.on_disconnected();
                }
                EventKind::Other(code) => {
                    tracing::warn!("unknown connection event kind {}; ignoring", code);
                }
            }
        }

        if self.ignore_incoming {
            if !link.incoming.is_empty() {
                tracing::debug!("ignoring {} packets after disconnect", link.incoming.len());
            }
        } else {
            let mut incoming = link.incoming.pending();
            while listener.is_active() {
                let Some(packet) = incoming.next() else {
                    break;
                };
                let staged = self.scratch.stage(packet.payload);
                listener.on_data(&staged, packet.channel);
            }
        }

        if let Some(status) = link.status.pending().last() {
            self.latest_status = Some(status);
        }

        if self.state == ConnectionState::Disconnected {
            self.link = None;
        }
        self.guard.mark_ran();
    }

    /// Opens the next frame for [`tick`](Self::tick).
    pub fn finish_frame(&mut self) {
        self.guard.reset();
    }

    /// Queues `payload` for the server on `channel`.
    ///
    /// Returns false (after logging) when not connected, the channel is
    /// invalid, the payload is too large, or the outgoing queue is full.
    pub fn send(&mut self, channel: usize, payload: &[u8]) -> bool {
        let Some(link) = self.link.as_ref() else {
            tracing::error!("send on a client that is not connected");
            return false;
        };
        if self.state != ConnectionState::Connected {
            tracing::error!("send while {:?}; dropping", self.state);
            return false;
        }

        let flags = match self.channels.flags_for(channel, payload.len()) {
            Ok(flags) => flags,
            Err(e) => {
                tracing::error!("dropping send: {}", e);
                return false;
            }
        };
        if payload.len() > self.config.max_packet_size {
            tracing::error!(
                "dropping send: {} bytes exceeds max packet size {}",
                payload.len(),
                self.config.max_packet_size
            );
            return false;
        }
        let Ok(channel) = u8::try_from(channel) else {
            tracing::error!("dropping send: channel {} not addressable", channel);
            return false;
        };

        link.outgoing
            .enqueue(OutgoingPacket {
                peer: None,
                channel,
                flags,
                payload: payload.to_vec(),
            })
            .is_ok()
    }

    /// Asks the engine for a status snapshot; it shows up in
    /// [`latest_status`](Self::latest_status) after a later tick.
    pub fn request_status(&mut self) -> bool {
        let Some(link) = self.link.as_ref() else {
            tracing::error!("status request on a client that is not connected");
            return false;
        };
        link.commands.enqueue(Command::RequestStatus).is_ok()
    }

    /// Session phase.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Returns true while a session is in progress.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.link.is_some() && self.engine.is_alive()
    }

    /// Newest status snapshot, if any arrived this session.
    #[must_use]
    pub const fn latest_status(&self) -> Option<&ClientStatus> {
        self.latest_status.as_ref()
    }

    /// Target of the current or last session.
    #[must_use]
    pub const fn target(&self) -> Option<&ConnectTarget> {
        self.target.as_ref()
    }

    /// Validated channel table.
    #[must_use]
    pub const fn channels(&self) -> &ChannelTable {
        &self.channels
    }

    /// Scratch buffer statistics.
    #[must_use]
    pub const fn scratch(&self) -> &ScratchBuffer {
        &self.scratch
    }

    /// The engine.
    #[must_use]
    pub const fn engine(&self) -> &E {
        &self.engine
    }
}

impl<E: ClientEngine> Drop for ClientBridge<E> {
    fn drop(&mut self) {
        if self.link.is_some() {
            self.disconnect();
        }
    }
}
