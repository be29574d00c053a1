//! # Loopback Engine
//!
//! In-process engine pair: servers register on a shared [`LoopbackHub`] by
//! port, clients look them up and exchange typed messages over crossbeam
//! channels. Each engine runs its own thread and talks to the bridge only
//! through its engine link, exactly like a socket-backed engine would.
//!
//! ## Threads
//!
//! ```text
//! ClientBridge ⇄ [client link] ⇄ client thread ─┐
//! ClientBridge ⇄ [client link] ⇄ client thread ─┼─▶ server thread ⇄ [server link] ⇄ ServerBridge
//! ClientBridge ⇄ [client link] ⇄ client thread ─┘
//! ```
//!
//! No wire format, no loss, no reordering: the point is to exercise the
//! queue protocol, not a transport.

use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;

use super::{ClientEngine, ClientParams, ServerEngine, ServerParams};
use crate::error::{BridgeError, BridgeResult};
use crate::packet::EventKind;
use crate::queue::Producer;
use crate::identity::NativePeerId;
use crate::link::{ClientEngineLink, ServerEngineLink};
use crate::packet::{ClientStatus, Command, ConnectionEvent, IncomingPacket};

/// How long a client waits for the server to accept it.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// First port handed out to loopback clients.
const FIRST_CLIENT_PORT: u16 = 50_000;

/// Peer id clients report for the server.
const SERVER_PEER: NativePeerId = NativePeerId(0);

/// Client -> server traffic.
enum ToServer {
    Connect { addr: SocketAddr, reply: Sender<ToClient> },
    Data { addr: SocketAddr, channel: u8, payload: Vec<u8> },
    Disconnect { addr: SocketAddr },
}

/// Server -> client traffic.
enum ToClient {
    Accepted(NativePeerId),
    Rejected,
    Data { channel: u8, payload: Vec<u8> },
    Disconnected,
}

#[derive(Default)]
struct HubInner {
    servers: Mutex<HashMap<u16, Sender<ToServer>>>,
    next_port: AtomicU16,
}

/// Shared registry of listening loopback servers.
///
/// Cloning is cheap; every clone sees the same servers.
#[derive(Clone, Default)]
pub struct LoopbackHub {
    inner: Arc<HubInner>,
}

impl LoopbackHub {
    /// Creates an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if a server is registered on `port`.
    #[must_use]
    pub fn is_listening(&self, port: u16) -> bool {
        self.inner.servers.lock().contains_key(&port)
    }

    fn register(&self, port: u16, inbox: Sender<ToServer>) -> BridgeResult<()> {
        let mut servers = self.inner.servers.lock();
        if servers.contains_key(&port) {
            return Err(BridgeError::EngineStart(format!("loopback port {port} already in use")));
        }
        servers.insert(port, inbox);
        Ok(())
    }

    fn unregister(&self, port: u16) {
        self.inner.servers.lock().remove(&port);
    }

    fn lookup(&self, port: u16) -> Option<Sender<ToServer>> {
        self.inner.servers.lock().get(&port).cloned()
    }

    fn allocate_addr(&self) -> SocketAddr {
        let offset = self.inner.next_port.fetch_add(1, Ordering::Relaxed);
        SocketAddr::new(
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            FIRST_CLIENT_PORT.wrapping_add(offset),
        )
    }
}

/// Thread bookkeeping shared by both engines.
#[derive(Default)]
struct Worker {
    alive: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    fn spawn(&mut self, name: &str, body: impl FnOnce() + Send + 'static) -> BridgeResult<()> {
        self.join();
        self.shutdown.store(false, Ordering::Release);
        self.alive.store(true, Ordering::Release);

        let alive = Arc::clone(&self.alive);
        let spawned = thread::Builder::new().name(name.to_string()).spawn(move || {
            body();
            alive.store(false, Ordering::Release);
        });

        match spawned {
            Ok(handle) => {
                self.thread = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.alive.store(false, Ordering::Release);
                Err(BridgeError::EngineStart(e.to_string()))
            }
        }
    }

    fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        self.join();
    }

    fn join(&mut self) {
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                tracing::error!("loopback engine thread panicked");
            }
        }
    }
}

// ============================================================================
// SERVER
// ============================================================================

/// Loopback server engine.
pub struct LoopbackServerEngine {
    hub: LoopbackHub,
    worker: Worker,
}

impl LoopbackServerEngine {
    /// Creates a stopped server engine on `hub`.
    #[must_use]
    pub fn new(hub: LoopbackHub) -> Self {
        Self {
            hub,
            worker: Worker::default(),
        }
    }
}

impl ServerEngine for LoopbackServerEngine {
    fn start(&mut self, link: ServerEngineLink, params: &ServerParams) -> BridgeResult<()> {
        if self.worker.is_alive() {
            return Err(BridgeError::EngineStart("loopback server already running".to_string()));
        }

        let (inbox_tx, inbox_rx) = crossbeam_channel::unbounded();
        self.hub.register(params.port, inbox_tx)?;

        let state = ServerThread {
            link,
            inbox: inbox_rx,
            peers: (0..params.max_peers).map(|_| None).collect(),
            backlog: VecDeque::new(),
            retiring: Vec::new(),
            poll_interval: params.poll_interval,
            hub: self.hub.clone(),
            port: params.port,
            shutdown: Arc::clone(&self.worker.shutdown),
        };

        if let Err(e) = self.worker.spawn("tidegate-loopback-server", move || state.run()) {
            self.hub.unregister(params.port);
            return Err(e);
        }
        tracing::info!(
            "loopback server listening on {}:{} ({} peers)",
            params.bind_address,
            params.port,
            params.max_peers
        );
        Ok(())
    }

    fn stop(&mut self) {
        self.worker.stop();
    }

    fn is_alive(&self) -> bool {
        self.worker.is_alive()
    }
}

impl Drop for LoopbackServerEngine {
    fn drop(&mut self) {
        self.worker.stop();
    }
}

struct RemotePeer {
    addr: SocketAddr,
    reply: Sender<ToClient>,
}

struct ServerThread {
    link: ServerEngineLink,
    inbox: Receiver<ToServer>,
    peers: Vec<Option<RemotePeer>>,
    /// Lifecycle events the bridge has not accepted yet, oldest first.
    backlog: VecDeque<ConnectionEvent>,
    /// Freed slots whose disconnection the bridge may not have seen yet.
    retiring: Vec<usize>,
    poll_interval: Duration,
    hub: LoopbackHub,
    port: u16,
    shutdown: Arc<AtomicBool>,
}

impl ServerThread {
    fn run(mut self) {
        while !self.shutdown.load(Ordering::Acquire) && self.drain_commands() {
            self.flush_backlog();
            if self.backlog.is_empty() && self.link.disconnections.is_empty() {
                self.retiring.clear();
            }
            self.drain_outgoing();
            self.drain_inbox();
            thread::sleep(self.poll_interval);
        }

        for remote in self.peers.iter().flatten() {
            let _ = remote.reply.send(ToClient::Disconnected);
        }
        self.hub.unregister(self.port);
        tracing::info!("loopback server on port {} stopped", self.port);
    }

    /// Returns false once a stop command arrives.
    fn drain_commands(&mut self) -> bool {
        while let Some(command) = self.link.commands.try_dequeue() {
            match command {
                Command::Stop => return false,
                Command::Kick(peer) => self.kick(peer),
                Command::RequestStatus => tracing::debug!("loopback server publishes no status"),
            }
        }
        true
    }

    fn kick(&mut self, peer: NativePeerId) {
        let Some(remote) = self.peers.get_mut(peer.index()).and_then(Option::take) else {
            tracing::debug!("kick for unknown {}", peer);
            return;
        };
        let _ = remote.reply.send(ToClient::Disconnected);
        self.retire(peer, remote.addr);
    }

    /// Publishes a disconnection and holds the slot back from reuse until
    /// the bridge has drained it, so a new peer in the same slot is never
    /// reported before the old one is gone.
    fn retire(&mut self, peer: NativePeerId, addr: SocketAddr) {
        self.retiring.push(peer.index());
        self.publish(ConnectionEvent::disconnected(peer, addr));
    }

    /// Hands a lifecycle event to the bridge, or parks it until the
    /// bridge has drained its event queue. Order is preserved.
    fn publish(&mut self, event: ConnectionEvent) {
        if !self.backlog.is_empty() {
            self.backlog.push_back(event);
            return;
        }
        if let Err(BridgeError::QueueFull { .. }) = self.enqueue_event(event) {
            self.backlog.push_back(event);
        }
    }

    fn flush_backlog(&mut self) {
        while let Some(&event) = self.backlog.front() {
            let queue = event_queue(&self.link, event.kind);
            if queue.len() >= queue.capacity() {
                tracing::debug!("{} lifecycle events waiting for the bridge", self.backlog.len());
                return;
            }
            self.backlog.pop_front();
            if let Err(BridgeError::QueueFull { .. }) = queue.enqueue(event) {
                self.backlog.push_front(event);
                return;
            }
        }
    }

    fn enqueue_event(&self, event: ConnectionEvent) -> BridgeResult<()> {
        event_queue(&self.link, event.kind).enqueue(event)
    }

    fn drain_outgoing(&mut self) {
        while let Some(packet) = self.link.outgoing.try_dequeue() {
            let target = packet
                .peer
                .and_then(|peer| self.peers.get(peer.index()))
                .and_then(Option::as_ref);
            match target {
                Some(remote) => {
                    let _ = remote.reply.send(ToClient::Data {
                        channel: packet.channel,
                        payload: packet.payload,
                    });
                }
                None => tracing::trace!("dropping packet for {:?}", packet.peer),
            }
        }
    }

    fn drain_inbox(&mut self) {
        while let Ok(message) = self.inbox.try_recv() {
            match message {
                ToServer::Connect { addr, reply } => self.accept(addr, reply),
                ToServer::Data { addr, channel, payload } => match self.find(addr) {
                    Some(peer) => {
                        let packet = IncomingPacket { peer, channel, payload };
                        let _ = self.link.incoming.enqueue(packet);
                    }
                    None => tracing::trace!("data from unknown {}", addr),
                },
                ToServer::Disconnect { addr } => {
                    if let Some(peer) = self.find(addr) {
                        self.peers[peer.index()] = None;
                        self.retire(peer, addr);
                    }
                }
            }
        }
    }

    fn accept(&mut self, addr: SocketAddr, reply: Sender<ToClient>) {
        let free = self
            .peers
            .iter()
            .enumerate()
            .position(|(slot, remote)| remote.is_none() && !self.retiring.contains(&slot))
            .and_then(|slot| u32::try_from(slot).ok().map(|id| (slot, NativePeerId(id))));
        let Some((slot, peer)) = free else {
            tracing::warn!("loopback server on port {} is full; rejecting {}", self.port, addr);
            let _ = reply.send(ToClient::Rejected);
            return;
        };

        let _ = reply.send(ToClient::Accepted(peer));
        self.peers[slot] = Some(RemotePeer { addr, reply });
        self.publish(ConnectionEvent::connected(peer, addr));
    }

    fn find(&self, addr: SocketAddr) -> Option<NativePeerId> {
        self.peers
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|remote| remote.addr == addr))
            .and_then(|slot| u32::try_from(slot).ok())
            .map(NativePeerId)
    }
}

/// Queue a lifecycle event of `kind` travels on.
fn event_queue(link: &ServerEngineLink, kind: EventKind) -> &Producer<ConnectionEvent> {
    match kind {
        EventKind::Disconnected => &link.disconnections,
        _ => &link.connections,
    }
}

// ============================================================================
// CLIENT
// ============================================================================

/// Loopback client engine.
pub struct LoopbackClientEngine {
    hub: LoopbackHub,
    worker: Worker,
}

impl LoopbackClientEngine {
    /// Creates a stopped client engine on `hub`.
    #[must_use]
    pub fn new(hub: LoopbackHub) -> Self {
        Self {
            hub,
            worker: Worker::default(),
        }
    }
}

impl ClientEngine for LoopbackClientEngine {
    fn start(&mut self, link: ClientEngineLink, params: &ClientParams) -> BridgeResult<()> {
        if self.worker.is_alive() {
            return Err(BridgeError::EngineStart("loopback client already running".to_string()));
        }

        let server_ip = params
            .host
            .parse::<IpAddr>()
            .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));

        let state = ClientThread {
            link,
            server: self.hub.lookup(params.port),
            addr: self.hub.allocate_addr(),
            server_addr: SocketAddr::new(server_ip, params.port),
            poll_interval: params.poll_interval,
            shutdown: Arc::clone(&self.worker.shutdown),
            stats: ClientStatus::default(),
        };

        self.worker.spawn("tidegate-loopback-client", move || state.run())
    }

    fn stop(&mut self) {
        self.worker.stop();
    }

    fn is_alive(&self) -> bool {
        self.worker.is_alive()
    }
}

impl Drop for LoopbackClientEngine {
    fn drop(&mut self) {
        self.worker.stop();
    }
}

struct ClientThread {
    link: ClientEngineLink,
    server: Option<Sender<ToServer>>,
    addr: SocketAddr,
    server_addr: SocketAddr,
    poll_interval: Duration,
    shutdown: Arc<AtomicBool>,
    stats: ClientStatus,
}

impl ClientThread {
    fn run(mut self) {
        let Some(inbox) = self.handshake() else {
            self.emit_disconnected();
            return;
        };
        tracing::info!("loopback client {} connected to {}", self.addr, self.server_addr);
        let _ = self
            .link
            .connections
            .enqueue(ConnectionEvent::connected(SERVER_PEER, self.server_addr));

        loop {
            if self.shutdown.load(Ordering::Acquire) || !self.drain_commands() {
                self.send_disconnect();
                break;
            }
            self.drain_outgoing();
            if !self.drain_inbox(&inbox) {
                break;
            }
            thread::sleep(self.poll_interval);
        }

        self.emit_disconnected();
    }

    fn handshake(&self) -> Option<Receiver<ToClient>> {
        let Some(server) = self.server.as_ref() else {
            tracing::warn!("no loopback server listening on {}", self.server_addr);
            return None;
        };

        let (reply_tx, inbox) = crossbeam_channel::unbounded();
        if server
            .send(ToServer::Connect { addr: self.addr, reply: reply_tx })
            .is_err()
        {
            tracing::warn!("loopback server on {} went away", self.server_addr);
            return None;
        }

        let deadline = Instant::now() + CONNECT_TIMEOUT;
        let wait = self.poll_interval.max(Duration::from_millis(1));
        loop {
            if self.shutdown.load(Ordering::Acquire) {
                self.send_disconnect();
                return None;
            }
            match inbox.recv_timeout(wait) {
                Ok(ToClient::Accepted(peer)) => {
                    tracing::debug!("{} accepted as {}", self.addr, peer);
                    return Some(inbox);
                }
                Ok(ToClient::Rejected | ToClient::Disconnected)
                | Err(RecvTimeoutError::Disconnected) => {
                    tracing::warn!("connection to {} refused", self.server_addr);
                    return None;
                }
                Ok(ToClient::Data { .. }) => {}
                Err(RecvTimeoutError::Timeout) => {
                    if Instant::now() >= deadline {
                        tracing::warn!("connection to {} timed out", self.server_addr);
                        self.send_disconnect();
                        return None;
                    }
                }
            }
        }
    }

    /// Returns false once a stop command arrives.
    fn drain_commands(&mut self) -> bool {
        while let Some(command) = self.link.commands.try_dequeue() {
            match command {
                Command::Stop => return false,
                Command::RequestStatus => {
                    let _ = self.link.status.enqueue(self.stats);
                }
                Command::Kick(peer) => tracing::debug!("client engine ignores kick for {}", peer),
            }
        }
        true
    }

    fn drain_outgoing(&mut self) {
        let Some(server) = self.server.as_ref() else {
            return;
        };
        while let Some(packet) = self.link.outgoing.try_dequeue() {
            let len = packet.payload.len() as u64;
            let message = ToServer::Data {
                addr: self.addr,
                channel: packet.channel,
                payload: packet.payload,
            };
            if server.send(message).is_ok() {
                self.stats.packets_sent += 1;
                self.stats.bytes_sent += len;
            } else {
                self.stats.packets_lost += 1;
            }
        }
    }

    /// Returns false once the server has closed the link.
    fn drain_inbox(&mut self, inbox: &Receiver<ToClient>) -> bool {
        loop {
            match inbox.try_recv() {
                Ok(ToClient::Data { channel, payload }) => {
                    let len = payload.len() as u64;
                    let packet = IncomingPacket { peer: SERVER_PEER, channel, payload };
                    if self.link.incoming.enqueue(packet).is_ok() {
                        self.stats.packets_received += 1;
                        self.stats.bytes_received += len;
                    } else {
                        self.stats.packets_lost += 1;
                    }
                }
                Ok(ToClient::Disconnected | ToClient::Rejected) => {
                    tracing::info!("server {} closed the link", self.server_addr);
                    return false;
                }
                Ok(ToClient::Accepted(_)) => {}
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Disconnected) => return false,
            }
        }
    }

    fn send_disconnect(&self) {
        if let Some(server) = self.server.as_ref() {
            let _ = server.send(ToServer::Disconnect { addr: self.addr });
        }
    }

    fn emit_disconnected(&self) {
        let _ = self
            .link
            .connections
            .enqueue(ConnectionEvent::disconnected(SERVER_PEER, self.server_addr));
    }
}
