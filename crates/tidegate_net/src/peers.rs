//! # Peer Registry
//!
//! Address metadata for connected peers, indexed by native peer id.
//!
//! ## Design
//!
//! - Fixed number of slots, allocated when the server starts
//! - Slot `n` belongs to native peer `n`
//! - Disconnection resets the slot to empty

use std::net::SocketAddr;

use crate::identity::NativePeerId;

/// Returned by address queries when no record exists.
pub const UNAVAILABLE: &str = "(unavailable)";

/// Metadata for one connected peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PeerRecord {
    /// Engine peer id.
    pub peer: NativePeerId,
    /// Remote address.
    pub addr: SocketAddr,
}

/// Fixed-capacity table of connected peers.
#[derive(Debug)]
pub struct PeerRegistry {
    slots: Box<[Option<PeerRecord>]>,
    connected: usize,
}

impl PeerRegistry {
    /// Creates a registry with one empty slot per possible peer.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity].into_boxed_slice(),
            connected: 0,
        }
    }

    /// Records a connected peer, overwriting whatever the slot held.
    ///
    /// Ids beyond the capacity are logged and ignored.
    pub fn record(&mut self, peer: NativePeerId, addr: SocketAddr) {
        let Some(slot) = self.slots.get_mut(peer.index()) else {
            tracing::error!(
                "{} is outside the peer registry (capacity {}); not recorded",
                peer,
                self.slots.len()
            );
            return;
        };
        if slot.is_none() {
            self.connected += 1;
        }
        *slot = Some(PeerRecord { peer, addr });
    }

    /// Resets a peer's slot to empty, returning what it held.
    pub fn clear(&mut self, peer: NativePeerId) -> Option<PeerRecord> {
        let previous = self.slots.get_mut(peer.index())?.take();
        if previous.is_some() {
            self.connected -= 1;
        }
        previous
    }

    /// Empties every slot.
    pub fn clear_all(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.connected = 0;
    }

    /// Record for a peer, if connected.
    #[must_use]
    pub fn get(&self, peer: NativePeerId) -> Option<&PeerRecord> {
        self.slots.get(peer.index())?.as_ref()
    }

    /// `"ip:port"` for a connected peer (`"[ip]:port"` for IPv6),
    /// [`UNAVAILABLE`] otherwise.
    #[must_use]
    pub fn address_of(&self, peer: NativePeerId) -> String {
        self.get(peer)
            .map_or_else(|| UNAVAILABLE.to_string(), |record| record.addr.to_string())
    }

    /// Number of slots.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied slots.
    #[inline]
    #[must_use]
    pub const fn connected(&self) -> usize {
        self.connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "192.168.1.1:12345".parse().unwrap()
    }

    #[test]
    fn test_record_and_clear() {
        let mut peers = PeerRegistry::new(4);
        peers.record(NativePeerId(2), addr());

        assert_eq!(peers.connected(), 1);
        assert_eq!(peers.address_of(NativePeerId(2)), "192.168.1.1:12345");

        let cleared = peers.clear(NativePeerId(2)).unwrap();
        assert_eq!(cleared.peer, NativePeerId(2));
        assert_eq!(peers.connected(), 0);
        assert_eq!(peers.address_of(NativePeerId(2)), UNAVAILABLE);
    }

    #[test]
    fn test_overwrite_does_not_double_count() {
        let mut peers = PeerRegistry::new(2);
        peers.record(NativePeerId(0), addr());
        peers.record(NativePeerId(0), "10.0.0.1:1".parse().unwrap());
        assert_eq!(peers.connected(), 1);
        assert_eq!(peers.address_of(NativePeerId(0)), "10.0.0.1:1");
    }

    #[test]
    fn test_out_of_range_ids() {
        let mut peers = PeerRegistry::new(2);
        peers.record(NativePeerId(9), addr());
        assert_eq!(peers.connected(), 0);
        assert_eq!(peers.address_of(NativePeerId(9)), UNAVAILABLE);
        assert!(peers.clear(NativePeerId(9)).is_none());
    }

    #[test]
    fn test_clear_all() {
        let mut peers = PeerRegistry::new(3);
        peers.record(NativePeerId(0), addr());
        peers.record(NativePeerId(1), addr());
        peers.clear_all();
        assert_eq!(peers.connected(), 0);
        assert!(peers.get(NativePeerId(0)).is_none());
    }

    #[test]
    fn test_ipv6_address_format() {
        let mut peers = PeerRegistry::new(1);
        peers.record(NativePeerId(0), "[::1]:7777".parse().unwrap());
        assert_eq!(peers.address_of(NativePeerId(0)), "[::1]:7777");
    }
}
