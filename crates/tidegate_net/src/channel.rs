//! # Channel Table
//!
//! Maps logical channel indices to engine delivery flags.
//!
//! ## Fixed Lanes
//!
//! ```text
//! index 0 -> Reliable     (always)
//! index 1 -> Unreliable   (always)
//! index 2.. -> whatever the configuration says
//! ```
//!
//! Misconfigured fixed lanes are rewritten with a warning, never rejected.
//! The table is immutable once the bridge has started.

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, BridgeResult};
use crate::{MAX_PACKET_SIZE_CAP, PATH_MTU};

/// Delivery mode of one logical channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Reliable, ordered, fragmented by the engine.
    Reliable,
    /// Reliable, delivered as soon as it arrives.
    ReliableUnordered,
    /// Unreliable, sequenced.
    Unreliable,
    /// Unreliable, but the engine may split it into fragments.
    UnreliableFragmented,
    /// Unreliable and unsequenced.
    UnreliableUnsequenced,
}

impl DeliveryMode {
    /// Engine flags for this mode.
    #[must_use]
    pub const fn flags(self) -> PacketFlags {
        match self {
            Self::Reliable => PacketFlags::RELIABLE,
            Self::ReliableUnordered => {
                PacketFlags(PacketFlags::RELIABLE.0 | PacketFlags::UNSEQUENCED.0)
            }
            Self::Unreliable => PacketFlags::NONE,
            Self::UnreliableFragmented => PacketFlags::UNRELIABLE_FRAGMENT,
            Self::UnreliableUnsequenced => PacketFlags::UNSEQUENCED,
        }
    }

    /// True for modes where the engine reassembles large payloads reliably.
    #[must_use]
    pub const fn fragments_reliably(self) -> bool {
        matches!(self, Self::Reliable | Self::ReliableUnordered)
    }
}

/// Delivery flags handed to the engine with every outgoing packet.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PacketFlags(pub u8);

impl PacketFlags {
    /// No guarantees.
    pub const NONE: Self = Self(0);
    /// Retransmit until acknowledged.
    pub const RELIABLE: Self = Self(1 << 0);
    /// Deliver without sequencing.
    pub const UNSEQUENCED: Self = Self(1 << 1);
    /// Allow unreliable fragmentation.
    pub const UNRELIABLE_FRAGMENT: Self = Self(1 << 3);

    /// Returns true if every bit of `other` is set.
    #[inline]
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

/// Validated channel configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelTable {
    modes: Vec<DeliveryMode>,
    max_packet_size: usize,
}

impl ChannelTable {
    /// Builds a table from configured modes, correcting the fixed lanes.
    #[must_use]
    pub fn configure(entries: &[DeliveryMode]) -> Self {
        let mut modes = entries.to_vec();

        if modes.len() < 2 {
            tracing::warn!(
                "channel table has {} entries, at least 2 are required; resetting to defaults",
                modes.len()
            );
            modes = vec![DeliveryMode::Reliable, DeliveryMode::Unreliable];
        }
        if modes[0] != DeliveryMode::Reliable {
            tracing::warn!("channel 0 must be reliable (was {:?}); correcting", modes[0]);
            modes[0] = DeliveryMode::Reliable;
        }
        if modes[1] != DeliveryMode::Unreliable {
            tracing::warn!("channel 1 must be unreliable (was {:?}); correcting", modes[1]);
            modes[1] = DeliveryMode::Unreliable;
        }

        Self {
            modes,
            max_packet_size: MAX_PACKET_SIZE_CAP,
        }
    }

    /// Sets the largest payload accepted on reliably fragmenting channels.
    ///
    /// Values above 32 MiB are clamped with a warning.
    #[must_use]
    pub fn with_max_packet_size(mut self, size: usize) -> Self {
        if size > MAX_PACKET_SIZE_CAP {
            tracing::warn!(
                "max packet size {} exceeds the {} byte cap; clamping",
                size,
                MAX_PACKET_SIZE_CAP
            );
        }
        self.max_packet_size = size.min(MAX_PACKET_SIZE_CAP);
        self
    }

    /// Number of channels.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.modes.len()
    }

    /// Always false: a configured table has at least the two fixed lanes.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modes.is_empty()
    }

    /// All configured modes, in index order.
    #[must_use]
    pub fn modes(&self) -> &[DeliveryMode] {
        &self.modes
    }

    /// Mode of one channel.
    ///
    /// # Errors
    ///
    /// `OutOfRange` if `index >= len()`.
    pub fn mode(&self, index: usize) -> BridgeResult<DeliveryMode> {
        self.modes.get(index).copied().ok_or(BridgeError::OutOfRange {
            index,
            len: self.modes.len(),
        })
    }

    /// Returns true if a payload of `len` bytes on this channel is larger
    /// than the path MTU and the engine will not fragment it reliably.
    ///
    /// # Errors
    ///
    /// `OutOfRange` if `index >= len()`.
    pub fn exceeds_path_mtu(&self, index: usize, len: usize) -> BridgeResult<bool> {
        let mode = self.mode(index)?;
        Ok(!mode.fragments_reliably() && len > PATH_MTU)
    }

    /// Engine flags for a send of `payload_len` bytes on `index`.
    ///
    /// Oversized payloads on non-fragmenting channels only produce an
    /// advisory log; the engine still gets the packet.
    ///
    /// # Errors
    ///
    /// `OutOfRange` if `index >= len()`.
    pub fn flags_for(&self, index: usize, payload_len: usize) -> BridgeResult<PacketFlags> {
        if self.exceeds_path_mtu(index, payload_len)? {
            tracing::warn!(
                "packet of {} bytes on channel {} exceeds the recommended path MTU ({} bytes)",
                payload_len,
                index,
                PATH_MTU
            );
        }
        self.mode(index).map(DeliveryMode::flags)
    }

    /// Largest payload worth sending on `index`.
    ///
    /// # Errors
    ///
    /// `OutOfRange` if `index >= len()`.
    pub fn max_packet_size(&self, index: usize) -> BridgeResult<usize> {
        let mode = self.mode(index)?;
        if mode.fragments_reliably() {
            Ok(self.max_packet_size)
        } else {
            Ok(PATH_MTU)
        }
    }
}

impl Default for ChannelTable {
    fn default() -> Self {
        Self::configure(&[DeliveryMode::Reliable, DeliveryMode::Unreliable])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_tables_reset_to_defaults() {
        for entries in [&[][..], &[DeliveryMode::UnreliableFragmented][..]] {
            let table = ChannelTable::configure(entries);
            assert_eq!(
                table.modes(),
                &[DeliveryMode::Reliable, DeliveryMode::Unreliable]
            );
        }
    }

    #[test]
    fn test_fixed_lanes_are_corrected() {
        let table = ChannelTable::configure(&[
            DeliveryMode::Unreliable,
            DeliveryMode::Reliable,
            DeliveryMode::UnreliableFragmented,
        ]);
        assert_eq!(table.mode(0).unwrap(), DeliveryMode::Reliable);
        assert_eq!(table.mode(1).unwrap(), DeliveryMode::Unreliable);
        assert_eq!(table.mode(2).unwrap(), DeliveryMode::UnreliableFragmented);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_index_out_of_range() {
        let table = ChannelTable::default();
        assert_eq!(
            table.flags_for(2, 10),
            Err(BridgeError::OutOfRange { index: 2, len: 2 })
        );
        assert!(table.max_packet_size(7).is_err());
    }

    #[test]
    fn test_flags_mapping() {
        let table = ChannelTable::configure(&[
            DeliveryMode::Reliable,
            DeliveryMode::Unreliable,
            DeliveryMode::ReliableUnordered,
            DeliveryMode::UnreliableUnsequenced,
        ]);
        assert_eq!(table.flags_for(0, 1).unwrap(), PacketFlags::RELIABLE);
        assert_eq!(table.flags_for(1, 1).unwrap(), PacketFlags::NONE);
        let unordered = table.flags_for(2, 1).unwrap();
        assert!(unordered.contains(PacketFlags::RELIABLE));
        assert!(unordered.contains(PacketFlags::UNSEQUENCED));
        assert_eq!(table.flags_for(3, 1).unwrap(), PacketFlags::UNSEQUENCED);
    }

    #[test]
    fn test_mtu_advisory_is_not_fatal() {
        let table = ChannelTable::default();
        assert!(table.exceeds_path_mtu(1, PATH_MTU + 1).unwrap());
        assert!(!table.exceeds_path_mtu(1, PATH_MTU).unwrap());
        assert!(!table.exceeds_path_mtu(0, PATH_MTU * 10).unwrap());
        assert_eq!(table.flags_for(1, PATH_MTU * 4).unwrap(), PacketFlags::NONE);
    }

    #[test]
    fn test_max_packet_size() {
        let table = ChannelTable::default().with_max_packet_size(64 * 1024 * 1024);
        assert_eq!(table.max_packet_size(0).unwrap(), MAX_PACKET_SIZE_CAP);
        assert_eq!(table.max_packet_size(1).unwrap(), PATH_MTU);

        let small = ChannelTable::default().with_max_packet_size(8192);
        assert_eq!(small.max_packet_size(0).unwrap(), 8192);
        assert_eq!(small.max_packet_size(1).unwrap(), PATH_MTU);
    }
}
