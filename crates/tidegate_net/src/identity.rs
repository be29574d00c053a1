//! # Connection Identity
//!
//! The engine numbers peers from 0. The consumer sees connection ids that
//! start at 1, with 0 reserved as "no connection".
//!
//! ```text
//! native:  0   1   2   ...   n
//! logical: 1   2   3   ...   n + 1
//! ```

use std::fmt;

use crate::error::{BridgeError, BridgeResult};

/// Peer identifier assigned by the engine (0-based).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NativePeerId(pub u32);

impl NativePeerId {
    /// Returns the id as a registry index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NativePeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer#{}", self.0)
    }
}

/// Connection identifier exposed to the consumer (1-based, 0 is never valid).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl ConnectionId {
    /// Reserved "no connection" value.
    pub const NONE: Self = Self(0);

    /// Returns true if this id can refer to a connection.
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// Maps an engine peer id to the consumer-facing connection id.
#[inline]
#[must_use]
pub fn to_logical(native: NativePeerId) -> ConnectionId {
    ConnectionId(u64::from(native.0) + 1)
}

/// Maps a consumer-facing connection id back to the engine peer id.
///
/// # Errors
///
/// `InvalidArgument` for connection id 0 and for ids beyond the engine's
/// peer id range.
pub fn to_native(logical: ConnectionId) -> BridgeResult<NativePeerId> {
    if !logical.is_valid() {
        return Err(BridgeError::InvalidArgument(
            "connection id 0 is reserved".to_string(),
        ));
    }
    u32::try_from(logical.0 - 1)
        .map(NativePeerId)
        .map_err(|_| {
            BridgeError::InvalidArgument(format!(
                "connection id {} exceeds peer id range",
                logical.0
            ))
        })
}
