//! # Bridge Error Types
//!
//! Everything that can go wrong between the consumer and the engine thread.
//!
//! Almost none of these ever reach the embedding application: the dispatch
//! path logs them and degrades to "drop and continue". They exist as values so
//! the building blocks (channel table, queues, translator) can be tested on
//! their own.

use thiserror::Error;

/// Errors produced by the bridge and its building blocks.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// A channel index outside the configured channel table.
    #[error("channel index {index} out of range (table has {len} channels)")]
    OutOfRange {
        /// Requested index.
        index: usize,
        /// Number of configured channels.
        len: usize,
    },

    /// An argument that can never be valid (e.g. logical connection id 0).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A bounded queue rejected an item because it was full.
    #[error("queue '{queue}' is full (capacity {capacity}), item dropped")]
    QueueFull {
        /// Queue name.
        queue: &'static str,
        /// Fixed capacity of the queue.
        capacity: usize,
    },

    /// The other end of a queue has been dropped.
    #[error("queue '{0}' is closed")]
    QueueClosed(&'static str),

    /// Connect target used a scheme other than the supported one.
    #[error("unsupported address scheme '{0}'")]
    UnsupportedScheme(String),

    /// Connect target could not be parsed.
    #[error("invalid connect target '{0}'")]
    InvalidTarget(String),

    /// Configuration could not be read or parsed.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// I/O failure (config file, engine thread spawn).
    #[error("i/o error: {0}")]
    Io(String),

    /// The engine refused to start.
    #[error("engine failed to start: {0}")]
    EngineStart(String),
}

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;
