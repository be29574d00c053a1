//! # Scratch Buffer
//!
//! One reusable byte buffer per role, allocated when the bridge is built.
//!
//! ## Staging
//!
//! ```text
//! payload.len() <= capacity  ->  copy into the scratch buffer, hand out a view
//! payload.len() >  capacity  ->  copy into a dedicated Vec sized to the payload
//! ```
//!
//! Either way the engine's payload is dropped right after the copy. A
//! [`Staged`] view borrows the buffer mutably, so it cannot outlive the next
//! `stage` call; callbacks that want to keep the bytes must copy them.

use std::ops::Deref;

/// Default scratch capacity in bytes.
pub const DEFAULT_PACKET_BUFFER_CAPACITY: usize = 4096;

/// Single-slot reusable staging buffer.
#[derive(Debug)]
pub struct ScratchBuffer {
    buf: Box<[u8]>,
    oversized: u64,
}

/// Bytes staged for one callback.
#[derive(Debug)]
pub enum Staged<'a> {
    /// View into the shared scratch buffer.
    Shared(&'a [u8]),
    /// Fallback allocation for a payload larger than the scratch buffer.
    Dedicated(Vec<u8>),
}

impl Staged<'_> {
    /// Returns true if the bytes live in the shared scratch buffer.
    #[must_use]
    pub const fn is_shared(&self) -> bool {
        matches!(self, Self::Shared(_))
    }
}

impl Deref for Staged<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Self::Shared(bytes) => bytes,
            Self::Dedicated(bytes) => bytes,
        }
    }
}

impl ScratchBuffer {
    /// Allocates the buffer once.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity].into_boxed_slice(),
            oversized: 0,
        }
    }

    /// Copies `payload` somewhere the consumer can read it and releases it.
    pub fn stage(&mut self, payload: Vec<u8>) -> Staged<'_> {
        let len = payload.len();

        if len <= self.buf.len() {
            self.buf[..len].copy_from_slice(&payload);
            drop(payload);
            return Staged::Shared(&self.buf[..len]);
        }

        self.oversized += 1;
        tracing::debug!(
            "payload of {} bytes exceeds scratch capacity {}; allocating a dedicated buffer",
            len,
            self.buf.len()
        );
        let mut dedicated = Vec::with_capacity(len);
        dedicated.extend_from_slice(&payload);
        drop(payload);
        Staged::Dedicated(dedicated)
    }

    /// Scratch capacity in bytes.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// How many payloads needed a fallback allocation so far.
    #[inline]
    #[must_use]
    pub const fn oversized_count(&self) -> u64 {
        self.oversized
    }
}

impl Default for ScratchBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_PACKET_BUFFER_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_payloads_reuse_the_buffer() {
        let mut scratch = ScratchBuffer::new(16);

        let first = scratch.stage(b"hello".to_vec());
        assert!(first.is_shared());
        assert_eq!(&*first, b"hello");
        let first_ptr = first.as_ptr() as usize;

        let second = scratch.stage(b"world!".to_vec());
        assert!(second.is_shared());
        assert_eq!(&*second, b"world!");
        assert_eq!(second.as_ptr() as usize, first_ptr);

        assert_eq!(scratch.oversized_count(), 0);
    }

    #[test]
    fn test_view_is_bounded_to_payload() {
        let mut scratch = ScratchBuffer::new(16);
        let _ = scratch.stage(vec![0xAA; 16]);
        let staged = scratch.stage(vec![1, 2, 3]);
        assert_eq!(staged.len(), 3);
        assert_eq!(&*staged, &[1, 2, 3]);
    }

    #[test]
    fn test_exact_capacity_stays_shared() {
        let mut scratch = ScratchBuffer::new(8);
        assert!(scratch.stage(vec![7; 8]).is_shared());
    }

    #[test]
    fn test_oversized_payload_gets_dedicated_buffer() {
        let mut scratch = ScratchBuffer::new(8);
        let payload: Vec<u8> = (0..100).collect();

        let staged = scratch.stage(payload.clone());
        assert!(!staged.is_shared());
        assert_eq!(staged.len(), 100);
        assert_eq!(&*staged, payload.as_slice());
        drop(staged);

        assert_eq!(scratch.oversized_count(), 1);
        assert_eq!(scratch.capacity(), 8);
    }

    #[test]
    fn test_empty_payload() {
        let mut scratch = ScratchBuffer::default();
        let staged = scratch.stage(Vec::new());
        assert!(staged.is_empty());
        assert!(staged.is_shared());
    }
}
