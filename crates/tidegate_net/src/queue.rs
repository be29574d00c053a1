//! # Cross-Thread Queues
//!
//! Bounded single-producer/single-consumer queues between the engine thread
//! and the tick loop.
//!
//! ## Design
//!
//! - Backed by bounded crossbeam channels (lock-free, fixed capacity)
//! - `Producer` and `Consumer` are not `Clone`: one writer, one reader
//! - Never blocks: a full queue rejects the item and logs it
//! - Draining is bounded to what was queued when the drain started

use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::error::{BridgeError, BridgeResult};

/// Creates a named bounded queue.
///
/// A capacity of 0 is raised to 1 so the queue never degenerates into a
/// rendezvous channel.
#[must_use]
pub fn bounded<T>(name: &'static str, capacity: usize) -> (Producer<T>, Consumer<T>) {
    let capacity = capacity.max(1);
    let (tx, rx) = crossbeam_channel::bounded(capacity);
    (
        Producer { name, capacity, tx },
        Consumer { name, rx },
    )
}

/// Writing end of a queue.
#[derive(Debug)]
pub struct Producer<T> {
    name: &'static str,
    capacity: usize,
    tx: Sender<T>,
}

impl<T> Producer<T> {
    /// Enqueues an item without blocking.
    ///
    /// # Errors
    ///
    /// `QueueFull` if the queue is at capacity (the item is dropped),
    /// `QueueClosed` if the consumer is gone.
    pub fn enqueue(&self, item: T) -> BridgeResult<()> {
        match self.tx.try_send(item) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                tracing::warn!(
                    "queue '{}' full (capacity {}), dropping item",
                    self.name,
                    self.capacity
                );
                Err(BridgeError::QueueFull {
                    queue: self.name,
                    capacity: self.capacity,
                })
            }
            Err(TrySendError::Disconnected(_)) => Err(BridgeError::QueueClosed(self.name)),
        }
    }

    /// Number of queued items.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.tx.len()
    }

    /// Returns true if nothing is queued.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    /// Fixed capacity.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Queue name, used in logs.
    #[inline]
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

/// Reading end of a queue.
#[derive(Debug)]
pub struct Consumer<T> {
    name: &'static str,
    rx: Receiver<T>,
}

impl<T> Consumer<T> {
    /// Dequeues one item if available. Never blocks.
    #[inline]
    #[must_use]
    pub fn try_dequeue(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Iterates over the items queued right now.
    ///
    /// Items the producer adds while the iterator is live are left for the
    /// next drain, so one drain always terminates. Stopping early leaves the
    /// rest queued.
    #[must_use]
    pub fn pending(&self) -> Pending<'_, T> {
        Pending {
            consumer: self,
            remaining: self.rx.len(),
        }
    }

    /// Number of queued items.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Returns true if nothing is queued.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Queue name, used in logs.
    #[inline]
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

/// Bounded drain over a [`Consumer`]. See [`Consumer::pending`].
pub struct Pending<'a, T> {
    consumer: &'a Consumer<T>,
    remaining: usize,
}

impl<T> Iterator for Pending<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        self.consumer.try_dequeue()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enqueue_dequeue_in_order() {
        let (tx, rx) = bounded::<u32>("test", 4);
        tx.enqueue(1).unwrap();
        tx.enqueue(2).unwrap();
        assert_eq!(rx.try_dequeue(), Some(1));
        assert_eq!(rx.try_dequeue(), Some(2));
        assert_eq!(rx.try_dequeue(), None);
    }

    #[test]
    fn test_full_queue_rejects() {
        let (tx, rx) = bounded::<u32>("tiny", 2);
        tx.enqueue(1).unwrap();
        tx.enqueue(2).unwrap();
        assert_eq!(
            tx.enqueue(3),
            Err(BridgeError::QueueFull { queue: "tiny", capacity: 2 })
        );
        assert_eq!(rx.len(), 2);
        assert_eq!(rx.try_dequeue(), Some(1));
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        let (tx, rx) = bounded::<u8>("zero", 0);
        assert_eq!(tx.capacity(), 1);
        tx.enqueue(9).unwrap();
        assert_eq!(rx.try_dequeue(), Some(9));
    }

    #[test]
    fn test_closed_queue() {
        let (tx, rx) = bounded::<u8>("closed", 1);
        drop(rx);
        assert_eq!(tx.enqueue(1), Err(BridgeError::QueueClosed("closed")));

        let (tx, rx) = bounded::<u8>("closed", 1);
        drop(tx);
        assert_eq!(rx.try_dequeue(), None);
    }

    #[test]
    fn test_pending_is_bounded_to_snapshot() {
        let (tx, rx) = bounded::<u32>("snap", 8);
        tx.enqueue(1).unwrap();
        tx.enqueue(2).unwrap();

        let mut seen = Vec::new();
        for item in rx.pending() {
            seen.push(item);
            // Late arrivals wait for the next drain.
            let _ = tx.enqueue(item + 10);
        }
        assert_eq!(seen, vec![1, 2]);
        assert_eq!(rx.len(), 2);
    }

    #[test]
    fn test_pending_early_stop_leaves_rest() {
        let (tx, rx) = bounded::<u32>("early", 8);
        for i in 0..5 {
            tx.enqueue(i).unwrap();
        }
        let first: Vec<u32> = rx.pending().take(2).collect();
        assert_eq!(first, vec![0, 1]);
        assert_eq!(rx.len(), 3);
    }

    #[test]
    fn test_empty_drain() {
        let (_tx, rx) = bounded::<u32>("empty", 4);
        assert_eq!(rx.pending().count(), 0);
        assert!(rx.is_empty());
    }

    #[test]
    fn test_cross_thread() {
        let (tx, rx) = bounded::<u32>("threads", 1024);
        let handle = std::thread::spawn(move || {
            for i in 0..500 {
                tx.enqueue(i).unwrap();
            }
        });
        handle.join().unwrap();
        let drained: Vec<u32> = rx.pending().collect();
        assert_eq!(drained.len(), 500);
        assert!(drained.windows(2).all(|w| w[0] < w[1]));
    }
}
