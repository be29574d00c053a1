//! # Tick Guard
//!
//! Collapses any number of scheduling hooks in one frame into a single drain.
//!
//! ```text
//! frame N:   early hook -> drain   late hook -> (skipped)   finish_frame
//! frame N+1: early hook -> drain   ...
//! ```

/// Per-frame "already drained" flag.
#[derive(Clone, Copy, Debug, Default)]
pub struct TickGuard {
    ran: bool,
    tick_count: u64,
    collapsed: u64,
}

impl TickGuard {
    /// Creates a guard that allows the first drain.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ran: false,
            tick_count: 0,
            collapsed: 0,
        }
    }

    /// Returns true if this frame has not been drained yet.
    ///
    /// A `false` answer is counted as a collapsed hook.
    #[must_use]
    pub fn should_run(&mut self) -> bool {
        if self.ran {
            self.collapsed += 1;
            return false;
        }
        true
    }

    /// Marks this frame as drained.
    pub fn mark_ran(&mut self) {
        self.ran = true;
        self.tick_count += 1;
    }

    /// Opens the next frame.
    pub fn reset(&mut self) {
        self.ran = false;
    }

    /// Returns true if this frame has already been drained.
    #[inline]
    #[must_use]
    pub const fn has_run(&self) -> bool {
        self.ran
    }

    /// Frames drained so far.
    #[inline]
    #[must_use]
    pub const fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Hook invocations that found the frame already drained.
    #[inline]
    #[must_use]
    pub const fn collapsed(&self) -> u64 {
        self.collapsed
    }
}
