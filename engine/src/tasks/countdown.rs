use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// A reusable completion counter.
///
/// The owner resets it to the number of outstanding tasks, each task counts it down once on
/// completion and the owner blocks in [`Countdown::wait`] until it reaches zero. Unlike a
/// one-shot latch it can be reset and reused for the next batch, so the executor keeps a single
/// instance for its whole lifetime.
#[derive(Debug, Default)]
pub struct Countdown {
    remaining: Mutex<usize>,
    zero: Condvar,
}

impl Countdown {
    /// Create a new countdown starting at `count`.
    pub const fn new(count: usize) -> Self {
        Self {
            remaining: Mutex::new(count),
            zero: Condvar::new(),
        }
    }

    /// Reset the counter to `count`, discarding whatever was left of the previous batch.
    pub fn reset(&self, count: usize) {
        let mut remaining = self.lock();
        *remaining = count;
        if count == 0 {
            self.zero.notify_all();
        }
    }

    /// Mark one task as complete, waking waiters when the counter reaches zero.
    pub fn count_down(&self) {
        let mut remaining = self.lock();
        debug_assert!(*remaining > 0, "countdown decremented below zero");
        *remaining = remaining.saturating_sub(1);
        if *remaining == 0 {
            self.zero.notify_all();
        }
    }

    /// Block the calling thread until the counter reaches zero.
    pub fn wait(&self) {
        let mut remaining = self.lock();
        while *remaining > 0 {
            remaining = self
                .zero
                .wait(remaining)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// The number of tasks still outstanding.
    pub fn remaining(&self) -> usize {
        *self.lock()
    }

    // The counter is never left in a torn state, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, usize> {
        self.remaining.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
