//! Synchronization primitives shared by the worker pool and the store.
//!
//! Mutual exclusion and condition variables come straight from `parking_lot`;
//! this module adds the counting semaphore built on top of them.

use std::time::Duration;

pub use parking_lot::{Condvar, Mutex, MutexGuard};

/// A counting semaphore.
///
/// `acquire` blocks while the count is zero; `release` increments the count
/// and wakes one waiter.
#[derive(Debug, Default)]
pub struct Semaphore {
    permits: Mutex<usize>,
    cond: Condvar,
}

impl Semaphore {
    /// Creates a semaphore holding `permits` initial permits.
    pub fn new(permits: usize) -> Self {
        Self {
            permits: Mutex::new(permits),
            cond: Condvar::new(),
        }
    }

    /// Blocks until a permit is available, then takes it.
    pub fn acquire(&self) {
        let mut permits = self.permits.lock();
        while *permits == 0 {
            self.cond.wait(&mut permits);
        }
        *permits -= 1;
    }

    /// Takes a permit if one is available without blocking.
    pub fn try_acquire(&self) -> bool {
        let mut permits = self.permits.lock();
        if *permits == 0 {
            return false;
        }
        *permits -= 1;
        true
    }

    /// Waits up to `timeout` for a permit. Returns `false` on timeout.
    pub fn acquire_timeout(&self, timeout: Duration) -> bool {
        let mut permits = self.permits.lock();
        while *permits == 0 {
            if self.cond.wait_for(&mut permits, timeout).timed_out() && *permits == 0 {
                return false;
            }
        }
        *permits -= 1;
        true
    }

    pub fn release(&self) {
        let mut permits = self.permits.lock();
        *permits += 1;
        self.cond.notify_one();
    }

    /// Releases `n` permits at once, waking up to `n` waiters.
    pub fn release_many(&self, n: usize) {
        let mut permits = self.permits.lock();
        *permits += n;
        for _ in 0..n {
            self.cond.notify_one();
        }
    }

    /// Current number of permits. Only a snapshot under concurrency.
    pub fn available(&self) -> usize {
        *self.permits.lock()
    }
}
