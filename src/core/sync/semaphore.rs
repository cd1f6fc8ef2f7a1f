/*!
 * Counting Semaphore
 *
 * Blocking half of `FastLock`. Uses parking_lot_core keyed on the permit
 * counter's address, so a waiter only sleeps after re-checking the count
 * under the parking bucket lock.
 */

use parking_lot_core::{park, unpark_one, ParkResult, DEFAULT_PARK_TOKEN, DEFAULT_UNPARK_TOKEN};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

/// Counting semaphore with blocking and deadline-bounded acquire
#[repr(C, align(64))] // Cache-line aligned to prevent false sharing
#[derive(Debug)]
pub struct Semaphore {
    permits: AtomicUsize,
}

impl Semaphore {
    pub const fn new(permits: usize) -> Self {
        Self {
            permits: AtomicUsize::new(permits),
        }
    }

    /// Stable parking address
    #[inline]
    fn key(&self) -> usize {
        &self.permits as *const AtomicUsize as usize
    }

    /// Current number of unconsumed permits
    #[inline]
    pub fn permits(&self) -> usize {
        self.permits.load(Ordering::Acquire)
    }

    fn try_take(&self) -> bool {
        let mut current = self.permits.load(Ordering::Acquire);
        while current > 0 {
            match self.permits.compare_exchange_weak(
                current,
                current - 1,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
        false
    }

    fn sleep(&self, deadline: Option<Instant>) -> ParkResult {
        // SAFETY: the callbacks neither panic nor call back into the parking lot.
        unsafe {
            park(
                self.key(),
                || self.permits.load(Ordering::Acquire) == 0,
                || {},
                |_, _| {},
                DEFAULT_PARK_TOKEN,
                deadline,
            )
        }
    }

    /// Take one permit, blocking until one is posted
    pub fn acquire(&self) {
        // A failed validation is an interrupted sleep; just go around again.
        while !self.try_take() {
            self.sleep(None);
        }
    }

    /// Take one permit, giving up at `deadline`
    ///
    /// Returns `false` on timeout; no permit was consumed in that case.
    pub fn acquire_until(&self, deadline: Instant) -> bool {
        loop {
            if self.try_take() {
                return true;
            }
            if let ParkResult::TimedOut = self.sleep(Some(deadline)) {
                return self.try_take();
            }
        }
    }

    /// Post one permit and wake a sleeper if there is one
    pub fn release(&self) {
        self.permits.fetch_add(1, Ordering::Release);
        // SAFETY: the callback neither panics nor calls back into the parking lot.
        unsafe {
            unpark_one(self.key(), |_| DEFAULT_UNPARK_TOKEN);
        }
    }
}

impl Default for Semaphore {
    fn default() -> Self {
        Self::new(0)
    }
}
