/*!
 * Fast Exclusive Lock
 *
 * One atomic increment on the uncontended path; contended callers sleep on a
 * semaphore. Protects the wait queues of the queued primitives.
 *
 * # Counter Protocol
 *
 * `counter == 0` is unlocked, `counter == n > 0` is held with `n - 1`
 * callers counted as waiting. Every increment is consumed exactly once: by
 * winning the 0 -> 1 transition, by taking a semaphore permit, or by being
 * withdrawn while another party is still counted.
 */

use crate::core::sync::semaphore::Semaphore;
use crate::core::sync::FatalAction;
use crate::errors::{fatal, FatalError};
use log::trace;
use std::cell::UnsafeCell;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Counter + semaphore exclusive lock without associated data
pub struct RawFastLock {
    counter: AtomicUsize,
    sem: Semaphore,
    fatal_action: FatalAction,
}

impl RawFastLock {
    pub const fn new() -> Self {
        Self::with_fatal_action(FatalAction::Abort)
    }

    pub const fn with_fatal_action(fatal_action: FatalAction) -> Self {
        Self {
            counter: AtomicUsize::new(0),
            sem: Semaphore::new(0),
            fatal_action,
        }
    }

    /// Acquire the lock, sleeping on the semaphore if it is held
    pub fn acquire(&self) {
        if self.counter.fetch_add(1, Ordering::Acquire) == 0 {
            return;
        }
        trace!("fast lock contended, sleeping");
        self.sem.acquire();
    }

    /// Release the lock, handing it to one sleeper if any are counted
    pub fn release(&self) {
        match self.counter.fetch_sub(1, Ordering::Release) {
            1 => {}
            0 => {
                self.counter.fetch_add(1, Ordering::Relaxed);
                fatal(
                    self.fatal_action,
                    FatalError::NotLocked {
                        primitive: "FastLock",
                    },
                )
            }
            _ => self.sem.release(),
        }
    }

    /// Acquire without sleeping
    ///
    /// Can still succeed after losing the initial race: if the holder
    /// released while our increment was counted, its permit is ours. In that
    /// case this briefly blocks on the semaphore until the releaser's post
    /// lands, so it never sleeps behind another holder but is not wait-free.
    pub fn try_acquire(&self) -> bool {
        if self.counter.fetch_add(1, Ordering::Acquire) == 0 {
            return true;
        }
        self.withdraw()
    }

    /// Acquire, giving up at `deadline`
    pub fn acquire_until(&self, deadline: Instant) -> bool {
        if self.counter.fetch_add(1, Ordering::Acquire) == 0 {
            return true;
        }
        if self.sem.acquire_until(deadline) {
            return true;
        }
        self.withdraw()
    }

    /// Acquire, giving up after `timeout`
    pub fn acquire_timed(&self, timeout: Duration) -> bool {
        self.acquire_until(Instant::now() + timeout)
    }

    /// Take back an increment that did not win the lock
    ///
    /// Returns `true` if the lock was handed over to us in the meantime.
    fn withdraw(&self) -> bool {
        let mut current = self.counter.load(Ordering::Acquire);
        while current > 1 {
            match self.counter.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return false,
                Err(actual) => current = actual,
            }
        }
        // Only our increment is left: the last holder counted us as a waiter
        // and has posted (or is about to post) the permit that owns the lock.
        trace!("fast lock released during withdraw, taking handoff");
        self.sem.acquire();
        true
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        self.counter.load(Ordering::Relaxed) != 0
    }

    /// Posted but unconsumed handoffs; always 0 once the lock is idle
    pub fn pending_handoffs(&self) -> usize {
        self.sem.permits()
    }
}

impl Default for RawFastLock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RawFastLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawFastLock")
            .field("counter", &self.counter.load(Ordering::Relaxed))
            .field("permits", &self.sem.permits())
            .finish()
    }
}

/// `RawFastLock` protecting a value
pub struct FastLock<T: ?Sized> {
    raw: RawFastLock,
    data: UnsafeCell<T>,
}

// Safety: access to `data` is serialized by `raw`
unsafe impl<T: ?Sized + Send> Send for FastLock<T> {}
unsafe impl<T: ?Sized + Send> Sync for FastLock<T> {}

/// RAII guard; releases the `FastLock` when dropped
#[must_use = "if unused, the `FastLock` will immediately unlock"]
pub struct FastLockGuard<'a, T: ?Sized> {
    lock: &'a FastLock<T>,
}

impl<T> FastLock<T> {
    pub const fn new(data: T) -> Self {
        Self::with_fatal_action(data, FatalAction::Abort)
    }

    pub const fn with_fatal_action(data: T, fatal_action: FatalAction) -> Self {
        Self {
            raw: RawFastLock::with_fatal_action(fatal_action),
            data: UnsafeCell::new(data),
        }
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: ?Sized> FastLock<T> {
    pub fn lock(&self) -> FastLockGuard<'_, T> {
        self.raw.acquire();
        FastLockGuard { lock: self }
    }

    pub fn try_lock(&self) -> Option<FastLockGuard<'_, T>> {
        self.raw
            .try_acquire()
            .then(|| FastLockGuard { lock: self })
    }

    pub fn lock_until(&self, deadline: Instant) -> Option<FastLockGuard<'_, T>> {
        self.raw
            .acquire_until(deadline)
            .then(|| FastLockGuard { lock: self })
    }

    pub fn lock_timed(&self, timeout: Duration) -> Option<FastLockGuard<'_, T>> {
        self.lock_until(Instant::now() + timeout)
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    pub fn raw(&self) -> &RawFastLock {
        &self.raw
    }
}

impl<T: Default> Default for FastLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: ?Sized> fmt::Debug for FastLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FastLock").field("raw", &self.raw).finish()
    }
}

impl<T: ?Sized> Deref for FastLockGuard<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        // Safety: holding the guard means holding the lock
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> DerefMut for FastLockGuard<'_, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        // Safety: holding the guard means holding the lock
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T: ?Sized> Drop for FastLockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.raw.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_uncontended_acquire_release() {
        let lock = RawFastLock::new();
        assert!(!lock.is_locked());
        lock.acquire();
        assert!(lock.is_locked());
        lock.release();
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_try_acquire_fails_when_held() {
        let lock = RawFastLock::new();
        assert!(lock.try_acquire());
        assert!(!lock.try_acquire());
        lock.release();
        assert!(lock.try_acquire());
        lock.release();
        assert_eq!(lock.counter.load(Ordering::Relaxed), 0);
        assert_eq!(lock.sem.permits(), 0);
    }

    #[test]
    fn test_acquire_timed_expires() {
        let lock = RawFastLock::new();
        lock.acquire();
        let start = Instant::now();
        assert!(!lock.acquire_timed(Duration::from_millis(50)));
        assert!(start.elapsed() >= Duration::from_millis(50));
        // The timed-out increment was withdrawn
        assert_eq!(lock.counter.load(Ordering::Relaxed), 1);
        lock.release();
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_contended_handoff() {
        let lock = Arc::new(RawFastLock::new());
        lock.acquire();

        let lock_clone = lock.clone();
        let handle = thread::spawn(move || {
            lock_clone.acquire();
            lock_clone.release();
        });

        thread::sleep(Duration::from_millis(50));
        lock.release();
        handle.join().unwrap();
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_try_acquire_racing_release_takes_handoff() {
        let lock = Arc::new(RawFastLock::new());
        for _ in 0..500 {
            lock.acquire();
            let lock_clone = lock.clone();
            let trier = thread::spawn(move || {
                let acquired = lock_clone.try_acquire();
                if acquired {
                    lock_clone.release();
                }
                acquired
            });
            lock.release();
            trier.join().unwrap();
            // Either way no increment or permit is left behind
            assert!(!lock.is_locked());
            assert_eq!(lock.pending_handoffs(), 0);
        }
    }

    #[test]
    fn test_guarded_counter() {
        let lock = Arc::new(FastLock::new(0u64));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lock = lock.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        *lock.lock() += 1;
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(*lock.lock(), 8000);
    }

    #[test]
    #[should_panic(expected = "FastLock released while not held")]
    fn test_release_unlocked_is_fatal() {
        let lock = RawFastLock::with_fatal_action(FatalAction::Panic);
        lock.release();
    }
}
