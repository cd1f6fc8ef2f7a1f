/*!
 * Queued Mutex
 *
 * FIFO-fair mutex. Blocked callers are queued on wait nodes and the lock is
 * handed directly to the head of the queue on unlock, so it is never
 * observable as free while anyone is waiting.
 */

use super::fast::{FastLock, FastLockGuard};
use crate::core::sync::context::SyncContext;
use crate::core::sync::traits::TimerHandle;
use crate::core::sync::wait::{NodeState, WaitList};
use crate::errors::{FatalError, SyncError, SyncResult};
use log::trace;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Queue state protected by the mutex's `FastLock`
#[derive(Debug, Default)]
pub(crate) struct MutexState {
    pub(crate) locked: bool,
    pub(crate) queue: WaitList,
}

/// FIFO mutex built on the shared wait node pool
///
/// # Examples
///
/// ```
/// use qlock_sync::{QueuedMutex, SyncConfig, SyncContext};
///
/// let ctx = SyncContext::new(SyncConfig::default());
/// let mutex = QueuedMutex::new(ctx);
///
/// mutex.lock();
/// assert!(!mutex.try_lock());
/// mutex.unlock();
/// ```
pub struct QueuedMutex {
    ctx: Arc<SyncContext>,
    pub(crate) state: FastLock<MutexState>,
}

impl QueuedMutex {
    pub fn new(ctx: Arc<SyncContext>) -> Self {
        let fatal_action = ctx.config().fatal_action;
        Self {
            ctx,
            state: FastLock::with_fatal_action(MutexState::default(), fatal_action),
        }
    }

    pub fn context(&self) -> &Arc<SyncContext> {
        &self.ctx
    }

    /// Acquire the mutex, queueing behind earlier callers if it is held
    pub fn lock(&self) {
        let mut state = self.state.lock();
        if !state.locked {
            state.locked = true;
            return;
        }

        let pool = self.ctx.pool();
        let node = pool.claim(NodeState::Queuing);
        state.queue.push_back(pool, node);
        trace!("mutex contended, queued {} behind {} waiters", node, state.queue.len() - 1);
        drop(state);

        self.ctx.park(node);
        pool.release(node);
    }

    /// Acquire the mutex only if it is free right now
    pub fn try_lock(&self) -> bool {
        let Some(mut state) = self.state.try_lock() else {
            return false;
        };
        if state.locked {
            return false;
        }
        state.locked = true;
        true
    }

    /// Acquire the mutex, giving up after `timeout`
    ///
    /// On `Err(SyncError::Timeout)` the caller holds nothing and its wait
    /// node is no longer queued.
    pub fn lock_timed(&self, timeout: Duration) -> SyncResult<()> {
        let timer = self.ctx.timer();
        let deadline = timer.schedule(timeout);

        let Some(mut state) = self.lock_state_until(&deadline) else {
            timer.cancel(deadline);
            return Err(SyncError::Timeout);
        };
        if !state.locked {
            timer.cancel(deadline);
            state.locked = true;
            return Ok(());
        }

        let pool = self.ctx.pool();
        let node = pool.claim(NodeState::Queuing);
        state.queue.push_back(pool, node);

        // The deadline may have fired between scheduling and queueing
        if timer.fired(&deadline) {
            state.queue.unlink(pool, node);
            drop(state);
            pool.release(node);
            timer.cancel(deadline);
            return Err(SyncError::Timeout);
        }
        drop(state);

        let woken = self.ctx.park_or_withdraw(node, &deadline, || {
            self.state.lock().queue.try_unlink(pool, node)
        });
        timer.cancel(deadline);
        pool.release(node);

        if woken {
            Ok(())
        } else {
            Err(SyncError::Timeout)
        }
    }

    /// Release the mutex, handing it straight to the longest waiter
    ///
    /// Unlocking a mutex that is not locked is fatal.
    pub fn unlock(&self) {
        let mut state = self.state.lock();
        if !state.locked {
            drop(state);
            self.ctx.fatal(FatalError::NotLocked {
                primitive: "QueuedMutex",
            });
        }

        match state.queue.pop_front(self.ctx.pool()) {
            Some(next) => {
                drop(state);
                self.ctx.hand_off(next);
            }
            None => state.locked = false,
        }
    }

    /// Acquire the mutex and release it when the guard drops
    pub fn lock_guard(&self) -> QueuedMutexGuard<'_> {
        self.lock();
        QueuedMutexGuard { mutex: self }
    }

    pub fn is_locked(&self) -> bool {
        self.state.lock().locked
    }

    /// Number of callers queued for the mutex
    pub fn waiters(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub(crate) fn lock_state_until(
        &self,
        deadline: &TimerHandle,
    ) -> Option<FastLockGuard<'_, MutexState>> {
        match deadline.deadline() {
            Some(instant) => self.state.lock_until(instant),
            None => Some(self.state.lock()),
        }
    }
}

impl fmt::Debug for QueuedMutex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("QueuedMutex")
            .field("locked", &state.locked)
            .field("waiters", &state.queue.len())
            .finish()
    }
}

/// RAII guard; unlocks the `QueuedMutex` when dropped
#[must_use = "if unused, the `QueuedMutex` will immediately unlock"]
pub struct QueuedMutexGuard<'a> {
    mutex: &'a QueuedMutex,
}

impl QueuedMutexGuard<'_> {
    pub fn mutex(&self) -> &QueuedMutex {
        self.mutex
    }
}

impl Drop for QueuedMutexGuard<'_> {
    fn drop(&mut self) {
        self.mutex.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::sync::SyncConfig;
    use std::thread;

    fn mutex() -> Arc<QueuedMutex> {
        Arc::new(QueuedMutex::new(SyncContext::new(SyncConfig::testing(16))))
    }

    fn wait_for_waiters(mutex: &QueuedMutex, n: usize) {
        while mutex.waiters() < n {
            thread::yield_now();
        }
    }

    #[test]
    fn test_uncontended_never_claims_node() {
        let mutex = mutex();
        mutex.lock();
        assert!(mutex.is_locked());
        assert_eq!(mutex.context().pool().in_use(), 0);
        mutex.unlock();
        assert!(!mutex.is_locked());
    }

    #[test]
    fn test_unlock_hands_off_to_waiter() {
        let mutex = mutex();
        mutex.lock();

        let mutex_clone = mutex.clone();
        let handle = thread::spawn(move || {
            mutex_clone.lock();
            mutex_clone.unlock();
        });

        wait_for_waiters(&mutex, 1);
        mutex.unlock();
        handle.join().unwrap();

        assert!(!mutex.is_locked());
        assert_eq!(mutex.context().pool().in_use(), 0);
    }

    #[test]
    fn test_lock_timed_zero_on_held_mutex() {
        let mutex = mutex();
        mutex.lock();
        assert_eq!(mutex.lock_timed(Duration::ZERO), Err(SyncError::Timeout));
        assert_eq!(mutex.waiters(), 0);
        assert_eq!(mutex.context().pool().in_use(), 0);
        assert_eq!(mutex.context().timer().armed(), 0);
        mutex.unlock();
    }

    #[test]
    fn test_lock_timed_on_free_mutex() {
        let mutex = mutex();
        assert_eq!(mutex.lock_timed(Duration::ZERO), Ok(()));
        assert!(mutex.is_locked());
        mutex.unlock();
    }

    #[test]
    fn test_guard_unlocks() {
        let mutex = mutex();
        {
            let guard = mutex.lock_guard();
            assert!(guard.mutex().is_locked());
        }
        assert!(!mutex.is_locked());
    }

    #[test]
    #[should_panic(expected = "QueuedMutex released while not held")]
    fn test_unlock_unlocked_is_fatal() {
        mutex().unlock();
    }
}
