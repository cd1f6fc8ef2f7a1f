/*!
 * Wait Condition
 *
 * Condition-variable-like sleep/wake bound to one `QueuedMutex`. Sleepers sit
 * on the condition's own queue while the mutex stays usable by others; a wake
 * moves them to the *front* of the mutex queue, where they are granted the
 * mutex in order by ordinary unlocks.
 *
 * # Locking
 *
 * Both queues are only touched while holding the mutex's internal
 * `FastLock`. The inner `parking_lot::Mutex` around the sleeper list is
 * therefore never contended; it only gives the list a safe home outside the
 * mutex's own state.
 */

use super::pool::{NodeId, NodeState, WaitList};
use crate::core::sync::locks::{FastLockGuard, MutexState, QueuedMutex};
use crate::errors::{FatalError, SyncError, SyncResult};
use log::{debug, trace};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Sleep/wake queue whose waiters re-enter an associated `QueuedMutex`
///
/// # Examples
///
/// ```
/// use qlock_sync::{QueuedMutex, SyncConfig, SyncContext, WaitCondition};
/// use std::sync::Arc;
///
/// let ctx = SyncContext::new(SyncConfig::default());
/// let mutex = Arc::new(QueuedMutex::new(ctx));
/// let cond = WaitCondition::new(mutex.clone());
///
/// mutex.lock();
/// assert_eq!(cond.wake_one(), 0);
/// mutex.unlock();
/// ```
pub struct WaitCondition {
    mutex: Arc<QueuedMutex>,
    sleepers: Mutex<WaitList>,
}

impl WaitCondition {
    pub fn new(mutex: Arc<QueuedMutex>) -> Self {
        Self {
            mutex,
            sleepers: Mutex::new(WaitList::new()),
        }
    }

    pub fn mutex(&self) -> &Arc<QueuedMutex> {
        &self.mutex
    }

    /// Release the mutex and sleep until woken; the mutex is held again on return
    ///
    /// The caller must hold the mutex.
    pub fn wait(&self) {
        let ctx = self.mutex.context();
        let pool = ctx.pool();

        let me = self.fall_asleep(self.mutex.state.lock());
        ctx.park(me);
        pool.release(me);
    }

    /// Like `wait`, but stop sleeping after `timeout`
    ///
    /// The mutex is held again on return in both cases. A sleeper that was
    /// already woken when the deadline fired reports `Ok(())`.
    pub fn wait_timed(&self, timeout: Duration) -> SyncResult<()> {
        let ctx = self.mutex.context();
        let pool = ctx.pool();
        let timer = ctx.timer();
        let deadline = timer.schedule(timeout);

        // Still holding the mutex if the guard itself cannot be had in time
        let Some(state) = self.mutex.lock_state_until(&deadline) else {
            timer.cancel(deadline);
            return Err(SyncError::Timeout);
        };
        let me = self.fall_asleep(state);

        let woken = ctx.park_or_withdraw(me, &deadline, || {
            let _state = self.mutex.state.lock();
            self.sleepers.lock().try_unlink(pool, me)
        });

        timer.cancel(deadline);
        pool.release(me);
        if woken {
            return Ok(());
        }

        debug!("condition sleeper {} timed out, reacquiring mutex", me);
        self.mutex.lock();
        Err(SyncError::Timeout)
    }

    /// Move the longest sleeper to the front of the mutex queue
    ///
    /// Returns the number of sleepers moved (0 or 1). The sleeper is not
    /// granted the mutex here; it receives it from a later unlock, ahead of
    /// every caller that queued on the mutex normally.
    pub fn wake_one(&self) -> usize {
        let pool = self.mutex.context().pool();
        let mut state = self.locked_state("QueuedMutex (condition wake_one)");

        let Some(node) = self.sleepers.lock().pop_front(pool) else {
            return 0;
        };
        pool.set_state(node, NodeState::Queuing);
        state.queue.push_front(pool, node);
        trace!("condition woke {}", node);
        1
    }

    /// Move every current sleeper to the front of the mutex queue
    ///
    /// Sleepers keep their relative order. Returns how many were moved.
    pub fn wake_all(&self) -> usize {
        let pool = self.mutex.context().pool();
        let mut state = self.locked_state("QueuedMutex (condition wake_all)");

        let mut woken = std::mem::take(&mut *self.sleepers.lock());
        let count = woken.len();
        for node in woken.iter(pool) {
            pool.set_state(node, NodeState::Queuing);
        }
        state.queue.prepend(pool, &mut woken);
        if count > 0 {
            trace!("condition woke {} sleepers", count);
        }
        count
    }

    /// Number of callers asleep on this condition
    pub fn waiters(&self) -> usize {
        let _state = self.mutex.state.lock();
        self.sleepers.lock().len()
    }

    /// Queue the caller as a sleeper and give up the mutex, all under `state`
    fn fall_asleep(&self, mut state: FastLockGuard<'_, MutexState>) -> NodeId {
        let ctx = self.mutex.context();
        let pool = ctx.pool();
        if !state.locked {
            drop(state);
            ctx.fatal(FatalError::NotLocked {
                primitive: "QueuedMutex (condition wait)",
            });
        }

        let me = pool.claim(NodeState::Sleeping);
        self.sleepers.lock().push_back(pool, me);

        // Pass the mutex on exactly as unlock would
        match state.queue.pop_front(pool) {
            Some(next) => {
                drop(state);
                ctx.hand_off(next);
            }
            None => {
                state.locked = false;
                drop(state);
            }
        }
        trace!("condition sleeper {} parked", me);
        me
    }

    fn locked_state(&self, primitive: &'static str) -> FastLockGuard<'_, MutexState> {
        let state = self.mutex.state.lock();
        if !state.locked {
            drop(state);
            self.mutex.context().fatal(FatalError::NotLocked { primitive });
        }
        state
    }
}

impl fmt::Debug for WaitCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitCondition")
            .field("mutex", &self.mutex)
            .field("sleepers", &self.waiters())
            .finish()
    }
}
