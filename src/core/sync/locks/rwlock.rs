/*!
 * Queued Reader/Writer Lock
 *
 * Writer-fair RW lock with a single FIFO queue for readers and writers.
 * A reader only bypasses the queue when it is empty and no writer holds the
 * lock; otherwise it waits its turn, so a queued writer is never overtaken by
 * readers that arrive after it.
 */

use super::fast::{FastLock, FastLockGuard};
use crate::core::sync::context::SyncContext;
use crate::core::sync::traits::TimerHandle;
use crate::core::sync::wait::{NodeId, NodeState, WaitList, WaitNodePool};
use crate::errors::{FatalError, SyncError, SyncResult};
use log::trace;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default)]
struct RwState {
    readers: usize,
    writer: bool,
    queue: WaitList,
}

impl RwState {
    #[inline]
    fn admits_reader(&self) -> bool {
        !self.writer && self.queue.is_empty()
    }

    #[inline]
    fn admits_writer(&self) -> bool {
        self.readers == 0 && !self.writer
    }

    /// Detach the run of readers at the head of the queue, counting them in
    fn detach_reader_batch(&mut self, pool: &WaitNodePool) -> WaitList {
        let mut batch = WaitList::new();
        while let Some(next) = self.queue.peek_front() {
            if pool.state(next) != NodeState::QueuingRead {
                break;
            }
            self.queue.pop_front(pool);
            batch.push_back(pool, next);
            self.readers += 1;
        }
        batch
    }
}

#[derive(Debug, Clone, Copy)]
enum Access {
    Read,
    Write,
}

impl Access {
    fn node_state(self) -> NodeState {
        match self {
            Access::Read => NodeState::QueuingRead,
            Access::Write => NodeState::QueuingWrite,
        }
    }
}

/// FIFO reader/writer lock built on the shared wait node pool
pub struct QueuedRWLock {
    ctx: Arc<SyncContext>,
    state: FastLock<RwState>,
}

impl QueuedRWLock {
    pub fn new(ctx: Arc<SyncContext>) -> Self {
        let fatal_action = ctx.config().fatal_action;
        Self {
            ctx,
            state: FastLock::with_fatal_action(RwState::default(), fatal_action),
        }
    }

    pub fn context(&self) -> &Arc<SyncContext> {
        &self.ctx
    }

    /// Acquire shared access
    pub fn read_lock(&self) {
        let mut state = self.state.lock();
        if state.admits_reader() {
            state.readers += 1;
            return;
        }
        self.enqueue_and_park(state, Access::Read);
    }

    /// Acquire shared access only if it is available right now
    pub fn try_read_lock(&self) -> bool {
        let mut state = self.state.lock();
        if state.admits_reader() {
            state.readers += 1;
            return true;
        }
        false
    }

    pub fn read_lock_timed(&self, timeout: Duration) -> SyncResult<()> {
        self.lock_timed(Access::Read, timeout)
    }

    /// Release shared access
    ///
    /// The last reader out hands the lock to the writer at the head of the
    /// queue, if there is one.
    pub fn read_unlock(&self) {
        let mut state = self.state.lock();
        if state.readers == 0 {
            drop(state);
            self.ctx.fatal(FatalError::NotLocked {
                primitive: "QueuedRWLock (read)",
            });
        }
        state.readers -= 1;
        if state.readers > 0 || state.queue.is_empty() {
            return;
        }

        let pool = self.ctx.pool();
        let Some(next) = state.queue.pop_front(pool) else {
            return;
        };
        // With readers holding the lock, only a writer can be first in line
        let found = pool.state(next);
        if found != NodeState::QueuingWrite {
            drop(state);
            self.ctx.fatal(FatalError::QueueCorrupted {
                expected: NodeState::QueuingWrite.name(),
                found: found.name(),
            });
        }
        state.writer = true;
        drop(state);
        self.ctx.hand_off(next);
    }

    /// Acquire exclusive access
    pub fn write_lock(&self) {
        let mut state = self.state.lock();
        if state.admits_writer() {
            state.writer = true;
            return;
        }
        self.enqueue_and_park(state, Access::Write);
    }

    /// Acquire exclusive access only if it is available right now
    pub fn try_write_lock(&self) -> bool {
        let mut state = self.state.lock();
        if state.admits_writer() {
            state.writer = true;
            return true;
        }
        false
    }

    pub fn write_lock_timed(&self, timeout: Duration) -> SyncResult<()> {
        self.lock_timed(Access::Write, timeout)
    }

    /// Release exclusive access
    ///
    /// A writer at the head of the queue gets the lock directly. Otherwise
    /// every reader up to the next queued writer is admitted as one batch:
    /// the batch is counted and detached under the guard, then woken.
    pub fn write_unlock(&self) {
        let mut state = self.state.lock();
        if !state.writer {
            drop(state);
            self.ctx.fatal(FatalError::NotLocked {
                primitive: "QueuedRWLock (write)",
            });
        }

        let pool = self.ctx.pool();
        let Some(head) = state.queue.peek_front() else {
            state.writer = false;
            return;
        };

        if pool.state(head) == NodeState::QueuingWrite {
            state.queue.pop_front(pool);
            drop(state);
            self.ctx.hand_off(head);
            return;
        }

        let batch = state.detach_reader_batch(pool);
        state.writer = false;
        trace!("write unlock admitting {} readers", batch.len());
        drop(state);
        self.wake_readers(batch);
    }

    /// Number of readers currently holding the lock
    pub fn readers(&self) -> usize {
        self.state.lock().readers
    }

    pub fn is_write_locked(&self) -> bool {
        self.state.lock().writer
    }

    /// Number of callers queued for the lock
    pub fn waiters(&self) -> usize {
        self.state.lock().queue.len()
    }

    fn enqueue_and_park(&self, mut state: FastLockGuard<'_, RwState>, access: Access) {
        let pool = self.ctx.pool();
        let node = pool.claim(access.node_state());
        state.queue.push_back(pool, node);
        trace!("rwlock contended, queued {} for {:?}", node, access);
        drop(state);

        self.ctx.park(node);
        pool.release(node);
    }

    fn lock_timed(&self, access: Access, timeout: Duration) -> SyncResult<()> {
        let timer = self.ctx.timer();
        let deadline = timer.schedule(timeout);

        let Some(mut state) = self.lock_state_until(&deadline) else {
            timer.cancel(deadline);
            return Err(SyncError::Timeout);
        };
        match access {
            Access::Read if state.admits_reader() => {
                timer.cancel(deadline);
                state.readers += 1;
                return Ok(());
            }
            Access::Write if state.admits_writer() => {
                timer.cancel(deadline);
                state.writer = true;
                return Ok(());
            }
            _ => {}
        }

        let pool = self.ctx.pool();
        let node = pool.claim(access.node_state());
        state.queue.push_back(pool, node);

        if timer.fired(&deadline) {
            state.queue.unlink(pool, node);
            drop(state);
            pool.release(node);
            timer.cancel(deadline);
            return Err(SyncError::Timeout);
        }
        drop(state);

        let woken = self
            .ctx
            .park_or_withdraw(node, &deadline, || self.withdraw(node));
        timer.cancel(deadline);
        pool.release(node);

        if woken {
            Ok(())
        } else {
            Err(SyncError::Timeout)
        }
    }

    /// Dequeue a timed-out waiter
    ///
    /// A writer leaving the head while readers hold the lock exposes the
    /// readers queued behind it; they are admitted here since no unlock will.
    fn withdraw(&self, node: NodeId) -> bool {
        let pool = self.ctx.pool();
        let mut state = self.state.lock();
        if !state.queue.try_unlink(pool, node) {
            return false;
        }
        if state.writer {
            return true;
        }

        let batch = state.detach_reader_batch(pool);
        drop(state);
        if !batch.is_empty() {
            trace!("withdrawn waiter {} unblocked {} readers", node, batch.len());
        }
        self.wake_readers(batch);
        true
    }

    fn wake_readers(&self, mut batch: WaitList) {
        let pool = self.ctx.pool();
        // Popping before each handoff: a woken reader recycles its node
        while let Some(reader) = batch.pop_front(pool) {
            self.ctx.hand_off(reader);
        }
    }

    fn lock_state_until(&self, deadline: &TimerHandle) -> Option<FastLockGuard<'_, RwState>> {
        match deadline.deadline() {
            Some(instant) => self.state.lock_until(instant),
            None => Some(self.state.lock()),
        }
    }
}

impl fmt::Debug for QueuedRWLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("QueuedRWLock")
            .field("readers", &state.readers)
            .field("writer", &state.writer)
            .field("waiters", &state.queue.len())
            .finish()
    }
}
