/*!
 * Lock Primitives
 *
 * - Fast lock (atomic counter + semaphore) guarding queue state
 * - FIFO queued mutex
 * - Writer-fair queued reader/writer lock
 */

mod fast;
mod qmutex;
mod rwlock;

// Re-export public API
pub use fast::{FastLock, FastLockGuard, RawFastLock};
pub use qmutex::{QueuedMutex, QueuedMutexGuard};
pub use rwlock::QueuedRWLock;

pub(crate) use qmutex::MutexState;
