/*!
 * QLock Sync Library
 * FIFO-fair blocking locks on a shared wait node pool, exposed as a library
 */

pub mod core;
pub mod errors;

// Re-exports
pub use crate::core::sync::{
    ClockTimer, DeadlineTimer, FastLock, FastLockGuard, FatalAction, Interrupted, NodeId,
    NodeState, ParkingLotRendezvous, QueuedMutex, QueuedMutexGuard, QueuedRWLock, RawFastLock,
    Rendezvous, Semaphore, SyncConfig, SyncContext, SyncContextBuilder, TimerHandle,
    WaitCondition, WaitList, WaitNodePool,
};
pub use errors::{FatalError, SyncError, SyncResult};
