/*!
 * Synchronization Primitives
 *
 * Blocking locks built on a shared, fixed-capacity pool of wait nodes:
 * - `FastLock`: one atomic increment when uncontended, semaphore otherwise
 * - `QueuedMutex`: FIFO mutex with direct handoff to the next waiter
 * - `QueuedRWLock`: one FIFO queue for readers and writers, writer-fair
 * - `WaitCondition`: sleep/wake that re-queues sleepers on a `QueuedMutex`
 *
 * # Architecture
 *
 * Every queued primitive borrows wait nodes from the `WaitNodePool` of its
 * `SyncContext` and blocks only through the context's `Rendezvous`. Timed
 * variants schedule a deadline with the context's `DeadlineTimer` and, on
 * expiry, dequeue themselves under the primitive's `FastLock`.
 *
 * # Allocation
 *
 * Nothing on a blocking path allocates: the pool is sized once, and its
 * capacity bounds how many callers can be blocked at the same time.
 */

mod config;
mod context;
mod rendezvous;
mod semaphore;
mod timer;
mod traits;

pub mod locks;
pub mod wait;

pub use config::{FatalAction, SyncConfig};
pub use context::{SyncContext, SyncContextBuilder};
pub use locks::{FastLock, FastLockGuard, QueuedMutex, QueuedMutexGuard, QueuedRWLock, RawFastLock};
pub use traits::{DeadlineTimer, Interrupted, Rendezvous, TimerHandle};
pub use wait::{NodeId, NodeState, WaitCondition, WaitList, WaitNodePool};

// Re-export default collaborators for advanced users
pub use rendezvous::ParkingLotRendezvous;
pub use semaphore::Semaphore;
pub use timer::ClockTimer;
