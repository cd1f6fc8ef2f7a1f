/*!
 * Synchronization Traits
 *
 * Boundary collaborators every blocking primitive is built on: a rendezvous
 * that parks one thread until a partner arrives with the same tag, and a
 * deadline timer for bounded waits.
 *
 * # Design: Trait Objects at the Seams
 *
 * The primitives only ever see these traits through a `SyncContext`, so tests
 * can swap in mocks that inject interruptions or fire deadlines on demand.
 */

use super::wait::NodeId;
use std::time::{Duration, Instant};
use thiserror::Error;

/// The rendezvous returned without exchanging a value; retry the call unchanged
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("rendezvous interrupted")]
pub struct Interrupted;

/// Two-party value exchange keyed by a wait node
///
/// Implementations must be:
/// - **Pairwise**: exactly two calls with the same tag meet, and each returns
///   the other's `value`
/// - **Order-agnostic**: either party may arrive first and block
/// - **Retry-safe**: an `Err(Interrupted)` carries no state change
pub trait Rendezvous: Send + Sync {
    /// Block until a partner calls with the same `tag`, then swap values
    ///
    /// Returns `Err(Interrupted)` if `deadline` passes first, or if the call
    /// lost a race and must simply be repeated.
    fn rendezvous(
        &self,
        tag: NodeId,
        value: usize,
        deadline: Option<Instant>,
    ) -> Result<usize, Interrupted>;

    /// Get implementation name for debugging
    fn name(&self) -> &'static str;
}

/// Registration returned by `DeadlineTimer::schedule`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle {
    id: u64,
    deadline: Option<Instant>,
}

impl TimerHandle {
    pub const fn new(id: u64, deadline: Option<Instant>) -> Self {
        Self { id, deadline }
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Instant after which a parked waiter should be interrupted, if known
    #[inline]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

/// Deadline service used by every `*_timed` operation
pub trait DeadlineTimer: Send + Sync {
    /// Register a wakeup `timeout` from now
    fn schedule(&self, timeout: Duration) -> TimerHandle;

    /// Has the registered deadline already fired?
    fn fired(&self, handle: &TimerHandle) -> bool;

    /// Drop the registration if it has not fired yet
    fn cancel(&self, handle: TimerHandle);

    /// Number of registrations not yet cancelled (for diagnostics)
    fn armed(&self) -> usize {
        0
    }

    /// Get implementation name for debugging
    fn name(&self) -> &'static str;
}
