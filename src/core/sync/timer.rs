/*!
 * Monotonic Deadline Timer
 *
 * Default `DeadlineTimer`: a deadline fires once the monotonic clock passes
 * it. Armed registrations live in a sharded map so cancellation is visible to
 * diagnostics and tests.
 */

use super::traits::{DeadlineTimer, TimerHandle};
use ahash::RandomState;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Deadline timer backed by `Instant`
pub struct ClockTimer {
    next_id: AtomicU64,
    armed: DashMap<u64, Instant, RandomState>,
}

impl ClockTimer {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            armed: DashMap::with_hasher(RandomState::new()),
        }
    }
}

impl Default for ClockTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl DeadlineTimer for ClockTimer {
    fn schedule(&self, timeout: Duration) -> TimerHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        // A deadline past the end of the clock never fires
        let deadline = Instant::now().checked_add(timeout);
        if let Some(deadline) = deadline {
            self.armed.insert(id, deadline);
        }
        TimerHandle::new(id, deadline)
    }

    fn fired(&self, handle: &TimerHandle) -> bool {
        match handle.deadline() {
            Some(deadline) => Instant::now() >= deadline,
            None => false,
        }
    }

    fn cancel(&self, handle: TimerHandle) {
        self.armed.remove(&handle.id());
    }

    fn armed(&self) -> usize {
        self.armed.len()
    }

    fn name(&self) -> &'static str {
        "clock"
    }
}
