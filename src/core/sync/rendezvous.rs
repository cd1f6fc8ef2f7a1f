/*!
 * Parking-Lot Rendezvous
 *
 * Default `Rendezvous` built on parking_lot_core. One parking slot per wait
 * node; the slot's address is the parking key and its flag records whether a
 * first arrival is already asleep there.
 *
 * # Design
 *
 * - Zero allocations after initialization
 * - Stable slot addresses for the lifetime of the rendezvous
 * - The flag is only read and written under the parking bucket lock (inside
 *   the `validate`, `timed_out` and unpark callbacks)
 */

use super::traits::{Interrupted, Rendezvous};
use super::wait::NodeId;
use super::FatalAction;
use crate::errors::{fatal, FatalError};
use parking_lot_core::{park, unpark_filter, FilterOp, ParkResult, ParkToken, UnparkToken};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

#[repr(C, align(64))] // Cache-line aligned to prevent false sharing
struct RendezvousSlot {
    parked: AtomicBool,
}

impl RendezvousSlot {
    const fn new() -> Self {
        Self {
            parked: AtomicBool::new(false),
        }
    }

    #[inline]
    fn key(&self) -> usize {
        &self.parked as *const AtomicBool as usize
    }
}

/// Rendezvous with one parking slot per tag
pub struct ParkingLotRendezvous {
    slots: Box<[RendezvousSlot]>,
    fatal_action: FatalAction,
}

impl ParkingLotRendezvous {
    /// Create a rendezvous accepting tags `0..slots`
    pub fn new(slots: usize) -> Self {
        Self {
            slots: (0..slots).map(|_| RendezvousSlot::new()).collect(),
            fatal_action: FatalAction::Abort,
        }
    }

    pub fn with_fatal_action(mut self, fatal_action: FatalAction) -> Self {
        self.fatal_action = fatal_action;
        self
    }

    pub fn slots(&self) -> usize {
        self.slots.len()
    }

    /// Is a first arrival currently asleep on `tag`? (for diagnostics)
    pub fn is_parked(&self, tag: NodeId) -> bool {
        self.slot(tag).parked.load(Ordering::Relaxed)
    }

    fn slot(&self, tag: NodeId) -> &RendezvousSlot {
        match self.slots.get(tag.index()) {
            Some(slot) => slot,
            None => fatal(
                self.fatal_action,
                FatalError::TagOutOfRange {
                    tag: tag.index(),
                    slots: self.slots.len(),
                },
            ),
        }
    }
}

impl Rendezvous for ParkingLotRendezvous {
    fn rendezvous(
        &self,
        tag: NodeId,
        value: usize,
        deadline: Option<Instant>,
    ) -> Result<usize, Interrupted> {
        let slot = self.slot(tag);
        let key = slot.key();

        // Second arrival: take the sleeper's value and hand over ours
        let mut theirs = None;
        // SAFETY: the callbacks neither panic nor call back into the parking lot.
        unsafe {
            unpark_filter(
                key,
                |ParkToken(parked_value)| {
                    if theirs.is_some() {
                        return FilterOp::Stop;
                    }
                    theirs = Some(parked_value);
                    FilterOp::Unpark
                },
                |result| {
                    if result.unparked_threads != 0 {
                        slot.parked.store(false, Ordering::Relaxed);
                    }
                    UnparkToken(value)
                },
            );
        }
        if let Some(theirs) = theirs {
            return Ok(theirs);
        }

        // First arrival: sleep until the partner shows up
        // SAFETY: the callbacks neither panic nor call back into the parking lot.
        let result = unsafe {
            park(
                key,
                || !slot.parked.swap(true, Ordering::Relaxed),
                || {},
                |_, _| slot.parked.store(false, Ordering::Relaxed),
                ParkToken(value),
                deadline,
            )
        };

        match result {
            ParkResult::Unparked(UnparkToken(theirs)) => Ok(theirs),
            // Invalid: a partner fell asleep between our two steps
            ParkResult::Invalid | ParkResult::TimedOut => Err(Interrupted),
        }
    }

    fn name(&self) -> &'static str {
        "parking_lot"
    }
}
