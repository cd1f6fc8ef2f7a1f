/*!
 * Synchronization Limits and Constants
 *
 * Centralized location for pool sizes, handoff tokens and environment keys.
 */

// =============================================================================
// WAIT NODE POOL
// =============================================================================

/// Default number of wait nodes shared by every primitive in a context
/// Hard upper bound on callers blocked at the same time
pub const WAIT_NODE_POOL_CAPACITY: usize = 1024;

/// Sentinel for "no next node" in a wait list link
pub const NIL_NODE: usize = usize::MAX;

// =============================================================================
// RENDEZVOUS TOKENS
// =============================================================================

/// Value a parked waiter offers to whoever wakes it
pub const TOKEN_WAITING: usize = 1;

/// Value handed to a waiter that now owns the lock it queued for
pub const TOKEN_GRANTED: usize = 0x12345;

// =============================================================================
// ENVIRONMENT OVERRIDES
// =============================================================================

/// Overrides `SyncConfig::pool_capacity`
pub const POOL_CAPACITY_ENV: &str = "QLOCK_POOL_CAPACITY";

/// Overrides `SyncConfig::fatal_action` (`panic` or `abort`)
pub const FATAL_ACTION_ENV: &str = "QLOCK_FATAL_ACTION";
