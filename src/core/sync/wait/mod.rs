/*!
 * Wait Machinery
 *
 * The shared wait node arena, the FIFO lists threaded through it, and the
 * condition primitive that moves sleepers between lists.
 */

mod condition;
mod pool;

// Re-export public API
pub use condition::WaitCondition;
pub use pool::{NodeId, NodeState, WaitList, WaitNodePool};
