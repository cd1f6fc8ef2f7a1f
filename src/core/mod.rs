/*!
 * Core Module
 * Synchronization primitives and the limits they are sized by
 */

pub mod limits;
pub mod sync;

// Re-export for convenience
pub use sync::*;
