/*!
 * Error Types
 * Recoverable results and fatal protocol violations, with thiserror and miette
 */

use crate::core::sync::FatalAction;
use miette::Diagnostic;
use thiserror::Error;

/// Result type for blocking operations that can time out
pub type SyncResult<T> = Result<T, SyncError>;

/// Recoverable outcomes of synchronization calls
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum SyncError {
    #[error("Wait operation timed out")]
    #[diagnostic(
        code(sync::timeout),
        help("The deadline fired before the lock was granted. The caller holds nothing from this wait.")
    )]
    Timeout,

    #[error("Configuration error: {0}")]
    #[diagnostic(
        code(sync::configuration_error),
        help("Invalid configuration. Review pool capacity and fatal action settings.")
    )]
    Configuration(String),
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Configuration(err.to_string())
    }
}

/// Conditions that mean continuing would corrupt a wait queue or lose a wakeup
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum FatalError {
    #[error("Wait node pool exhausted: all {capacity} nodes are in use")]
    #[diagnostic(
        code(sync::pool_exhausted),
        help("More callers are blocked at once than the pool allows. Raise pool_capacity.")
    )]
    PoolExhausted { capacity: usize },

    #[error("Wait node {node} is not linked into this queue")]
    #[diagnostic(
        code(sync::node_not_queued),
        help("A node was released twice or unlinked from the wrong queue.")
    )]
    NodeNotQueued { node: usize },

    #[error("{primitive} released while not held")]
    #[diagnostic(
        code(sync::not_locked),
        help("Every unlock must be paired with a successful lock by the same caller.")
    )]
    NotLocked { primitive: &'static str },

    #[error("Queue head is {found} where {expected} was required")]
    #[diagnostic(
        code(sync::queue_corrupted),
        help("A waiter of the wrong kind is queued. This is a bug in the lock.")
    )]
    QueueCorrupted {
        expected: &'static str,
        found: &'static str,
    },

    #[error("Rendezvous tag {tag} is outside the {slots} available slots")]
    #[diagnostic(
        code(sync::tag_out_of_range),
        help("The rendezvous must have at least as many slots as the wait node pool.")
    )]
    TagOutOfRange { tag: usize, slots: usize },
}

/// Report a fatal condition and stop the caller
///
/// Logs the error, then panics or aborts the process depending on `action`.
#[cold]
#[inline(never)]
pub fn fatal(action: FatalAction, err: FatalError) -> ! {
    log::error!("fatal synchronization error: {}", err);
    match action {
        FatalAction::Panic => panic!("{}", err),
        FatalAction::Abort => std::process::abort(),
    }
}
