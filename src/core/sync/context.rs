/*!
 * Synchronization Context
 *
 * Everything the queued primitives share: the wait node pool, the rendezvous
 * used to park and wake, and the deadline timer. Built explicitly and handed
 * to each primitive, so independent contexts (and mock collaborators) can
 * coexist in one process.
 */

use super::config::SyncConfig;
use super::rendezvous::ParkingLotRendezvous;
use super::timer::ClockTimer;
use super::traits::{DeadlineTimer, Rendezvous, TimerHandle};
use super::wait::{NodeId, WaitNodePool};
use crate::core::limits::{TOKEN_GRANTED, TOKEN_WAITING};
use crate::errors::{fatal, FatalError, SyncResult};
use log::{debug, trace, warn};
use std::fmt;
use std::sync::{Arc, OnceLock};

static GLOBAL_CONTEXT: OnceLock<Arc<SyncContext>> = OnceLock::new();

/// Shared state and collaborators for a family of primitives
pub struct SyncContext {
    config: SyncConfig,
    pool: WaitNodePool,
    rendezvous: Arc<dyn Rendezvous>,
    timer: Arc<dyn DeadlineTimer>,
}

impl SyncContext {
    /// Create a context with the default rendezvous and timer
    ///
    /// # Panics
    ///
    /// Panics if `config.pool_capacity` is 0; see `try_new`.
    pub fn new(config: SyncConfig) -> Arc<Self> {
        Self::builder().with_config(config).build()
    }

    /// Like `new`, but reports an invalid configuration as an error
    pub fn try_new(config: SyncConfig) -> SyncResult<Arc<Self>> {
        Self::builder().with_config(config).try_build()
    }

    pub fn builder() -> SyncContextBuilder {
        SyncContextBuilder::default()
    }

    /// Process-wide context, configured from the environment on first use
    pub fn global() -> Arc<Self> {
        GLOBAL_CONTEXT
            .get_or_init(|| {
                let config = SyncConfig::from_env().unwrap_or_else(|err| {
                    warn!("ignoring invalid sync configuration: {}", err);
                    SyncConfig::default()
                });
                Self::new(config)
            })
            .clone()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn pool(&self) -> &WaitNodePool {
        &self.pool
    }

    pub fn rendezvous(&self) -> &dyn Rendezvous {
        &*self.rendezvous
    }

    pub fn timer(&self) -> &dyn DeadlineTimer {
        &*self.timer
    }

    pub(crate) fn fatal(&self, err: FatalError) -> ! {
        fatal(self.config.fatal_action, err)
    }

    /// Park on `node` until a waker arrives, retrying interruptions
    pub(crate) fn park(&self, node: NodeId) -> usize {
        loop {
            match self.rendezvous.rendezvous(node, TOKEN_WAITING, None) {
                Ok(token) => return token,
                Err(_) => trace!("park on {} interrupted, retrying", node),
            }
        }
    }

    /// Park on `node` until woken or until `deadline` fires
    ///
    /// Returns `None` once the timer reports the deadline as fired. The
    /// check happens before every attempt, so a deadline that fired before
    /// the first park is never slept through.
    pub(crate) fn park_timed(&self, node: NodeId, deadline: &TimerHandle) -> Option<usize> {
        loop {
            if self.timer.fired(deadline) {
                return None;
            }
            if let Ok(token) = self
                .rendezvous
                .rendezvous(node, TOKEN_WAITING, deadline.deadline())
            {
                return Some(token);
            }
        }
    }

    /// Wake the waiter parked on `node`, granting it whatever it queued for
    pub(crate) fn hand_off(&self, node: NodeId) {
        trace!("handing off to waiter {}", node);
        while self
            .rendezvous
            .rendezvous(node, TOKEN_GRANTED, None)
            .is_err()
        {}
    }

    /// Finish a timed park that lost the race against its own deadline
    ///
    /// `withdraw` runs the primitive's dequeue-self step under its guard and
    /// reports whether the node was still queued. If it was not, a waker has
    /// already popped it and is committed to a handoff, which is completed
    /// here. Returns `true` if the caller was woken.
    pub(crate) fn park_or_withdraw(
        &self,
        node: NodeId,
        deadline: &TimerHandle,
        withdraw: impl FnOnce() -> bool,
    ) -> bool {
        if self.park_timed(node, deadline).is_some() {
            return true;
        }
        if withdraw() {
            debug!("waiter {} timed out", node);
            return false;
        }
        debug!("waiter {} timed out after being dequeued, taking handoff", node);
        self.park(node);
        true
    }
}

impl fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncContext")
            .field("config", &self.config)
            .field("pool", &self.pool)
            .field("rendezvous", &self.rendezvous.name())
            .field("timer", &self.timer.name())
            .finish()
    }
}

/// Builder for `SyncContext`
#[derive(Default)]
pub struct SyncContextBuilder {
    config: Option<SyncConfig>,
    rendezvous: Option<Arc<dyn Rendezvous>>,
    timer: Option<Arc<dyn DeadlineTimer>>,
}

impl SyncContextBuilder {
    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Install a custom parking primitive
    ///
    /// It must accept every tag in `0..pool_capacity`.
    pub fn with_rendezvous(mut self, rendezvous: Arc<dyn Rendezvous>) -> Self {
        self.rendezvous = Some(rendezvous);
        self
    }

    pub fn with_timer(mut self, timer: Arc<dyn DeadlineTimer>) -> Self {
        self.timer = Some(timer);
        self
    }

    /// Validate the configuration, then build
    pub fn try_build(mut self) -> SyncResult<Arc<SyncContext>> {
        let config = self.config.take().unwrap_or_default().validate()?;
        Ok(self.with_config(config).build())
    }

    /// # Panics
    ///
    /// Panics if the configured pool capacity is 0. Use `try_build` for
    /// configurations that have not been validated.
    pub fn build(self) -> Arc<SyncContext> {
        let config = self.config.unwrap_or_default();
        let rendezvous = self.rendezvous.unwrap_or_else(|| {
            Arc::new(
                ParkingLotRendezvous::new(config.pool_capacity)
                    .with_fatal_action(config.fatal_action),
            )
        });
        let timer = self
            .timer
            .unwrap_or_else(|| Arc::new(ClockTimer::new()));

        debug!(
            "sync context: {} wait nodes, rendezvous={}, timer={}",
            config.pool_capacity,
            rendezvous.name(),
            timer.name()
        );

        Arc::new(SyncContext {
            pool: WaitNodePool::with_capacity(config.pool_capacity, config.fatal_action),
            config,
            rendezvous,
            timer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::sync::FatalAction;
    use crate::errors::SyncError;

    #[test]
    fn test_builder_defaults() {
        let ctx = SyncContext::builder().build();
        assert_eq!(ctx.pool().capacity(), 1024);
        assert_eq!(ctx.rendezvous().name(), "parking_lot");
        assert_eq!(ctx.timer().name(), "clock");
    }

    #[test]
    fn test_config_flows_into_pool() {
        let ctx = SyncContext::new(SyncConfig::testing(8));
        assert_eq!(ctx.pool().capacity(), 8);
        assert_eq!(ctx.pool().fatal_action(), FatalAction::Panic);
    }

    #[test]
    fn test_try_build_rejects_empty_pool() {
        let result = SyncContext::try_new(SyncConfig::testing(0));
        assert!(matches!(result, Err(SyncError::Configuration(_))));

        let ctx = SyncContext::builder()
            .with_config(SyncConfig::testing(2))
            .try_build()
            .unwrap();
        assert_eq!(ctx.pool().capacity(), 2);
    }

    #[test]
    #[should_panic(expected = "wait node pool needs at least one slot")]
    fn test_build_with_empty_pool_panics() {
        SyncContext::new(SyncConfig::testing(0));
    }

    #[test]
    fn test_global_is_shared() {
        let a = SyncContext::global();
        let b = SyncContext::global();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
