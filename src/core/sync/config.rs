/*!
 * Synchronization Configuration
 *
 * Runtime configuration for the wait node pool and fatal error policy
 */

use crate::core::limits::{FATAL_ACTION_ENV, POOL_CAPACITY_ENV, WAIT_NODE_POOL_CAPACITY};
use crate::errors::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};

/// What to do when a fatal protocol violation is detected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FatalAction {
    /// Unwind with a panic (useful in tests)
    Panic,
    /// Abort the process immediately
    Abort,
}

impl std::str::FromStr for FatalAction {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "panic" => Ok(FatalAction::Panic),
            "abort" => Ok(FatalAction::Abort),
            other => Err(SyncError::Configuration(format!(
                "unknown fatal action '{}', expected 'panic' or 'abort'",
                other
            ))),
        }
    }
}

/// Synchronization configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Number of wait nodes in the shared pool
    pub pool_capacity: usize,
    /// Reaction to pool exhaustion and lock misuse
    pub fatal_action: FatalAction,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            pool_capacity: WAIT_NODE_POOL_CAPACITY,
            fatal_action: FatalAction::Abort,
        }
    }
}

impl SyncConfig {
    /// Configuration that panics instead of aborting, for test harnesses
    pub const fn testing(pool_capacity: usize) -> Self {
        Self {
            pool_capacity,
            fatal_action: FatalAction::Panic,
        }
    }

    /// Parse a configuration from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> SyncResult<Self> {
        let config: SyncConfig = serde_json::from_str(json)?;
        config.validate()
    }

    /// Default configuration with environment overrides applied
    pub fn from_env() -> SyncResult<Self> {
        let mut config = Self::default();

        if let Ok(capacity) = std::env::var(POOL_CAPACITY_ENV) {
            config.pool_capacity = capacity.trim().parse().map_err(|_| {
                SyncError::Configuration(format!(
                    "{} must be a positive integer, got '{}'",
                    POOL_CAPACITY_ENV, capacity
                ))
            })?;
        }

        if let Ok(action) = std::env::var(FATAL_ACTION_ENV) {
            config.fatal_action = action.parse()?;
        }

        config.validate()
    }

    /// Reject configurations no context can be built from
    pub fn validate(self) -> SyncResult<Self> {
        if self.pool_capacity == 0 {
            return Err(SyncError::Configuration(
                "pool_capacity must be at least 1".into(),
            ));
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.pool_capacity, 1024);
        assert_eq!(config.fatal_action, FatalAction::Abort);
    }

    #[test]
    fn test_from_json_partial() {
        let config = SyncConfig::from_json(r#"{ "fatal_action": "panic" }"#).unwrap();
        assert_eq!(config.pool_capacity, WAIT_NODE_POOL_CAPACITY);
        assert_eq!(config.fatal_action, FatalAction::Panic);
    }

    #[test]
    fn test_from_json_rejects_zero_capacity() {
        let result = SyncConfig::from_json(r#"{ "pool_capacity": 0 }"#);
        assert!(matches!(result, Err(SyncError::Configuration(_))));
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        assert!(SyncConfig::testing(4).validate().is_ok());
        assert!(matches!(
            SyncConfig::testing(0).validate(),
            Err(SyncError::Configuration(_))
        ));
    }

    #[test]
    fn test_fatal_action_parse() {
        assert_eq!("Panic".parse::<FatalAction>().unwrap(), FatalAction::Panic);
        assert_eq!(" abort ".parse::<FatalAction>().unwrap(), FatalAction::Abort);
        assert!("explode".parse::<FatalAction>().is_err());
    }
}
