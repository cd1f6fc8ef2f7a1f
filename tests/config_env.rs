/*!
 * Configuration Environment Tests
 *
 * Serialized because they mutate process-wide environment variables
 */

use pretty_assertions::assert_eq;
use qlock_sync::{FatalAction, SyncConfig, SyncError};
use serial_test::serial;
use std::env;

const POOL_CAPACITY: &str = "QLOCK_POOL_CAPACITY";
const FATAL_ACTION: &str = "QLOCK_FATAL_ACTION";

fn clear_env() {
    env::remove_var(POOL_CAPACITY);
    env::remove_var(FATAL_ACTION);
}

#[test]
#[serial]
fn test_from_env_defaults() {
    clear_env();
    assert_eq!(SyncConfig::from_env().unwrap(), SyncConfig::default());
}

#[test]
#[serial]
fn test_from_env_overrides() {
    clear_env();
    env::set_var(POOL_CAPACITY, "64");
    env::set_var(FATAL_ACTION, "panic");

    let config = SyncConfig::from_env().unwrap();
    assert_eq!(config.pool_capacity, 64);
    assert_eq!(config.fatal_action, FatalAction::Panic);
    clear_env();
}

#[test]
#[serial]
fn test_from_env_rejects_bad_capacity() {
    clear_env();
    env::set_var(POOL_CAPACITY, "lots");
    assert!(matches!(
        SyncConfig::from_env(),
        Err(SyncError::Configuration(_))
    ));

    env::set_var(POOL_CAPACITY, "0");
    assert!(matches!(
        SyncConfig::from_env(),
        Err(SyncError::Configuration(_))
    ));
    clear_env();
}

#[test]
#[serial]
fn test_from_env_rejects_unknown_action() {
    clear_env();
    env::set_var(FATAL_ACTION, "shrug");
    let err = SyncConfig::from_env().unwrap_err();
    assert!(err.to_string().contains("shrug"));
    clear_env();
}
