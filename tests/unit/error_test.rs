//! Tests for error types

use prometheus_process_pool::core::{PoolError, StoreError};

#[test]
fn test_store_error_converts_into_pool_error() {
    let err: PoolError = StoreError::Unavailable("redis down".into()).into();
    assert!(matches!(err, PoolError::Store(StoreError::Unavailable(_))));
    assert_eq!(err.to_string(), "store unavailable: redis down");
}

#[test]
fn test_transient_store_errors() {
    assert!(StoreError::Unavailable("x".into()).is_transient());
    assert!(StoreError::Io("x".into()).is_transient());
    assert!(!StoreError::Codec("x".into()).is_transient());
}

#[test]
fn test_pool_error_messages() {
    assert_eq!(
        PoolError::DuplicateExecution("exec-1".into()).to_string(),
        "execution `exec-1` is already routed"
    );
    assert_eq!(PoolError::NotRunning.to_string(), "pool is not running");
    assert!(PoolError::Spawn("no such file".into())
        .to_string()
        .contains("no such file"));
}
