//! Tests for configuration validation

use std::time::Duration;

use prometheus_process_pool::config::PoolConfig;

#[test]
fn test_pool_config_defaults() {
    let cfg = PoolConfig::default();
    assert_eq!(cfg.min_workers, 2);
    assert_eq!(cfg.max_workers, 10);
    assert_eq!(cfg.execution_timeout_seconds, 300);
    assert_eq!(cfg.graceful_shutdown_seconds, 5);
    assert_eq!(cfg.recycle_after_executions, 0);
    assert_eq!(cfg.heartbeat_interval_seconds, 10);
    assert_eq!(cfg.registration_ttl_seconds, 30);
    assert!(!cfg.worker_id.is_empty());
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_pool_config_invalid_min_workers() {
    assert!(PoolConfig::new().with_min_workers(0).validate().is_err());
}

#[test]
fn test_pool_config_min_exceeds_max() {
    let err = PoolConfig::new()
        .with_min_workers(5)
        .with_max_workers(3)
        .validate()
        .unwrap_err();
    assert!(err.contains("min_workers"));
}

#[test]
fn test_pool_config_invalid_timeout() {
    assert!(PoolConfig::new()
        .with_execution_timeout_seconds(0)
        .validate()
        .is_err());
}

#[test]
fn test_registration_ttl_must_outlive_heartbeat() {
    assert!(PoolConfig::new().with_heartbeat(30, 30).validate().is_err());
    assert!(PoolConfig::new().with_heartbeat(5, 15).validate().is_ok());
}

#[test]
fn test_pool_config_from_json_partial() {
    let cfg = PoolConfig::from_json_str(
        r#"{ "worker_id": "fleet-a", "min_workers": 1, "max_workers": 3, "recycle_after_executions": 50 }"#,
    )
    .unwrap();
    assert_eq!(cfg.worker_id, "fleet-a");
    assert_eq!(cfg.max_workers, 3);
    assert_eq!(cfg.recycle_after_executions, 50);
    assert_eq!(cfg.execution_timeout(), Duration::from_secs(300));
}

#[test]
fn test_pool_config_from_json_rejects_invalid() {
    assert!(PoolConfig::from_json_str(r#"{ "min_workers": 4, "max_workers": 2 }"#).is_err());
    assert!(PoolConfig::from_json_str("not json").is_err());
}

#[test]
fn test_sized_for_host_is_valid() {
    let cfg = PoolConfig::sized_for_host();
    assert!(cfg.max_workers >= cfg.min_workers);
    assert!(cfg.validate().is_ok());
}
