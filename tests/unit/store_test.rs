//! Tests for context store backends and key layout

use std::time::Duration;

use prometheus_process_pool::infra::{ContextStore, FileStore, MemoryStore, StoreExt, StoreKeys};
use serde_json::json;

fn exercise(store: &dyn ContextStore) {
    store.put("k", b"v1", None).unwrap();
    store.put("k", b"v2", None).unwrap();
    assert_eq!(store.get("k").unwrap(), Some(b"v2".to_vec()));
    assert!(store.delete("k").unwrap());
    assert!(!store.delete("k").unwrap());
    assert_eq!(store.get("k").unwrap(), None);

    store
        .put_json("j", &json!({ "n": 1 }), Some(Duration::from_secs(60)))
        .unwrap();
    assert_eq!(
        store.get_json::<serde_json::Value>("j").unwrap(),
        Some(json!({ "n": 1 }))
    );
}

#[test]
fn test_memory_store_contract() {
    exercise(&MemoryStore::new());
}

#[test]
fn test_file_store_contract() {
    let dir = tempfile::tempdir().unwrap();
    exercise(&FileStore::open(dir.path()).unwrap());
}

#[test]
fn test_file_store_visible_across_instances() {
    let dir = tempfile::tempdir().unwrap();
    let writer = FileStore::open(dir.path()).unwrap();
    let reader = FileStore::open(dir.path()).unwrap();
    writer.put("shared", b"ctx", None).unwrap();
    assert_eq!(reader.get("shared").unwrap(), Some(b"ctx".to_vec()));
}

#[tokio::test(start_paused = true)]
async fn test_memory_store_ttl_expiry() {
    let store = MemoryStore::new();
    store.put("hb", b"x", Some(Duration::from_secs(30))).unwrap();
    tokio::time::advance(Duration::from_secs(29)).await;
    assert!(store.get("hb").unwrap().is_some());
    tokio::time::advance(Duration::from_secs(2)).await;
    assert!(store.get("hb").unwrap().is_none());
}

#[test]
fn test_store_keys_are_namespaced() {
    let keys = StoreKeys::new("wf");
    let a = keys.context("exec-1");
    let b = keys.context("exec-2");
    assert_ne!(a, b);
    assert!(a.starts_with("wf"));
    assert_ne!(keys.heartbeat("fleet"), keys.registration("fleet"));
    assert_ne!(keys.requirements(), keys.context("requirements"));
}
