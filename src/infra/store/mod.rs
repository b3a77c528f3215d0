//! Context store backends.
//!
//! The store is the only resource shared between the supervisor and every
//! worker. It holds serialized execution contexts, the cached dependency
//! manifest, and heartbeat snapshots, each under its own namespaced key with an
//! optional TTL.

pub mod file;
pub mod memory;

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::core::StoreError;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Key-value store with per-key expiry.
pub trait ContextStore: Send + Sync {
    /// Write `value` under `key`, replacing any previous value.
    ///
    /// A `ttl` of `None` keeps the value until it is deleted.
    fn put(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<(), StoreError>;
    /// Read the live value under `key`.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
    /// Remove `key`; returns whether a live value was removed.
    fn delete(&self, key: &str) -> Result<bool, StoreError>;
}

impl<S: ContextStore + ?Sized> ContextStore for Arc<S> {
    fn put(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<(), StoreError> {
        (**self).put(key, value, ttl)
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).get(key)
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        (**self).delete(key)
    }
}

/// JSON helpers over any [`ContextStore`].
pub trait StoreExt: ContextStore {
    /// Serialize `value` as JSON and store it.
    ///
    /// # Errors
    ///
    /// `StoreError::Codec` if serialization fails, or the backend's error.
    fn put_json<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(value).map_err(|e| StoreError::Codec(e.to_string()))?;
        self.put(key, &bytes, ttl)
    }

    /// Read and deserialize a JSON value.
    ///
    /// # Errors
    ///
    /// `StoreError::Codec` if the stored bytes are not valid JSON for `T`.
    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        self.get(key)?
            .map(|bytes| serde_json::from_slice(&bytes).map_err(|e| StoreError::Codec(e.to_string())))
            .transpose()
    }
}

impl<S: ContextStore + ?Sized> StoreExt for S {}

/// Key layout shared by the supervisor and its workers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreKeys {
    prefix: String,
}

impl StoreKeys {
    /// Keys under `prefix` (e.g. `"workflow"`).
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Namespace prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Serialized context of one execution.
    #[must_use]
    pub fn context(&self, execution_id: &str) -> String {
        format!("{}:exec:{execution_id}:context", self.prefix)
    }

    /// Cached dependency manifest `{content, hash}`.
    #[must_use]
    pub fn requirements(&self) -> String {
        format!("{}:requirements", self.prefix)
    }

    /// Latest heartbeat of a pool.
    #[must_use]
    pub fn heartbeat(&self, worker_id: &str) -> String {
        format!("{}:pool:{worker_id}:heartbeat", self.prefix)
    }

    /// Fleet registration of a pool.
    #[must_use]
    pub fn registration(&self, worker_id: &str) -> String {
        format!("{}:pool:{worker_id}:registration", self.prefix)
    }
}

impl Default for StoreKeys {
    fn default() -> Self {
        Self::new("workflow")
    }
}
