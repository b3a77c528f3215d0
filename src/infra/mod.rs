//! Infrastructure adapters for the shared context store.

pub mod store;

pub use store::{ContextStore, FileStore, MemoryStore, StoreExt, StoreKeys};
