//! Coordination Store
//!
//! The one resource shared between components and across nodes. This crate
//! only consumes its primitives:
//!
//! - linearizable `get`
//! - conditional `put_if_changed`, so identical values never wake watchers
//! - prefix-scoped watch streams of ordered `(key, value, revision)` events
//! - a leased mutual-exclusion lock
//!
//! `EtcdStore` talks to an etcd cluster. `MemoryStore` is an in-process
//! implementation with the same guarantees.

mod errors;
mod etcd;
mod memory;
mod updater;

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

pub use errors::{StoreError, StoreResult};
pub use etcd::EtcdStore;
pub use memory::MemoryStore;
pub use updater::StoreUpdater;

/// A key, its value and the store revision that last modified it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
    pub mod_revision: i64,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>, mod_revision: i64) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            mod_revision,
        }
    }
}

/// Ordered stream of modifications under a watched prefix
pub type WatchStream = tokio::sync::mpsc::UnboundedReceiver<KeyValue>;

/// Proof of holding a named lock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockHandle {
    /// Lock name
    pub name: String,
    /// Session that holds it
    pub owner: Uuid,
}

/// Primitives consumed from the coordination store
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Current value of a key
    async fn get(&self, key: &str) -> StoreResult<Option<KeyValue>>;

    /// Unconditionally write a key
    async fn put(&self, key: &str, value: &str) -> StoreResult<KeyValue>;

    /// Write a key only if its current value differs. Returns whether a
    /// write happened.
    async fn put_if_changed(&self, key: &str, value: &str) -> StoreResult<bool>;

    /// Watch every key under `prefix`, from now on
    async fn watch_prefix(&self, prefix: &str) -> StoreResult<WatchStream>;

    /// Acquire a named lock, waiting for the current holder. The lock lapses
    /// if not released within `lease`.
    async fn lock(&self, name: &str, lease: Duration) -> StoreResult<LockHandle>;

    /// Release a lock previously acquired with [`CoordinationStore::lock`]
    async fn unlock(&self, handle: &LockHandle) -> StoreResult<()>;
}
