//! Failover mutual exclusion.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::store::{CoordinationStore, LockHandle, StoreError, StoreResult};

/// Lock held for the duration of one failover run
#[async_trait]
pub trait Locker: Send + Sync {
    async fn lock(&self) -> StoreResult<()>;
    async fn unlock(&self) -> StoreResult<()>;
}

/// Named lock in the coordination store, leased so a crashed coordinator
/// cannot hold it forever
pub struct StoreLocker {
    store: Arc<dyn CoordinationStore>,
    name: String,
    lease: Duration,
    held: Mutex<Option<LockHandle>>,
}

impl StoreLocker {
    pub fn new(store: Arc<dyn CoordinationStore>, name: impl Into<String>, lease: Duration) -> Self {
        Self {
            store,
            name: name.into(),
            lease,
            held: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Locker for StoreLocker {
    async fn lock(&self) -> StoreResult<()> {
        let mut held = self.held.lock().await;
        let handle = self.store.lock(&self.name, self.lease).await?;
        *held = Some(handle);
        Ok(())
    }

    async fn unlock(&self) -> StoreResult<()> {
        let mut held = self.held.lock().await;
        let handle = held
            .take()
            .ok_or_else(|| StoreError::NotLockHolder(self.name.clone()))?;
        self.store.unlock(&handle).await
    }
}
