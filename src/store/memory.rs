//! In-process coordination store.
//!
//! Every mutation happens under one mutex and bumps a single global revision,
//! so reads, writes and watch deliveries are linearizable. Locks are leases:
//! a holder that neither unlocks nor is around to unlock loses the lock once
//! the lease runs out.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;
use uuid::Uuid;

use super::errors::{StoreError, StoreResult};
use super::{CoordinationStore, KeyValue, LockHandle, WatchStream};

struct Watcher {
    prefix: String,
    tx: mpsc::UnboundedSender<KeyValue>,
}

struct Lease {
    owner: Uuid,
    expires_at: Instant,
}

#[derive(Default)]
struct State {
    revision: i64,
    entries: HashMap<String, KeyValue>,
    watchers: Vec<Watcher>,
    locks: HashMap<String, Lease>,
    unavailable: bool,
}

impl State {
    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable {
            return Err(StoreError::Unavailable("store marked unavailable".into()));
        }
        Ok(())
    }

    fn write(&mut self, key: &str, value: &str) -> KeyValue {
        self.revision += 1;
        let kv = KeyValue::new(key, value, self.revision);
        self.entries.insert(key.to_string(), kv.clone());

        // Closed watch streams are dropped on the next write
        self.watchers.retain(|w| {
            !kv.key.starts_with(&w.prefix) || w.tx.send(kv.clone()).is_ok()
        });

        kv
    }
}

/// Linearizable in-memory coordination store
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    lock_released: Notify,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail (or succeed again)
    pub fn set_available(&self, available: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.unavailable = !available;
        }
    }

    /// Current global revision
    pub fn revision(&self) -> i64 {
        self.state.lock().map(|s| s.revision).unwrap_or_default()
    }

    /// Whether the named lock is currently held by a live lease
    pub fn is_locked(&self, name: &str) -> bool {
        self.state
            .lock()
            .map(|s| {
                s.locks
                    .get(name)
                    .map(|l| l.expires_at > Instant::now())
                    .unwrap_or(false)
            })
            .unwrap_or(false)
    }

    fn state(&self) -> StoreResult<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("lock poisoned".into()))
    }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<KeyValue>> {
        let state = self.state()?;
        state.check_available()?;
        Ok(state.entries.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> StoreResult<KeyValue> {
        let mut state = self.state()?;
        state.check_available()?;
        Ok(state.write(key, value))
    }

    async fn put_if_changed(&self, key: &str, value: &str) -> StoreResult<bool> {
        let mut state = self.state()?;
        state.check_available()?;

        if state.entries.get(key).map(|kv| kv.value.as_str()) == Some(value) {
            return Ok(false);
        }

        state.write(key, value);
        Ok(true)
    }

    async fn watch_prefix(&self, prefix: &str) -> StoreResult<WatchStream> {
        let mut state = self.state()?;
        state.check_available()?;

        let (tx, rx) = mpsc::unbounded_channel();
        state.watchers.push(Watcher {
            prefix: prefix.to_string(),
            tx,
        });
        Ok(rx)
    }

    async fn lock(&self, name: &str, lease: Duration) -> StoreResult<LockHandle> {
        let owner = Uuid::new_v4();

        loop {
            let (released, wait_until) = {
                let mut state = self.state()?;
                state.check_available()?;

                let now = Instant::now();
                match state.locks.get(name) {
                    Some(held) if held.expires_at > now => {
                        // Registered before the guard drops, so an unlock in
                        // between still wakes us
                        (self.lock_released.notified(), held.expires_at)
                    }
                    _ => {
                        state.locks.insert(
                            name.to_string(),
                            Lease {
                                owner,
                                expires_at: now + lease,
                            },
                        );
                        return Ok(LockHandle {
                            name: name.to_string(),
                            owner,
                        });
                    }
                }
            };

            tokio::select! {
                _ = released => {}
                _ = tokio::time::sleep_until(wait_until) => {}
            }
        }
    }

    async fn unlock(&self, handle: &LockHandle) -> StoreResult<()> {
        let mut state = self.state()?;
        state.check_available()?;

        match state.locks.get(&handle.name) {
            Some(held) if held.owner == handle.owner => {
                state.locks.remove(&handle.name);
                drop(state);
                self.lock_released.notify_waiters();
                Ok(())
            }
            _ => Err(StoreError::NotLockHolder(handle.name.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_put_and_get() {
        let store = MemoryStore::new();
        assert_eq!(store.get("/master").await.unwrap(), None);

        let kv = store.put("/master", "10.0.0.1").await.unwrap();
        assert_eq!(kv.mod_revision, 1);
        assert_eq!(store.get("/master").await.unwrap(), Some(kv));
    }

    #[tokio::test]
    async fn test_revisions_are_global_and_monotonic() {
        let store = MemoryStore::new();
        let a = store.put("/a", "1").await.unwrap();
        let b = store.put("/b", "1").await.unwrap();
        let a2 = store.put("/a", "2").await.unwrap();

        assert!(a.mod_revision < b.mod_revision);
        assert!(b.mod_revision < a2.mod_revision);
    }

    #[tokio::test]
    async fn test_put_if_changed_skips_identical_values() {
        let store = MemoryStore::new();
        let mut watch = store.watch_prefix("/").await.unwrap();

        assert!(store.put_if_changed("/master", "10.0.0.1").await.unwrap());
        assert!(!store.put_if_changed("/master", "10.0.0.1").await.unwrap());
        assert!(store.put_if_changed("/master", "10.0.0.2").await.unwrap());

        assert_eq!(watch.recv().await.unwrap().value, "10.0.0.1");
        assert_eq!(watch.recv().await.unwrap().value, "10.0.0.2");
        assert!(watch.try_recv().is_err());
        assert_eq!(store.revision(), 2);
    }

    #[tokio::test]
    async fn test_watch_is_prefix_scoped() {
        let store = MemoryStore::new();
        let mut watch = store.watch_prefix("/cluster/").await.unwrap();

        store.put("/other", "x").await.unwrap();
        store.put("/cluster/master", "y").await.unwrap();

        let kv = watch.recv().await.unwrap();
        assert_eq!(kv.key, "/cluster/master");
        assert!(watch.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unavailable_store_fails() {
        let store = MemoryStore::new();
        store.set_available(false);
        assert!(matches!(store.get("/a").await, Err(StoreError::Unavailable(_))));
        assert!(store.put_if_changed("/a", "1").await.is_err());

        store.set_available(true);
        assert!(store.put_if_changed("/a", "1").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_waits_for_release() {
        let store = Arc::new(MemoryStore::new());
        let first = store.lock("failover", Duration::from_secs(60)).await.unwrap();
        assert!(store.is_locked("failover"));

        let contender = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.lock("failover", Duration::from_secs(60)).await })
        };

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!contender.is_finished());

        store.unlock(&first).await.unwrap();
        let second = contender.await.unwrap().unwrap();
        assert_ne!(second.owner, first.owner);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_lease_expires() {
        let store = MemoryStore::new();
        let _abandoned = store.lock("failover", Duration::from_secs(5)).await.unwrap();

        let started = Instant::now();
        store.lock("failover", Duration::from_secs(5)).await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_acquire_can_be_bounded() {
        let store = MemoryStore::new();
        let _held = store.lock("failover", Duration::from_secs(60)).await.unwrap();

        let result = tokio::time::timeout(
            Duration::from_secs(1),
            store.lock("failover", Duration::from_secs(60)),
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_unlock_by_non_holder_rejected() {
        let store = MemoryStore::new();
        let held = store.lock("failover", Duration::from_secs(60)).await.unwrap();

        let impostor = LockHandle {
            name: held.name.clone(),
            owner: Uuid::new_v4(),
        };
        assert_eq!(
            store.unlock(&impostor).await,
            Err(StoreError::NotLockHolder("failover".into()))
        );
        assert!(store.is_locked("failover"));
    }
}
