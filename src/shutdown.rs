//! Cancellation signal shared by every long-running loop.
//!
//! Loops select on [`Shutdown::cancelled`]; futures dropped as a result take
//! any in-flight subprocess down with them.

use tokio::sync::watch;

/// Fires the shutdown signal for every clone of the paired [`Shutdown`].
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    /// Signal shutdown. Idempotent.
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }

    /// Wrap the trigger so it fires when the guard is dropped
    pub fn into_guard(self) -> ShutdownGuard {
        ShutdownGuard { trigger: self }
    }
}

/// Fires its trigger on drop. Scopes a background task to the lifetime of
/// the code that started it.
#[derive(Debug)]
pub struct ShutdownGuard {
    trigger: ShutdownTrigger,
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        self.trigger.trigger();
    }
}

/// Cloneable receiving half of the shutdown signal.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

/// Create a connected trigger/receiver pair.
pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

impl Shutdown {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    /// Whether shutdown has been signalled.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown has been signalled. Never resolves if the
    /// trigger was dropped without firing.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_trigger_resolves_all_clones() {
        let (trigger, shutdown) = channel();
        let other = shutdown.clone();

        assert!(!shutdown.is_cancelled());
        trigger.trigger();

        shutdown.cancelled().await;
        other.cancelled().await;
        assert!(other.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_does_not_resolve() {
        let shutdown = Shutdown::never();
        let result = tokio::time::timeout(Duration::from_secs(60), shutdown.cancelled()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_guard_fires_on_drop() {
        let (trigger, shutdown) = channel();
        let guard = trigger.into_guard();
        assert!(!shutdown.is_cancelled());

        drop(guard);
        shutdown.cancelled().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_trigger_does_not_cancel() {
        let (trigger, shutdown) = channel();
        drop(trigger);

        let result = tokio::time::timeout(Duration::from_secs(60), shutdown.cancelled()).await;
        assert!(result.is_err());
        assert!(!shutdown.is_cancelled());
    }
}
