//! Current-value stream for a fixed set of store keys.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use super::CHANNEL_CAPACITY;
use crate::observability::{Event, Logger};
use crate::shutdown::Shutdown;
use crate::store::{CoordinationStore, KeyValue};
use crate::subscriber::error_chain;

/// Options for [`key_stream`]
#[derive(Debug, Clone)]
pub struct KeyStreamOptions {
    /// Keys to follow, matched exactly
    pub keys: Vec<String>,
    /// Interval between periodic re-reads
    pub poll_interval: Duration,
    /// Bound on each periodic read
    pub get_timeout: Duration,
}

/// Emit the value of each key: once immediately, again every poll interval,
/// and on every watched change. Runs until shutdown or until the receiver is
/// dropped.
///
/// Periodic reads cover a watch that misses or drops events; pair the stream
/// with a revision filter to discard the resulting repeats.
pub fn key_stream(
    logger: Logger,
    store: Arc<dyn CoordinationStore>,
    options: KeyStreamOptions,
    shutdown: Shutdown,
) -> mpsc::Receiver<KeyValue> {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

    tokio::spawn(async move {
        let mut watches = Vec::with_capacity(options.keys.len());
        for key in &options.keys {
            match store.watch_prefix(key).await {
                Ok(watch) => watches.push(watch),
                Err(err) => logger.warn(
                    Event::StreamGetError,
                    &[("key", key), ("error", &error_chain(&err))],
                ),
            }
        }

        let (watch_tx, mut watched) = mpsc::unbounded_channel();
        for mut watch in watches {
            let watch_tx = watch_tx.clone();
            tokio::spawn(async move {
                while let Some(event) = watch.recv().await {
                    if watch_tx.send(event).is_err() {
                        break;
                    }
                }
            });
        }
        drop(watch_tx);

        // First tick fires immediately
        let mut ticker = tokio::time::interval(options.poll_interval);
        let mut watching = true;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    for key in &options.keys {
                        let read = tokio::time::timeout(options.get_timeout, store.get(key)).await;
                        let event = match read {
                            Ok(Ok(Some(event))) => event,
                            Ok(Ok(None)) => continue,
                            Ok(Err(err)) => {
                                logger.warn(
                                    Event::StreamGetError,
                                    &[("key", key), ("error", &error_chain(&err))],
                                );
                                continue;
                            }
                            Err(_) => {
                                logger.warn(
                                    Event::StreamGetError,
                                    &[("key", key), ("error", "timed out")],
                                );
                                continue;
                            }
                        };
                        if tx.send(event).await.is_err() {
                            return;
                        }
                    }
                }
                change = watched.recv(), if watching => match change {
                    Some(event) if options.keys.contains(&event.key) => {
                        if tx.send(event).await.is_err() {
                            return;
                        }
                    }
                    Some(_) => {}
                    None => watching = false,
                },
            }
        }
    });

    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn options(keys: &[&str]) -> KeyStreamOptions {
        KeyStreamOptions {
            keys: keys.iter().map(|k| k.to_string()).collect(),
            poll_interval: Duration::from_secs(1),
            get_timeout: Duration::from_millis(500),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_emits_initial_value() {
        let store = Arc::new(MemoryStore::new());
        store.put("/master", "10.0.0.1").await.unwrap();

        let mut stream = key_stream(Logger::discard(), store, options(&["/master"]), Shutdown::never());

        let event = stream.recv().await.unwrap();
        assert_eq!(event.value, "10.0.0.1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_emits_watched_changes_for_exact_keys() {
        let store = Arc::new(MemoryStore::new());
        let mut stream = key_stream(
            Logger::discard(),
            store.clone(),
            options(&["/master"]),
            Shutdown::never(),
        );
        tokio::task::yield_now().await;

        store.put("/master-old", "ignored").await.unwrap();
        store.put("/master", "10.0.0.2").await.unwrap();

        let event = stream.recv().await.unwrap();
        assert_eq!(event.key, "/master");
        assert_eq!(event.value, "10.0.0.2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_reads_repeat_value() {
        let store = Arc::new(MemoryStore::new());
        store.put("/master", "10.0.0.1").await.unwrap();

        let mut stream = key_stream(Logger::discard(), store, options(&["/master"]), Shutdown::never());

        let first = stream.recv().await.unwrap();
        let second = stream.recv().await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closes_on_shutdown() {
        let store = Arc::new(MemoryStore::new());
        let (trigger, shutdown) = crate::shutdown::channel();
        let mut stream = key_stream(Logger::discard(), store, options(&["/master"]), shutdown);

        trigger.trigger();
        assert!(stream.recv().await.is_none());
    }
}
