//! # Event Subscriber
//!
//! Dispatches store changes to per-key handlers. Keys are matched exactly;
//! handlers for different keys run concurrently and never block each other.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use super::errors::{SubscriberError, SubscriberResult};
use super::handler::{error_chain, Handler, IdempotentHandler};
use crate::observability::{Event, Logger};
use crate::shutdown::Shutdown;
use crate::store::{CoordinationStore, KeyValue};

/// Watches a store prefix (or consumes a fed channel) and dispatches
pub struct EventSubscriber {
    store: Arc<dyn CoordinationStore>,
    prefix: String,
    retry_interval: Duration,
    handlers: HashMap<String, Arc<IdempotentHandler>>,
    logger: Logger,
}

impl EventSubscriber {
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        prefix: impl Into<String>,
        retry_interval: Duration,
        logger: Logger,
    ) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            retry_interval,
            handlers: HashMap::new(),
            logger,
        }
    }

    /// Register `handler` for `key`. Must happen before [`Self::start`] or
    /// [`Self::consume`]; a later registration for the same key replaces the
    /// earlier one.
    pub fn add_handler(&mut self, key: impl Into<String>, name: impl Into<String>, handler: Arc<dyn Handler>) {
        let key = key.into();
        let name = name.into();

        self.logger
            .info(Event::HandlerAdd, &[("handler", &name), ("key", &key)]);

        let registration = IdempotentHandler::new(
            name,
            handler,
            self.retry_interval,
            self.logger.clone(),
        );
        self.handlers.insert(key, Arc::new(registration));
    }

    /// Keys with a registered handler
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// Open the watch, boot every registered key from its current store
    /// value, then dispatch watched changes until shutdown or until the watch
    /// closes. A write racing the boot read arrives on the watch; the
    /// handler's revision guard drops whichever copy is stale.
    pub async fn start(&self, shutdown: Shutdown) -> SubscriberResult<()> {
        let mut watch = self
            .store
            .watch_prefix(&self.prefix)
            .await
            .map_err(|source| SubscriberError::Watch {
                prefix: self.prefix.clone(),
                source,
            })?;

        self.logger.info(Event::WatchStart, &[("prefix", &self.prefix)]);
        self.boot(&shutdown).await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                change = watch.recv() => match change {
                    Some(event) => {
                        self.logger.trace(
                            Event::WatchChange,
                            &[
                                ("key", &event.key),
                                ("revision", &event.mod_revision.to_string()),
                            ],
                        );
                        self.dispatch(event, &shutdown);
                    }
                    None => break,
                },
            }
        }

        self.logger.info(Event::WatchFinish, &[("prefix", &self.prefix)]);
        Ok(())
    }

    /// Dispatch events fed by another component (the cluster state poller)
    /// until shutdown or until the sender side closes.
    pub async fn consume(&self, mut events: mpsc::Receiver<KeyValue>, shutdown: Shutdown) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                change = events.recv() => match change {
                    Some(event) => self.dispatch(event, &shutdown),
                    None => break,
                },
            }
        }
    }

    async fn boot(&self, shutdown: &Shutdown) {
        for key in self.handlers.keys() {
            match self.store.get(key).await {
                Ok(Some(event)) => {
                    self.logger.info(
                        Event::BootTriggerHandler,
                        &[("key", key), ("revision", &event.mod_revision.to_string())],
                    );
                    self.dispatch(event, shutdown);
                }
                Ok(None) => {
                    self.logger.info(Event::BootNoInitialValue, &[("key", key)]);
                }
                Err(err) => {
                    self.logger
                        .error(Event::BootError, &[("key", key), ("error", &error_chain(&err))]);
                }
            }
        }
    }

    fn dispatch(&self, event: KeyValue, shutdown: &Shutdown) {
        // Unmatched keys under the prefix are not ours
        if let Some(handler) = self.handlers.get(&event.key) {
            handler.dispatch(event, shutdown.clone());
        }
    }
}
