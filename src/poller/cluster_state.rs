//! # Cluster State Poller
//!
//! Polls the CRM on a fixed interval and emits `(alias, value)` whenever a
//! watched attribute changes. Cached values expire after `node_expiry`, so an
//! unchanged value is re-emitted periodically and a mirror that lost it gets
//! it back.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use super::errors::{PollError, PollResult};
use super::transform::{Identity, ValueTransform};
use crate::crm::{ClusterManager, Selector};
use crate::observability::{Event, Logger};
use crate::shutdown::Shutdown;
use crate::store::KeyValue;
use crate::streams::CHANNEL_CAPACITY;
use crate::subscriber::error_chain;

#[derive(Debug, Clone, PartialEq)]
struct CachedValue {
    value: String,
    seen_at: Instant,
}

/// One CIB attribute followed by the poller
#[derive(Debug, Clone)]
pub struct WatchedAttribute {
    alias: String,
    selector: Selector,
    attribute: String,
    cached: Option<CachedValue>,
}

impl WatchedAttribute {
    /// Follow `attribute` of the element matched by `selector`, emitting
    /// changes under `alias`
    pub fn new(alias: impl Into<String>, selector: Selector, attribute: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            selector,
            attribute: attribute.into(),
            cached: None,
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Last emitted value, if still cached
    pub fn cached_value(&self) -> Option<&str> {
        self.cached.as_ref().map(|c| c.value.as_str())
    }
}

/// Timing for the poll loop
#[derive(Debug, Clone, Copy)]
pub struct PollerOptions {
    pub poll_interval: Duration,
    /// Bounds the query and every transform of one tick. Keep it shorter
    /// than `poll_interval`.
    pub get_timeout: Duration,
    pub node_expiry: Duration,
}

impl Default for PollerOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            get_timeout: Duration::from_millis(250),
            node_expiry: Duration::from_secs(30),
        }
    }
}

pub struct ClusterStatePoller {
    crm: Arc<dyn ClusterManager>,
    attributes: Vec<WatchedAttribute>,
    transform: Arc<dyn ValueTransform>,
    options: PollerOptions,
    revision: i64,
    logger: Logger,
}

impl ClusterStatePoller {
    pub fn new(crm: Arc<dyn ClusterManager>, options: PollerOptions, logger: Logger) -> Self {
        Self {
            crm,
            attributes: Vec::new(),
            transform: Arc::new(Identity),
            options,
            revision: 0,
            logger,
        }
    }

    /// Add an attribute to follow
    pub fn watch(mut self, attribute: WatchedAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Replace the identity transform
    pub fn with_transform(mut self, transform: Arc<dyn ValueTransform>) -> Self {
        self.transform = transform;
        self
    }

    pub fn attributes(&self) -> &[WatchedAttribute] {
        &self.attributes
    }

    /// Run the poll loop on its own task. The returned channel closes on
    /// shutdown.
    pub fn start(self, shutdown: Shutdown) -> mpsc::Receiver<KeyValue> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        tokio::spawn(self.run(tx, shutdown));
        rx
    }

    async fn run(mut self, tx: mpsc::Sender<KeyValue>, shutdown: Shutdown) {
        let mut ticker = tokio::time::interval(self.options.poll_interval);
        // Skip the immediate first tick, the first poll happens one interval in
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let changes = match self.poll().await {
                        Ok(changes) => changes,
                        Err(err) => {
                            self.logger.warn(Event::PollError, &[("error", &error_chain(&err))]);
                            continue;
                        }
                    };

                    for change in changes {
                        if tx.send(change).await.is_err() {
                            return;
                        }
                    }
                }
            }
        }

        self.logger.info(Event::PollStop, &[]);
    }

    /// One tick: expire stale cache entries, query, transform and return the
    /// changed attributes. Nothing is cached or returned if any step fails.
    pub async fn poll(&mut self) -> PollResult<Vec<KeyValue>> {
        self.expire_cache();
        self.logger.trace(Event::PollStart, &[]);

        let timeout = self.options.get_timeout;
        let values = tokio::time::timeout(timeout, self.resolve_values())
            .await
            .map_err(|_| PollError::Timeout(timeout))??;

        let now = Instant::now();
        let mut changes = Vec::new();

        for (attribute, value) in self.attributes.iter_mut().zip(values) {
            let Some(value) = value else { continue };

            if attribute.cached_value() == Some(value.as_str()) {
                continue;
            }

            self.logger.info(
                Event::NodeChange,
                &[
                    ("alias", &attribute.alias),
                    ("attribute", &attribute.attribute),
                    ("selector", attribute.selector.as_str()),
                    ("value", &value),
                ],
            );

            attribute.cached = Some(CachedValue {
                value: value.clone(),
                seen_at: now,
            });
            self.revision += 1;
            changes.push(KeyValue::new(attribute.alias.clone(), value, self.revision));
        }

        Ok(changes)
    }

    /// Transformed value per attribute, `None` where the element is absent
    async fn resolve_values(&self) -> PollResult<Vec<Option<String>>> {
        let selectors: Vec<Selector> = self
            .attributes
            .iter()
            .map(|a| a.selector.clone())
            .collect();

        let nodes = self.crm.get(&selectors).await.map_err(PollError::Query)?;

        let mut values = Vec::with_capacity(self.attributes.len());
        for (attribute, node) in self.attributes.iter().zip(nodes) {
            let Some(node) = node else {
                self.logger.trace(
                    Event::NodeMissing,
                    &[("alias", &attribute.alias), ("selector", attribute.selector.as_str())],
                );
                values.push(None);
                continue;
            };

            let raw = node.attribute(&attribute.attribute);
            let value = self
                .transform
                .apply(raw)
                .await
                .map_err(|source| PollError::Transform {
                    alias: attribute.alias.clone(),
                    value: raw.to_string(),
                    source,
                })?;
            values.push(Some(value));
        }

        Ok(values)
    }

    fn expire_cache(&mut self) {
        let expiry = self.options.node_expiry;

        for attribute in &mut self.attributes {
            let expired = attribute
                .cached
                .as_ref()
                .map(|c| c.seen_at.elapsed() > expiry)
                .unwrap_or(false);

            if expired {
                self.logger
                    .info(Event::CacheExpire, &[("alias", &attribute.alias)]);
                attribute.cached = None;
            }
        }
    }
}
