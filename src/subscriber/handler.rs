//! Per-key handlers and their revision guard.
//!
//! An [`IdempotentHandler`] owns one registration: the handler, its name and
//! the last revision it attempted. Every dispatch for the key takes the same
//! async mutex, so at most one invocation is in flight and invocations never
//! go backwards in revision.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::errors::{BoxError, SubscriberError, SubscriberResult};
use crate::observability::{Event, Logger};
use crate::shutdown::Shutdown;
use crate::store::KeyValue;

/// Reacts to the value of a single key
#[async_trait]
pub trait Handler: Send + Sync {
    async fn run(&self, key: &str, value: &str) -> Result<(), BoxError>;
}

/// A handler registration guarded by its last attempted revision
pub struct IdempotentHandler {
    name: String,
    handler: Arc<dyn Handler>,
    last_revision: Mutex<i64>,
    retry_interval: Duration,
    logger: Logger,
}

impl IdempotentHandler {
    pub fn new(
        name: impl Into<String>,
        handler: Arc<dyn Handler>,
        retry_interval: Duration,
        logger: Logger,
    ) -> Self {
        Self {
            name: name.into(),
            handler,
            last_revision: Mutex::new(0),
            retry_interval,
            logger,
        }
    }

    /// Name supplied at registration
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the handler once for `event`, unless it is stale.
    ///
    /// The revision is recorded whether or not the handler succeeds: once
    /// revision R has been attempted, any event below R is stale. A retry of
    /// R itself is still accepted.
    pub async fn handle(&self, event: &KeyValue) -> SubscriberResult<()> {
        let mut last_revision = self.last_revision.lock().await;

        if event.mod_revision < *last_revision {
            return Err(SubscriberError::StaleKey {
                key: event.key.clone(),
                revision: event.mod_revision,
                last_revision: *last_revision,
            });
        }

        *last_revision = event.mod_revision - 1;
        let result = self.handler.run(&event.key, &event.value).await;
        *last_revision = event.mod_revision;

        result.map_err(|source| SubscriberError::Handler {
            key: event.key.clone(),
            name: self.name.clone(),
            source,
        })
    }

    /// Handle `event` on a background task, retrying failures every
    /// `retry_interval` until success, staleness or shutdown.
    pub fn dispatch(self: &Arc<Self>, event: KeyValue, shutdown: Shutdown) {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.handle_until_done(event, shutdown).await });
    }

    async fn handle_until_done(&self, event: KeyValue, shutdown: Shutdown) {
        let revision = event.mod_revision.to_string();

        loop {
            match self.handle(&event).await {
                Ok(()) => {
                    self.logger.info(
                        Event::HandlerSuccess,
                        &[
                            ("handler", &self.name),
                            ("key", &event.key),
                            ("revision", &revision),
                        ],
                    );
                    return;
                }
                Err(err) if err.is_stale() => {
                    self.logger.info(
                        Event::HandlerStaleKey,
                        &[
                            ("handler", &self.name),
                            ("key", &event.key),
                            ("revision", &revision),
                            ("error", &err.to_string()),
                        ],
                    );
                    return;
                }
                Err(err) => {
                    self.logger.error(
                        Event::HandlerError,
                        &[
                            ("handler", &self.name),
                            ("key", &event.key),
                            ("revision", &revision),
                            ("error", &error_chain(&err)),
                        ],
                    );
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = tokio::time::sleep(self.retry_interval) => {}
            }

            self.logger.info(
                Event::HandlerRetry,
                &[
                    ("handler", &self.name),
                    ("key", &event.key),
                    ("revision", &revision),
                ],
            );
        }
    }
}

/// Render an error and its sources on one line
pub(crate) fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
