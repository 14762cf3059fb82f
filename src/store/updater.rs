//! Mirror writer: copies handler values into a store key.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::errors::StoreError;
use super::CoordinationStore;
use crate::observability::{Event, Logger};
use crate::subscriber::{BoxError, Handler};

/// Writes every value it is handed to `key`, skipping identical values
pub struct StoreUpdater {
    store: Arc<dyn CoordinationStore>,
    key: String,
    timeout: Duration,
    logger: Logger,
}

impl StoreUpdater {
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        key: impl Into<String>,
        timeout: Duration,
        logger: Logger,
    ) -> Self {
        Self {
            store,
            key: key.into(),
            timeout,
            logger,
        }
    }
}

#[async_trait]
impl Handler for StoreUpdater {
    async fn run(&self, source: &str, value: &str) -> Result<(), BoxError> {
        let written = tokio::time::timeout(self.timeout, self.store.put_if_changed(&self.key, value))
            .await
            .map_err(|_| StoreError::Timeout(format!("put {}", self.key)))??;

        let event = if written {
            Event::StoreUpdate
        } else {
            Event::StoreUnchanged
        };
        self.logger.info(
            event,
            &[("key", &self.key), ("source", source), ("value", value)],
        );
        Ok(())
    }
}
