//! Handler that repoints the proxy at a new primary.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::errors::ProxyError;
use super::Proxy;
use crate::observability::{Event, Logger};
use crate::subscriber::{BoxError, Handler};

/// Regenerates proxy configuration for the new host, then reloads within
/// `timeout`
pub struct HostChanger {
    proxy: Arc<dyn Proxy>,
    timeout: Duration,
    logger: Logger,
}

impl HostChanger {
    pub fn new(proxy: Arc<dyn Proxy>, timeout: Duration, logger: Logger) -> Self {
        Self {
            proxy,
            timeout,
            logger,
        }
    }
}

#[async_trait]
impl Handler for HostChanger {
    async fn run(&self, key: &str, host: &str) -> Result<(), BoxError> {
        self.proxy.generate_config(host).await?;

        tokio::time::timeout(self.timeout, self.proxy.reload())
            .await
            .map_err(|_| ProxyError::Timeout {
                action: "reload",
                timeout: self.timeout,
            })??;

        self.logger
            .info(Event::ProxyHostChange, &[("host", host), ("key", key)]);
        Ok(())
    }
}
