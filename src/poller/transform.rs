//! Value transforms applied to watched attributes before caching.

use std::sync::Arc;

use async_trait::async_trait;

use crate::crm::{ClusterManager, CrmResult};

/// Maps a raw attribute value to the value that gets cached and emitted
#[async_trait]
pub trait ValueTransform: Send + Sync {
    async fn apply(&self, value: &str) -> CrmResult<String>;
}

/// Leaves values untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

#[async_trait]
impl ValueTransform for Identity {
    async fn apply(&self, value: &str) -> CrmResult<String> {
        Ok(value.to_string())
    }
}

/// Resolves a node id to its routable address
pub struct ResolveAddress {
    crm: Arc<dyn ClusterManager>,
}

impl ResolveAddress {
    pub fn new(crm: Arc<dyn ClusterManager>) -> Self {
        Self { crm }
    }
}

#[async_trait]
impl ValueTransform for ResolveAddress {
    async fn apply(&self, value: &str) -> CrmResult<String> {
        self.crm.resolve_address(value).await
    }
}
