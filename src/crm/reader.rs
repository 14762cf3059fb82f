//! # State Reader
//!
//! Queries the cluster resource manager and applies migration constraints.
//! Callers bound every operation with their own deadline; the commands carry
//! no timeout of their own.

use std::sync::Arc;

use async_trait::async_trait;

use super::document::{self, CrmNode};
use super::errors::{CrmError, CrmResult};
use super::executor::{CommandExecutor, SystemExecutor};
use super::selector::Selector;

/// Resource migrated between nodes on failover
pub const DEFAULT_RESOURCE: &str = "msPostgresql";

/// Capability set consumed by the poller and the failover agent
#[async_trait]
pub trait ClusterManager: Send + Sync {
    /// One resolved node (or `None`) per selector, in input order.
    /// Fails with [`CrmError::NoQuorum`] if the CIB is not quorate.
    async fn get(&self, selectors: &[Selector]) -> CrmResult<Vec<Option<CrmNode>>>;

    /// Routable address of the node with the given numeric id
    async fn resolve_address(&self, node_id: &str) -> CrmResult<String>;

    /// Constrain the managed resource onto the named node
    async fn migrate(&self, to: &str) -> CrmResult<()>;

    /// Remove the constraint placed by [`ClusterManager::migrate`]
    async fn unmigrate(&self) -> CrmResult<()>;
}

/// Pacemaker-backed cluster resource manager
pub struct Crm {
    executor: Arc<dyn CommandExecutor>,
    resource: String,
}

impl Crm {
    /// CRM driving real subprocesses for the default resource
    pub fn new() -> Self {
        Self::with_executor(Arc::new(SystemExecutor), DEFAULT_RESOURCE)
    }

    /// CRM over the given executor and resource name
    pub fn with_executor(executor: Arc<dyn CommandExecutor>, resource: impl Into<String>) -> Self {
        Self {
            executor,
            resource: resource.into(),
        }
    }

    /// Name of the managed resource
    pub fn resource(&self) -> &str {
        &self.resource
    }
}

impl Default for Crm {
    fn default() -> Self {
        Self::new()
    }
}

/// Node ids are bare non-negative integers
pub fn validate_node_id(node_id: &str) -> CrmResult<()> {
    if node_id.is_empty() || !node_id.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CrmError::InvalidNodeId(node_id.to_string()));
    }
    Ok(())
}

#[async_trait]
impl ClusterManager for Crm {
    async fn get(&self, selectors: &[Selector]) -> CrmResult<Vec<Option<CrmNode>>> {
        let output = self
            .executor
            .combined_output("cibadmin", &["--query", "--local"])
            .await?;

        let xml = String::from_utf8(output).map_err(|e| CrmError::Parse(e.to_string()))?;
        document::resolve(&xml, selectors)
    }

    async fn resolve_address(&self, node_id: &str) -> CrmResult<String> {
        validate_node_id(node_id)?;

        let output = self
            .executor
            .combined_output("corosync-cfgtool", &["-a", node_id])
            .await
            .map_err(|e| e.context("failed to run corosync-cfgtool"))?;

        Ok(String::from_utf8_lossy(&output).trim().to_string())
    }

    async fn migrate(&self, to: &str) -> CrmResult<()> {
        self.executor
            .combined_output("crm", &["resource", "migrate", self.resource.as_str(), to])
            .await
            .map_err(|e| e.context("failed to execute crm migration"))?;
        Ok(())
    }

    async fn unmigrate(&self) -> CrmResult<()> {
        self.executor
            .combined_output("crm", &["resource", "unmigrate", self.resource.as_str()])
            .await
            .map_err(|e| e.context("failed to execute crm resource unmigrate"))?;
        Ok(())
    }
}
