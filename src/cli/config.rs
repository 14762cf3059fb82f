//! Configuration file
//!
//! One JSON document with a section per component. Every field has a
//! default, so `{}` is a valid configuration.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::errors::{CliError, CliResult};
use crate::crm::DEFAULT_RESOURCE;
use crate::failover::FailoverOptions;
use crate::http_server::HttpServerConfig;
use crate::observability::Severity;
use crate::poller::PollerOptions;
use crate::proxy::ProxyCommands;
use crate::streams::KeyStreamOptions;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub agent: HttpServerConfig,
    #[serde(default)]
    pub crm: CrmConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub failover: FailoverConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrmConfig {
    /// Pacemaker resource moved on failover
    #[serde(default = "default_resource")]
    pub resource: String,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Must be shorter than the poll interval
    #[serde(default = "default_get_timeout_ms")]
    pub get_timeout_ms: u64,

    /// Cached node values are forgotten after this long
    #[serde(default = "default_node_expiry_secs")]
    pub node_expiry_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// etcd JSON gateway base URL
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Key holding the primary address. Also names the failover lock.
    #[serde(default = "default_primary_key")]
    pub primary_key: String,

    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,

    /// Delay between handler retries
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,

    /// Periodic re-read of the primary key behind the proxy supervisor's watch
    #[serde(default = "default_store_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailoverConfig {
    /// Agent `host:port` list. The first one is asked to migrate.
    #[serde(default)]
    pub endpoints: Vec<String>,

    #[serde(default = "default_health_check_timeout_ms")]
    pub health_check_timeout_ms: u64,

    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    #[serde(default = "default_pause_timeout_ms")]
    pub pause_timeout_ms: u64,

    #[serde(default = "default_pause_expiry_ms")]
    pub pause_expiry_ms: u64,

    #[serde(default = "default_resume_timeout_ms")]
    pub resume_timeout_ms: u64,

    #[serde(default = "default_pacemaker_timeout_ms")]
    pub pacemaker_timeout_ms: u64,

    #[serde(default = "default_lock_lease_secs")]
    pub lock_lease_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(flatten)]
    pub commands: ProxyCommands,

    #[serde(default = "default_proxy_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// trace, info, warn, error or fatal
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_resource() -> String {
    DEFAULT_RESOURCE.to_string()
}
fn default_poll_interval_ms() -> u64 {
    500
}
fn default_get_timeout_ms() -> u64 {
    250
}
fn default_node_expiry_secs() -> u64 {
    30
}
fn default_endpoint() -> String {
    "http://127.0.0.1:2379".to_string()
}
fn default_primary_key() -> String {
    "/master".to_string()
}
fn default_operation_timeout_ms() -> u64 {
    3000
}
fn default_retry_interval_ms() -> u64 {
    1000
}
fn default_store_poll_interval_ms() -> u64 {
    60000
}
fn default_health_check_timeout_ms() -> u64 {
    2000
}
fn default_lock_timeout_ms() -> u64 {
    5000
}
fn default_pause_timeout_ms() -> u64 {
    5000
}
fn default_pause_expiry_ms() -> u64 {
    25000
}
fn default_resume_timeout_ms() -> u64 {
    5000
}
fn default_pacemaker_timeout_ms() -> u64 {
    20000
}
fn default_lock_lease_secs() -> u64 {
    60
}
fn default_proxy_timeout_ms() -> u64 {
    5000
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for CrmConfig {
    fn default() -> Self {
        Self {
            resource: default_resource(),
            poll_interval_ms: default_poll_interval_ms(),
            get_timeout_ms: default_get_timeout_ms(),
            node_expiry_secs: default_node_expiry_secs(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            primary_key: default_primary_key(),
            operation_timeout_ms: default_operation_timeout_ms(),
            retry_interval_ms: default_retry_interval_ms(),
            poll_interval_ms: default_store_poll_interval_ms(),
        }
    }
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            health_check_timeout_ms: default_health_check_timeout_ms(),
            lock_timeout_ms: default_lock_timeout_ms(),
            pause_timeout_ms: default_pause_timeout_ms(),
            pause_expiry_ms: default_pause_expiry_ms(),
            resume_timeout_ms: default_resume_timeout_ms(),
            pacemaker_timeout_ms: default_pacemaker_timeout_ms(),
            lock_lease_secs: default_lock_lease_secs(),
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            commands: ProxyCommands::default(),
            timeout_ms: default_proxy_timeout_ms(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load and validate configuration from file
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| CliError::config_error(format!("Failed to read config: {}", e)))?;

        let config: Config = serde_json::from_str(&content)
            .map_err(|e| CliError::config_error(format!("Invalid config JSON: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> CliResult<()> {
        let intervals = [
            ("crm.poll_interval_ms", self.crm.poll_interval_ms),
            ("crm.get_timeout_ms", self.crm.get_timeout_ms),
            ("crm.node_expiry_secs", self.crm.node_expiry_secs),
            ("store.operation_timeout_ms", self.store.operation_timeout_ms),
            ("store.retry_interval_ms", self.store.retry_interval_ms),
            ("store.poll_interval_ms", self.store.poll_interval_ms),
            ("failover.health_check_timeout_ms", self.failover.health_check_timeout_ms),
            ("failover.lock_timeout_ms", self.failover.lock_timeout_ms),
            ("failover.pause_timeout_ms", self.failover.pause_timeout_ms),
            ("failover.pause_expiry_ms", self.failover.pause_expiry_ms),
            ("failover.resume_timeout_ms", self.failover.resume_timeout_ms),
            ("failover.pacemaker_timeout_ms", self.failover.pacemaker_timeout_ms),
            ("failover.lock_lease_secs", self.failover.lock_lease_secs),
            ("proxy.timeout_ms", self.proxy.timeout_ms),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, value)| *value == 0) {
            return Err(CliError::config_error(format!("{} must be > 0", name)));
        }

        if self.crm.get_timeout_ms >= self.crm.poll_interval_ms {
            return Err(CliError::config_error(format!(
                "crm.get_timeout_ms ({}) must be shorter than crm.poll_interval_ms ({})",
                self.crm.get_timeout_ms, self.crm.poll_interval_ms
            )));
        }

        if self.store.primary_key.is_empty() {
            return Err(CliError::config_error("store.primary_key must not be empty"));
        }

        if !self.store.endpoint.starts_with("http://") && !self.store.endpoint.starts_with("https://") {
            return Err(CliError::config_error(format!(
                "store.endpoint must be an http(s) URL, got '{}'",
                self.store.endpoint
            )));
        }

        self.log_level()?;

        Ok(())
    }

    pub fn log_level(&self) -> CliResult<Severity> {
        self.log.level.parse().map_err(CliError::config_error)
    }

    pub fn poller_options(&self) -> PollerOptions {
        PollerOptions {
            poll_interval: Duration::from_millis(self.crm.poll_interval_ms),
            get_timeout: Duration::from_millis(self.crm.get_timeout_ms),
            node_expiry: Duration::from_secs(self.crm.node_expiry_secs),
        }
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store.operation_timeout_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.store.retry_interval_ms)
    }

    pub fn proxy_timeout(&self) -> Duration {
        Duration::from_millis(self.proxy.timeout_ms)
    }

    pub fn lock_lease(&self) -> Duration {
        Duration::from_secs(self.failover.lock_lease_secs)
    }

    /// Follows the primary key for the proxy supervisor
    pub fn key_stream_options(&self) -> KeyStreamOptions {
        KeyStreamOptions {
            keys: vec![self.store.primary_key.clone()],
            poll_interval: Duration::from_millis(self.store.poll_interval_ms),
            get_timeout: self.store_timeout(),
        }
    }

    pub fn failover_options(&self) -> FailoverOptions {
        FailoverOptions {
            primary_key: self.store.primary_key.clone(),
            health_check_timeout: Duration::from_millis(self.failover.health_check_timeout_ms),
            lock_timeout: Duration::from_millis(self.failover.lock_timeout_ms),
            pause_timeout: Duration::from_millis(self.failover.pause_timeout_ms),
            pause_expiry: Duration::from_millis(self.failover.pause_expiry_ms),
            resume_timeout: Duration::from_millis(self.failover.resume_timeout_ms),
            pacemaker_timeout: Duration::from_millis(self.failover.pacemaker_timeout_ms),
            ..FailoverOptions::default()
        }
    }
}
