//! Connection proxy capability
//!
//! The agent pauses and resumes the local proxy around a failover; the
//! host changer keeps it pointed at the primary.

mod errors;
mod host_changer;
mod scripted;

use async_trait::async_trait;

pub use errors::{ProxyError, ProxyResult};
pub use host_changer::HostChanger;
pub use scripted::{ProxyCommands, ScriptedProxy, HOST_PLACEHOLDER};

/// Operations consumed from the local connection proxy
#[async_trait]
pub trait Proxy: Send + Sync {
    /// Buffer new queries once in-flight ones drain
    async fn pause(&self) -> ProxyResult<()>;

    /// Release buffered queries. Safe to call when not paused.
    async fn resume(&self) -> ProxyResult<()>;

    /// Rewrite proxy configuration to route to `host`
    async fn generate_config(&self, host: &str) -> ProxyResult<()>;

    /// Apply the current configuration
    async fn reload(&self) -> ProxyResult<()>;
}
