//! # Proxy Errors

use std::time::Duration;

use thiserror::Error;

use crate::crm::CrmError;

/// Result type for proxy operations
pub type ProxyResult<T> = Result<T, ProxyError>;

/// Proxy errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProxyError {
    /// No command configured for the action
    #[error("no proxy command configured for {0}")]
    NotConfigured(&'static str),

    /// Proxy command failed
    #[error("proxy {action} failed")]
    Command {
        action: &'static str,
        #[source]
        source: CrmError,
    },

    /// Proxy command exceeded its deadline
    #[error("proxy {action} exceeded {timeout:?}")]
    Timeout {
        action: &'static str,
        timeout: Duration,
    },
}
