//! # Failover Errors
//!
//! Agent errors cross the wire, so they are a plain code + message pair.
//! Coordinator errors name the phase that failed and keep the agent error
//! that caused it as their source.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::StoreError;

/// Result type for agent operations
pub type AgentResult<T> = Result<T, AgentError>;

/// Result type for a failover run
pub type FailoverResult<T> = Result<T, FailoverError>;

/// Wire-level classification of agent failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentErrorCode {
    /// Operation exceeded its deadline
    DeadlineExceeded,
    /// Target missing (no sync node, unresolvable address)
    NotFound,
    /// Wrapped external command failure
    Unknown,
    /// Agent could not be reached
    Unavailable,
}

impl AgentErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentErrorCode::DeadlineExceeded => "DEADLINE_EXCEEDED",
            AgentErrorCode::NotFound => "NOT_FOUND",
            AgentErrorCode::Unknown => "UNKNOWN",
            AgentErrorCode::Unavailable => "UNAVAILABLE",
        }
    }
}

impl fmt::Display for AgentErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned by a failover agent
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct AgentError {
    pub code: AgentErrorCode,
    pub message: String,
}

impl AgentError {
    pub fn new(code: AgentErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn deadline_exceeded(message: impl Into<String>) -> Self {
        Self::new(AgentErrorCode::DeadlineExceeded, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(AgentErrorCode::NotFound, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(AgentErrorCode::Unknown, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(AgentErrorCode::Unavailable, message)
    }
}

/// Aggregate failure of an operation fanned out to every agent. Reports the
/// count only; per-agent detail is logged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{failed} of {total} agents failed to {operation}")]
pub struct BatchError {
    pub operation: &'static str,
    pub failed: usize,
    pub total: usize,
    /// First failure observed, kept for classification
    #[source]
    pub first: AgentError,
}

/// Failover run errors, one variant per phase
#[derive(Debug, Error)]
pub enum FailoverError {
    #[error("no failover agents configured")]
    NoAgents,

    #[error("health check failed")]
    HealthCheck(#[source] BatchError),

    #[error("failed to acquire failover lock")]
    Lock(#[source] StoreError),

    #[error("failed to pause proxies")]
    Pause(#[source] BatchError),

    #[error("failed to migrate via {endpoint}")]
    Migrate {
        endpoint: String,
        #[source]
        source: AgentError,
    },

    #[error("timed out after {timeout:?} waiting for {target} ({address}) to become primary")]
    PrimaryNotObserved {
        target: String,
        address: String,
        timeout: Duration,
    },

    #[error("failover cancelled by shutdown")]
    Cancelled,

    #[error("failover task aborted: {0}")]
    Aborted(String),
}

impl FailoverError {
    /// Agent error code behind this failure, if an agent caused it
    pub fn agent_code(&self) -> Option<AgentErrorCode> {
        match self {
            FailoverError::HealthCheck(batch) | FailoverError::Pause(batch) => Some(batch.first.code),
            FailoverError::Migrate { source, .. } => Some(source.code),
            _ => None,
        }
    }
}
