//! # Subscriber Errors

use thiserror::Error;

use crate::store::StoreError;

/// Boxed error returned by handlers
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for subscriber operations
pub type SubscriberResult<T> = Result<T, SubscriberError>;

/// Event subscriber errors
#[derive(Debug, Error)]
pub enum SubscriberError {
    /// Event is older than one already processed for the key. Expected, never
    /// retried.
    #[error("stale event for key '{key}': revision {revision} is older than {last_revision}")]
    StaleKey {
        key: String,
        revision: i64,
        last_revision: i64,
    },

    /// Handler returned an error, the event will be retried
    #[error("handler '{name}' failed for key '{key}'")]
    Handler {
        key: String,
        name: String,
        #[source]
        source: BoxError,
    },

    /// Store watch could not be opened
    #[error("failed to watch prefix '{prefix}'")]
    Watch {
        prefix: String,
        #[source]
        source: StoreError,
    },
}

impl SubscriberError {
    /// Whether this error signals an obsolete event rather than a failure
    pub fn is_stale(&self) -> bool {
        matches!(self, SubscriberError::StaleKey { .. })
    }
}
