//! # Coordination Store Errors

use thiserror::Error;

/// Result type for coordination store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Coordination store errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Store could not serve the request
    #[error("coordination store unavailable: {0}")]
    Unavailable(String),

    /// Unlock attempted by a session that does not hold the lock
    #[error("lock '{0}' is not held by this session")]
    NotLockHolder(String),

    /// Operation exceeded its deadline
    #[error("coordination store operation timed out: {0}")]
    Timeout(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            StoreError::NotLockHolder("/master".into()).to_string(),
            "lock '/master' is not held by this session"
        );
        assert!(StoreError::Timeout("put /master".into())
            .to_string()
            .contains("put /master"));
    }
}
