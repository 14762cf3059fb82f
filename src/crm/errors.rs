//! # Cluster Resource Manager Errors

use thiserror::Error;

/// Result type for cluster resource manager operations
pub type CrmResult<T> = Result<T, CrmError>;

/// Cluster resource manager errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CrmError {
    /// The CIB does not report quorum; its contents must not be acted upon
    #[error("cluster resource manager reports no quorum, cannot get results")]
    NoQuorum,

    /// Node ids are bare non-negative integers
    #[error("invalid node id, must be a single integer: '{0}'")]
    InvalidNodeId(String),

    /// Selector could not be parsed
    #[error("invalid selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },

    /// CIB output was not a well-formed document
    #[error("failed to parse CIB document: {0}")]
    Parse(String),

    /// External command could not be spawned or exited unsuccessfully
    #[error("command '{command}' failed: {message}")]
    Command { command: String, message: String },

    /// Wrapped command failure with operation context
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<CrmError>,
    },
}

impl CrmError {
    /// Wrap this error with a description of the operation that failed
    pub fn context(self, context: impl Into<String>) -> Self {
        CrmError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Innermost error, skipping context wrappers
    pub fn root(&self) -> &CrmError {
        match self {
            CrmError::Context { source, .. } => source.root(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_wraps_message() {
        let err = CrmError::Command {
            command: "crm resource unmigrate msPostgresql".into(),
            message: "exit status 1".into(),
        }
        .context("failed to execute crm resource unmigrate");

        let msg = err.to_string();
        assert!(msg.starts_with("failed to execute crm resource unmigrate: "));
        assert!(msg.contains("exit status 1"));
    }

    #[test]
    fn test_root_skips_context() {
        let err = CrmError::NoQuorum.context("a").context("b");
        assert_eq!(err.root(), &CrmError::NoQuorum);
    }
}
