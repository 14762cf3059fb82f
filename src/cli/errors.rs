//! CLI-specific error types
//!
//! Every CLI error ends the process with a non-zero status.

use thiserror::Error;

use crate::crm::CrmError;
use crate::failover::{AgentError, FailoverError};
use crate::subscriber::error_chain;

/// CLI error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Configuration file missing, malformed or invalid
    ConfigError,
    /// I/O error (stdout, listener)
    IoError,
    /// Agent could not be started
    BootFailed,
    /// A call to an agent or the CRM failed, or a failover did not complete
    RequestFailed,
}

impl CliErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "PGSWITCH_CLI_CONFIG_ERROR",
            Self::IoError => "PGSWITCH_CLI_IO_ERROR",
            Self::BootFailed => "PGSWITCH_CLI_BOOT_FAILED",
            Self::RequestFailed => "PGSWITCH_CLI_REQUEST_FAILED",
        }
    }
}

#[derive(Debug, Error)]
#[error("{}: {}", .code.code(), .message)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    pub fn boot_failed(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::BootFailed, msg)
    }

    pub fn request_failed(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::RequestFailed, msg)
    }

    pub fn code(&self) -> CliErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::io_error(format!("JSON error: {}", e))
    }
}

impl From<AgentError> for CliError {
    fn from(e: AgentError) -> Self {
        Self::request_failed(e.to_string())
    }
}

impl From<CrmError> for CliError {
    fn from(e: CrmError) -> Self {
        Self::request_failed(e.to_string())
    }
}

impl From<FailoverError> for CliError {
    fn from(e: FailoverError) -> Self {
        Self::request_failed(error_chain(&e))
    }
}

pub type CliResult<T> = Result<T, CliError>;
