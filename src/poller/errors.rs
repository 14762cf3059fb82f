//! # Poller Errors

use std::time::Duration;

use thiserror::Error;

use crate::crm::CrmError;

/// Result type for a single poll
pub type PollResult<T> = Result<T, PollError>;

/// Reasons a poll tick was skipped
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PollError {
    /// CIB query failed
    #[error("failed to query cluster state")]
    Query(#[source] CrmError),

    /// Transform of a watched value failed
    #[error("failed to transform value '{value}' of '{alias}'")]
    Transform {
        alias: String,
        value: String,
        #[source]
        source: CrmError,
    },

    /// Query and transforms did not finish within the bound
    #[error("cluster state poll exceeded {0:?}")]
    Timeout(Duration),
}
