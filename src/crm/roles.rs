//! Replication roles and their default CIB selectors.

use std::fmt;

use super::errors::CrmResult;
use super::selector::Selector;

/// Selector for the current primary
pub const PRIMARY_SELECTOR: &str = "//node/instance_attributes/nvpair[@value='LATEST']/../..";
/// Selector for the synchronous standby
pub const SYNC_SELECTOR: &str = "//node/instance_attributes/nvpair[@value='STREAMING|SYNC']/../..";
/// Selector for the asynchronous standby
pub const ASYNC_SELECTOR: &str =
    "//node/instance_attributes/nvpair[@value='STREAMING|POTENTIAL']/../..";

/// Replication role held by a cluster member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClusterRole {
    Primary,
    SyncStandby,
    AsyncStandby,
}

impl ClusterRole {
    /// All roles, primary first
    pub const ALL: [ClusterRole; 3] = [
        ClusterRole::Primary,
        ClusterRole::SyncStandby,
        ClusterRole::AsyncStandby,
    ];

    /// Stable role name
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterRole::Primary => "primary",
            ClusterRole::SyncStandby => "sync",
            ClusterRole::AsyncStandby => "async",
        }
    }

    /// Default selector expression for this role
    pub fn selector_source(&self) -> &'static str {
        match self {
            ClusterRole::Primary => PRIMARY_SELECTOR,
            ClusterRole::SyncStandby => SYNC_SELECTOR,
            ClusterRole::AsyncStandby => ASYNC_SELECTOR,
        }
    }

    /// Parsed default selector for this role
    pub fn selector(&self) -> CrmResult<Selector> {
        Selector::parse(self.selector_source())
    }
}

impl fmt::Display for ClusterRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
