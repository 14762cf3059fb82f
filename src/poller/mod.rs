//! Cluster State Poller
//!
//! Turns periodic CIB snapshots into change events:
//!
//! - one batched query per tick, bounded by `get_timeout`
//! - absent elements are skipped, a failed transform skips the whole tick
//! - cached values expire after `node_expiry` and are re-emitted

mod cluster_state;
mod errors;
mod transform;

pub use cluster_state::{ClusterStatePoller, PollerOptions, WatchedAttribute};
pub use errors::{PollError, PollResult};
pub use transform::{Identity, ResolveAddress, ValueTransform};
