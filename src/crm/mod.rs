//! Cluster Resource Manager
//!
//! Reads role assignment out of the pacemaker CIB and drives migration
//! constraints. Pure queries, no state:
//!
//! - `get` resolves one element per selector, refusing non-quorate reads
//! - `resolve_address` maps a numeric node id to a routable address
//! - `migrate` / `unmigrate` apply and remove the failover constraint

mod document;
mod errors;
mod executor;
mod reader;
mod roles;
mod selector;

pub use document::{resolve, CrmNode};
pub use errors::{CrmError, CrmResult};
pub use executor::{command_line, CommandExecutor, SystemExecutor};
pub use reader::{validate_node_id, ClusterManager, Crm, DEFAULT_RESOURCE};
pub use roles::{ClusterRole, ASYNC_SELECTOR, PRIMARY_SELECTOR, SYNC_SELECTOR};
pub use selector::Selector;
