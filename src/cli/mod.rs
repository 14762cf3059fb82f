//! CLI module for pgswitch
//!
//! Provides command-line interface for:
//! - agent: serve the failover agent over HTTP
//! - supervise-cluster: mirror the primary address into the store
//! - supervise-proxy: keep the local proxy routed to the primary
//! - failover: run one coordinated failover
//! - roles: one-shot replication role query
//! - health/pause/resume/migrate/unmigrate: one-shot agent calls

mod args;
mod commands;
mod config;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{
    agent, failover, follow_primary, mirror_primary, roles, run, run_command, run_failover,
    supervise_cluster, supervise_proxy,
};
pub use config::{Config, CrmConfig, FailoverConfig, LogConfig, ProxyConfig, StoreConfig};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::write_response;
