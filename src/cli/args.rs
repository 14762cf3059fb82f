//! CLI argument definitions using clap
//!
//! Commands:
//! - pgswitch agent --config <path>
//! - pgswitch supervise-cluster --config <path>
//! - pgswitch supervise-proxy --config <path>
//! - pgswitch failover --config <path>
//! - pgswitch roles --config <path>
//! - pgswitch health|resume|migrate|unmigrate --endpoint <host:port>
//! - pgswitch pause --endpoint <host:port> [--timeout <secs>] [--expiry <secs>]

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// pgswitch - coordinated PostgreSQL primary failover behind connection proxies
#[derive(Parser, Debug)]
#[command(name = "pgswitch")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the failover agent for this node
    Agent {
        /// Path to configuration file
        #[arg(long, default_value = "./pgswitch.json")]
        config: PathBuf,
    },

    /// Mirror the primary's address from the CRM into the store
    SuperviseCluster {
        /// Path to configuration file
        #[arg(long, default_value = "./pgswitch.json")]
        config: PathBuf,
    },

    /// Keep the local proxy pointed at the primary address in the store
    SuperviseProxy {
        /// Path to configuration file
        #[arg(long, default_value = "./pgswitch.json")]
        config: PathBuf,
    },

    /// Run one zero-downtime failover across every configured agent
    Failover {
        /// Path to configuration file
        #[arg(long, default_value = "./pgswitch.json")]
        config: PathBuf,
    },

    /// Print the node holding each replication role
    Roles {
        /// Path to configuration file
        #[arg(long, default_value = "./pgswitch.json")]
        config: PathBuf,
    },

    /// Ask an agent whether it is alive
    Health {
        /// Agent address as host:port
        #[arg(long)]
        endpoint: String,
    },

    /// Pause the proxy behind an agent
    Pause {
        /// Agent address as host:port
        #[arg(long)]
        endpoint: String,

        /// Seconds the agent may spend pausing
        #[arg(long, default_value_t = 5)]
        timeout: u64,

        /// Seconds until the proxy resumes on its own (0 = never)
        #[arg(long, default_value_t = 25)]
        expiry: u64,
    },

    /// Resume the proxy behind an agent
    Resume {
        /// Agent address as host:port
        #[arg(long)]
        endpoint: String,
    },

    /// Move the primary onto the synchronous standby
    Migrate {
        /// Agent address as host:port
        #[arg(long)]
        endpoint: String,
    },

    /// Remove the constraint left by migrate
    Unmigrate {
        /// Agent address as host:port
        #[arg(long)]
        endpoint: String,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
