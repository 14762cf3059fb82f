//! # Agent HTTP Server
//!
//! HTTP binding of the failover agent. Coordinators reach it through
//! [`crate::failover::HttpAgentClient`].

mod agent_routes;
mod config;
mod server;

pub use agent_routes::{agent_routes, status_for};
pub use config::HttpServerConfig;
pub use server::HttpServer;
