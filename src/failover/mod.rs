//! # Failover
//!
//! Coordinated primary switchover across every proxy in the cluster.
//!
//! - [`FailoverAgent`] runs next to each proxy and exposes five operations
//! - [`AgentClient`] is how a caller reaches an agent, in process or over HTTP
//! - [`FailoverCoordinator`] drives the agents through one failover
//!
//! A coordinator run pauses every proxy before the primary moves, so no
//! client can write to the old primary once the new one is promoted.

mod agent;
mod client;
mod coordinator;
mod errors;
mod lock;
mod types;

pub use agent::FailoverAgent;
pub use client::{AgentClient, HttpAgentClient};
pub use coordinator::{batch, FailoverCoordinator, FailoverOptions, Peer};
pub use errors::{
    AgentError, AgentErrorCode, AgentResult, BatchError, FailoverError, FailoverResult,
};
pub use lock::{Locker, StoreLocker};
pub use types::{
    timestamp, HealthCheckResponse, HealthStatus, MigrateResponse, PauseRequest, PauseResponse,
    ResumeResponse, UnmigrateResponse,
};
