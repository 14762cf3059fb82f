//! pgswitch - coordinated PostgreSQL primary failover behind connection proxies
//!
//! - [`crm`] reads replication roles from Pacemaker and moves the primary
//! - [`poller`] turns CRM state into a stream of key changes
//! - [`subscriber`] applies key changes to handlers exactly once per revision
//! - [`failover`] pauses every proxy, migrates the primary and resumes

pub mod cli;
pub mod crm;
pub mod failover;
pub mod http_server;
pub mod observability;
pub mod poller;
pub mod proxy;
pub mod shutdown;
pub mod store;
pub mod streams;
pub mod subscriber;
