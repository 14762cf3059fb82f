//! Event Subscriber
//!
//! Mirrors coordination-store (or poller) changes into per-key handlers:
//!
//! - boot: every registered key is dispatched once with its current value
//! - watch: every change under the prefix is dispatched by exact key
//! - per key: one invocation at a time, never backwards in revision
//! - failures retry forever at a fixed interval; stale events are dropped

mod errors;
mod event_subscriber;
mod handler;

pub use errors::{BoxError, SubscriberError, SubscriberResult};
pub use event_subscriber::EventSubscriber;
pub use handler::{Handler, IdempotentHandler};
pub(crate) use handler::error_chain;
