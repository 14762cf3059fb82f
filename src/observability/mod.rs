//! Observability
//!
//! Structured JSON logging with explicit, typed events.
//!
//! # Usage
//!
//! ```ignore
//! use pgswitch::observability::{Event, Logger};
//!
//! let logger = Logger::new("poller");
//! logger.info(Event::PollStart, &[("xpaths", "//node")]);
//! ```

mod events;
mod logger;

pub use events::Event;
pub use logger::{LogCapture, Logger, Severity};
