//! Streams
//!
//! Channel plumbing between store reads and consumers:
//!
//! - `key_stream` follows the current value of a few keys
//! - `dedupe_filter` drops repeated values per key
//! - `revision_filter` drops out-of-order revisions per key

mod filter;
mod key_stream;

pub use filter::{dedupe_filter, revision_filter};
pub use key_stream::{key_stream, KeyStreamOptions};

/// Buffer between a stream task and its consumer
pub const CHANNEL_CAPACITY: usize = 16;
