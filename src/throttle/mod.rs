//! Per-partition throttling: rate-limited lanes grouped by partition key.
//!
//! - [`RateLimiter`] serializes operations on one lane and spaces each start
//!   at least `wait` after the previous completion.
//! - [`PartitionPool`] gives every partition key `concurrency` such lanes and
//!   queues operations for a free one.
//! - [`partition_key`] derives the key (host name) from a URL.

mod error;
mod pool;
mod rate_limiter;

pub use error::ThrottleError;
pub use pool::{DEFAULT_CONCURRENCY, DEFAULT_WAIT, PartitionPool, partition_key};
pub use rate_limiter::RateLimiter;
