//! Error types for the throttling scheduler.

use thiserror::Error;

/// Errors raised by [`PartitionPool`](super::PartitionPool) itself.
///
/// Failures of the operations it runs are never wrapped here; they are
/// returned to the caller unchanged.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ThrottleError {
    /// Lanes per partition must be at least one.
    #[error("invalid concurrency value {value}: must be at least 1")]
    InvalidConcurrency {
        /// The rejected value.
        value: usize,
    },

    /// The lane semaphore was closed.
    #[error("partition pool closed unexpectedly")]
    PoolClosed,

    /// A permit was granted but the partition had no lane to hand out.
    #[error("no free lane available despite a granted permit")]
    NoFreeLane,
}
