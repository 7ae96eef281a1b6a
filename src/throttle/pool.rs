//! Bounded, per-partition parallelism built from rate-limited lanes.
//!
//! A [`PartitionPool`] keeps, for every partition key it has seen, a fixed set
//! of `concurrency` lanes. Each lane owns its own [`RateLimiter`]. An operation
//! submitted for a key waits for any free lane of that key, runs through the
//! lane's limiter, and hands the lane back when it finishes.
//!
//! Net behaviour for one key: at most `concurrency` operations in flight, and
//! each lane spaces its own completions and starts by at least `wait`.
//! Different keys never block each other.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use sitewatch_core::throttle::{PartitionPool, partition_key};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = PartitionPool::new(2, Duration::from_secs(1))?;
//! let key = partition_key("https://example.com/news");
//! let answer = pool.execute(&key, || async { 42 }).await?;
//! assert_eq!(answer, 42);
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio::time::Instant;
use tracing::{debug, instrument, trace};

use super::error::ThrottleError;
use super::rate_limiter::RateLimiter;

/// Default number of lanes per partition.
pub const DEFAULT_CONCURRENCY: usize = 2;

/// Default minimum spacing per lane.
pub const DEFAULT_WAIT: Duration = Duration::from_secs(1);

/// Partition key used when a URL has no parseable host.
const UNKNOWN_PARTITION: &str = "unknown";

/// One execution slot of a partition.
#[derive(Debug)]
struct Lane {
    index: usize,
    limiter: RateLimiter,
}

/// Lanes and bookkeeping for one partition key.
#[derive(Debug)]
struct Partition {
    /// One permit per lane; a permit guarantees a lane is in `free_lanes`.
    permits: Semaphore,
    /// Longest-idle lane at the front.
    free_lanes: Mutex<VecDeque<Lane>>,
    last_used: Mutex<Instant>,
}

impl Partition {
    fn new(concurrency: usize, wait: Duration) -> Self {
        let lanes = (0..concurrency)
            .map(|index| Lane {
                index,
                limiter: RateLimiter::new(wait),
            })
            .collect();
        Self {
            permits: Semaphore::new(concurrency),
            free_lanes: Mutex::new(lanes),
            last_used: Mutex::new(Instant::now()),
        }
    }

    fn touch(&self) {
        *self
            .last_used
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_used
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }

    async fn lease(&self) -> Result<LaneLease<'_>, ThrottleError> {
        let permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ThrottleError::PoolClosed)?;
        let lane = self
            .free_lanes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .ok_or(ThrottleError::NoFreeLane)?;
        self.touch();
        Ok(LaneLease {
            partition: self,
            lane: Some(lane),
            _permit: permit,
        })
    }
}

/// A lane taken out of its partition.
///
/// Dropping the lease puts the lane back before the permit is released, on
/// every exit path (return, error, panic, cancellation).
struct LaneLease<'a> {
    partition: &'a Partition,
    lane: Option<Lane>,
    _permit: SemaphorePermit<'a>,
}

impl LaneLease<'_> {
    fn lane(&self) -> Option<&Lane> {
        self.lane.as_ref()
    }
}

impl Drop for LaneLease<'_> {
    fn drop(&mut self) {
        if let Some(lane) = self.lane.take() {
            trace!(lane = lane.index, "returning lane");
            self.partition
                .free_lanes
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push_back(lane);
        }
        self.partition.touch();
    }
}

/// Per-partition pool of rate-limited lanes.
///
/// Designed to be wrapped in `Arc` and shared across Tokio tasks. The
/// partition map uses `DashMap`; the `Arc<Partition>` is cloned out before any
/// await so no shard lock is held while an operation runs.
#[derive(Debug)]
pub struct PartitionPool {
    concurrency: usize,
    wait: Duration,
    partitions: DashMap<String, Arc<Partition>>,
}

impl PartitionPool {
    /// Creates an empty pool. Partitions are created lazily on first use.
    ///
    /// # Errors
    ///
    /// Returns [`ThrottleError::InvalidConcurrency`] when `concurrency` is zero.
    #[instrument(level = "debug", fields(wait_ms = wait.as_millis()))]
    pub fn new(concurrency: usize, wait: Duration) -> Result<Self, ThrottleError> {
        if concurrency == 0 {
            return Err(ThrottleError::InvalidConcurrency { value: concurrency });
        }
        debug!("creating partition pool");
        Ok(Self {
            concurrency,
            wait,
            partitions: DashMap::new(),
        })
    }

    /// Returns the number of lanes per partition.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Returns the minimum spacing per lane.
    #[must_use]
    pub fn wait(&self) -> Duration {
        self.wait
    }

    /// Returns how many partitions currently exist.
    #[must_use]
    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Runs `op` on a free lane of partition `key`.
    ///
    /// Suspends while all lanes of `key` are busy, then while the chosen
    /// lane's spacing has not elapsed. The lane is returned to the partition
    /// however `op` ends.
    ///
    /// # Errors
    ///
    /// Only internal pool failures are reported here; the operation's own
    /// outcome is returned inside `Ok`.
    #[instrument(level = "debug", skip(self, key, op), fields(partition = %key))]
    pub async fn execute<F, Fut, T>(&self, key: &str, op: F) -> Result<T, ThrottleError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let partition = self.partition(key);
        let lease = partition.lease().await?;
        let lane = lease.lane().ok_or(ThrottleError::NoFreeLane)?;
        debug!(lane = lane.index, "lane acquired");

        let output = lane.limiter.call(op).await;
        drop(lease);
        Ok(output)
    }

    /// Drops partitions that have been idle for at least `idle_for`.
    ///
    /// A partition is only dropped when nothing is running or queued on it,
    /// and never sooner than `wait` after its last use, so a later operation
    /// on fresh lanes still respects the spacing of the evicted ones.
    /// Returns the number of partitions removed.
    #[instrument(level = "debug", skip(self), fields(idle_ms = idle_for.as_millis()))]
    pub fn evict_idle(&self, idle_for: Duration) -> usize {
        let threshold = idle_for.max(self.wait);
        let mut evicted = 0;
        // Holding the shard write lock: no task can clone the Arc concurrently,
        // so a strong count of 1 means no in-flight or queued operation.
        self.partitions.retain(|_, partition| {
            let keep = Arc::strong_count(partition) > 1 || partition.idle_for() < threshold;
            if !keep {
                evicted += 1;
            }
            keep
        });
        if evicted > 0 {
            debug!(evicted, remaining = self.partitions.len(), "evicted idle partitions");
        }
        evicted
    }

    fn partition(&self, key: &str) -> Arc<Partition> {
        if let Some(existing) = self.partitions.get(key) {
            return Arc::clone(existing.value());
        }
        self.partitions
            .entry(key.to_owned())
            .or_insert_with(|| {
                debug!(partition = %key, lanes = self.concurrency, "creating partition");
                Arc::new(Partition::new(self.concurrency, self.wait))
            })
            .clone()
    }
}

/// Derives the partition key of a URL: its lower-cased host.
///
/// Returns `"unknown"` for malformed or host-less URLs so they still share a
/// throttling budget.
///
/// # Examples
///
/// ```
/// use sitewatch_core::throttle::partition_key;
///
/// assert_eq!(partition_key("https://example.com/path"), "example.com");
/// assert_eq!(partition_key("http://Example.COM/Path"), "example.com");
/// assert_eq!(partition_key("https://localhost:8080/x"), "localhost");
/// assert_eq!(partition_key("not a url"), "unknown");
/// ```
#[must_use]
pub fn partition_key(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_lowercase))
        .unwrap_or_else(|| UNKNOWN_PARTITION.to_string())
}
