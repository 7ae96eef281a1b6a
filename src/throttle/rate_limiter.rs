//! Serialized, spaced execution of operations sharing one lane.
//!
//! A [`RateLimiter`] runs at most one wrapped operation at a time. Before
//! starting an operation it waits until at least `wait` has passed since the
//! *previous operation completed*. Spacing is measured completion-to-start, so
//! a slow operation pushes back the next one by its full duration plus `wait`.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use sitewatch_core::throttle::RateLimiter;
//!
//! # async fn example() {
//! let limiter = RateLimiter::new(Duration::from_secs(1));
//!
//! // First call runs immediately
//! let a = limiter.call(|| async { 1 }).await;
//!
//! // Second call starts no sooner than 1s after the first one finished
//! let b = limiter.call(|| async { 2 }).await;
//! assert_eq!(a + b, 3);
//! # }
//! ```

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Warning threshold for cumulative throttling delay on one lane (30 seconds).
const CUMULATIVE_DELAY_WARNING_THRESHOLD: Duration = Duration::from_secs(30);

/// Mutex-guarded limiter enforcing a minimum gap between completions and starts.
///
/// The mutex is held for the whole wait + operation, which is what makes
/// execution on one limiter strictly sequential.
#[derive(Debug)]
pub struct RateLimiter {
    /// Minimum time between one completion and the next start.
    wait: Duration,

    /// Completion time of the previous operation.
    /// `None` until the first operation completes (first call never waits).
    last_completed: Mutex<Option<Instant>>,

    /// Total time spent sleeping on this limiter, in milliseconds.
    cumulative_delay_ms: AtomicU64,
}

/// Records the completion instant when dropped.
///
/// Dropping happens on every exit path of the wrapped operation: normal
/// return, error value, panic unwinding, or the caller dropping the future.
struct CompletionGuard<'a> {
    slot: &'a mut Option<Instant>,
}

impl Drop for CompletionGuard<'_> {
    fn drop(&mut self) {
        *self.slot = Some(Instant::now());
    }
}

impl RateLimiter {
    /// Creates a limiter with the given minimum spacing.
    #[must_use]
    pub fn new(wait: Duration) -> Self {
        Self {
            wait,
            last_completed: Mutex::new(None),
            cumulative_delay_ms: AtomicU64::new(0),
        }
    }

    /// Returns the configured minimum spacing.
    #[must_use]
    pub fn wait(&self) -> Duration {
        self.wait
    }

    /// Returns how long this limiter has slept in total.
    #[must_use]
    pub fn cumulative_delay(&self) -> Duration {
        Duration::from_millis(self.cumulative_delay_ms.load(Ordering::SeqCst))
    }

    /// Returns the completion time of the most recent operation, if any.
    pub async fn last_completed(&self) -> Option<Instant> {
        *self.last_completed.lock().await
    }

    /// Runs `op` once no other operation holds this limiter and the spacing
    /// since the previous completion has elapsed.
    ///
    /// The completion time is recorded whatever `op` returns, so a failed
    /// operation paces the next one exactly like a successful one.
    pub async fn call<F, Fut, T>(&self, op: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let mut last_completed = self.last_completed.lock().await;

        if let Some(previous) = *last_completed {
            let elapsed = previous.elapsed();
            if elapsed < self.wait {
                let delay = self.wait.saturating_sub(elapsed);
                let cumulative = self.add_cumulative_delay(delay);

                debug!(
                    delay_ms = delay.as_millis(),
                    cumulative_ms = cumulative.as_millis(),
                    "applying throttle delay"
                );

                if cumulative >= CUMULATIVE_DELAY_WARNING_THRESHOLD
                    && cumulative.saturating_sub(delay) < CUMULATIVE_DELAY_WARNING_THRESHOLD
                {
                    warn!(
                        cumulative_delay_secs = cumulative.as_secs(),
                        "excessive throttling on one lane - consider raising concurrency"
                    );
                }

                tokio::time::sleep(delay).await;
            }
        }

        let _completion = CompletionGuard {
            slot: &mut *last_completed,
        };
        op().await
    }

    #[allow(clippy::cast_possible_truncation)]
    fn add_cumulative_delay(&self, delay: Duration) -> Duration {
        let delay_ms = delay.as_millis() as u64;
        let total = self
            .cumulative_delay_ms
            .fetch_add(delay_ms, Ordering::SeqCst)
            + delay_ms;
        Duration::from_millis(total)
    }
}
