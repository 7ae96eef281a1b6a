//! Concurrent checking of many resources.
//!
//! [`CheckEngine`] spawns one task per resource. Every task runs its
//! pipeline through the shared [`PartitionPool`], keyed by the resource's
//! host, so checks of one host are spaced and bounded while different hosts
//! proceed independently. Results stream back through [`CheckBatch`] in
//! completion order.
//!
//! # Example
//!
//! ```no_run
//! use sitewatch_core::check::{CheckEngine, CheckInput, EngineOptions, Fetcher};
//! # use sitewatch_core::model::MonitoredResource;
//!
//! # async fn example(resources: Vec<MonitoredResource>) -> Result<(), Box<dyn std::error::Error>> {
//! let engine = CheckEngine::new(EngineOptions::default(), Fetcher::new()?)?;
//! let mut batch = engine.spawn_batch(resources.into_iter().map(CheckInput::first_run));
//! while let Some(report) = batch.join_next().await {
//!     match report.result {
//!         Ok(outcome) => println!("{}: {} new", report.site_name, outcome.new_links.len()),
//!         Err(failure) => eprintln!("error on {}: {}", report.site_id, failure),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::error::{CheckError, TaskFailure};
use super::fetcher::Fetcher;
use super::pipeline::{CheckInput, CheckOutcome, CheckPipeline};
use crate::throttle::{
    DEFAULT_CONCURRENCY, DEFAULT_WAIT, PartitionPool, ThrottleError, partition_key,
};

/// Engine settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Checks allowed in flight per host.
    pub concurrency: usize,
    /// Minimum gap between checks on one lane.
    pub wait: Duration,
    /// Upper bound on one whole check, throttle wait excluded.
    pub check_timeout: Option<Duration>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            wait: DEFAULT_WAIT,
            check_timeout: None,
        }
    }
}

/// Result of checking one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckReport {
    /// Resource identifier.
    pub site_id: i64,
    /// Resource display name.
    pub site_name: String,
    /// Outcome, or the reason the check failed.
    pub result: Result<CheckOutcome, TaskFailure>,
}

/// Counters over the reports collected so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    changed: usize,
    unchanged: usize,
    failed: usize,
    new_links: usize,
}

impl BatchStats {
    /// Checks whose page changed.
    #[must_use]
    pub fn changed(&self) -> usize {
        self.changed
    }

    /// Checks whose page was identical to the last snapshot.
    #[must_use]
    pub fn unchanged(&self) -> usize {
        self.unchanged
    }

    /// Checks that failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed
    }

    /// New links across all successful checks.
    #[must_use]
    pub fn new_links(&self) -> usize {
        self.new_links
    }

    /// Checks finished, successful or not.
    #[must_use]
    pub fn total(&self) -> usize {
        self.changed + self.unchanged + self.failed
    }

    fn record(&mut self, report: &CheckReport) {
        match &report.result {
            Ok(outcome) if outcome.is_unchanged() => self.unchanged += 1,
            Ok(outcome) => {
                self.changed += 1;
                self.new_links += outcome.new_links.len();
            }
            Err(_) => self.failed += 1,
        }
    }
}

/// Checks resources concurrently under per-host throttling.
#[derive(Debug, Clone)]
pub struct CheckEngine {
    pool: Arc<PartitionPool>,
    pipeline: CheckPipeline,
    check_timeout: Option<Duration>,
}

impl CheckEngine {
    /// Creates an engine.
    ///
    /// # Errors
    ///
    /// Returns [`ThrottleError::InvalidConcurrency`] when `options.concurrency` is 0.
    pub fn new(options: EngineOptions, fetcher: Fetcher) -> Result<Self, ThrottleError> {
        let pool = PartitionPool::new(options.concurrency, options.wait)?;
        Ok(Self {
            pool: Arc::new(pool),
            pipeline: CheckPipeline::new(fetcher),
            check_timeout: options.check_timeout,
        })
    }

    /// Returns the throttling pool shared by all checks of this engine.
    #[must_use]
    pub fn pool(&self) -> &PartitionPool {
        &self.pool
    }

    /// Spawns one check per input and returns a handle to collect reports.
    ///
    /// Must be called within a tokio runtime.
    pub fn spawn_batch(&self, inputs: impl IntoIterator<Item = CheckInput>) -> CheckBatch {
        let mut tasks = JoinSet::new();
        for input in inputs {
            let pool = Arc::clone(&self.pool);
            let pipeline = self.pipeline.clone();
            let check_timeout = self.check_timeout;
            tasks.spawn(run_check(pool, pipeline, input, check_timeout));
        }

        info!(checks = tasks.len(), "check batch started");
        CheckBatch {
            tasks,
            stats: BatchStats::default(),
        }
    }

    /// Checks every input and waits for all reports.
    pub async fn run_batch(
        &self,
        inputs: impl IntoIterator<Item = CheckInput>,
    ) -> (Vec<CheckReport>, BatchStats) {
        self.spawn_batch(inputs).join_all().await
    }
}

/// Reports of a running batch, yielded in completion order.
#[derive(Debug)]
pub struct CheckBatch {
    tasks: JoinSet<CheckReport>,
    stats: BatchStats,
}

impl CheckBatch {
    /// Waits for the next check to finish.
    ///
    /// Returns `None` once every check has been reported.
    pub async fn join_next(&mut self) -> Option<CheckReport> {
        loop {
            match self.tasks.join_next().await? {
                Ok(report) => {
                    self.stats.record(&report);
                    return Some(report);
                }
                Err(error) => {
                    warn!(error = %error, "check task did not complete");
                }
            }
        }
    }

    /// Waits for every remaining check.
    pub async fn join_all(mut self) -> (Vec<CheckReport>, BatchStats) {
        let mut reports = Vec::with_capacity(self.tasks.len());
        while let Some(report) = self.join_next().await {
            reports.push(report);
        }
        info!(
            changed = self.stats.changed,
            unchanged = self.stats.unchanged,
            failed = self.stats.failed,
            new_links = self.stats.new_links,
            "check batch finished"
        );
        (reports, self.stats)
    }

    /// Checks still running.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.tasks.len()
    }

    /// Counters over the reports returned so far.
    #[must_use]
    pub fn stats(&self) -> BatchStats {
        self.stats
    }
}

async fn run_check(
    pool: Arc<PartitionPool>,
    pipeline: CheckPipeline,
    input: CheckInput,
    check_timeout: Option<Duration>,
) -> CheckReport {
    let site_id = input.resource.id;
    let site_name = input.resource.name.clone();
    let key = partition_key(&input.resource.url);

    let guarded = AssertUnwindSafe(pool.execute(&key, || {
        run_pipeline(&pipeline, input, check_timeout)
    }))
    .catch_unwind()
    .await;

    let result = match guarded {
        Ok(Ok(Ok(outcome))) => Ok(outcome),
        Ok(Ok(Err(error))) => {
            debug!(site_id, kind = %error.kind(), error = %error, "check failed");
            Err(TaskFailure::from(error))
        }
        Ok(Err(throttle_error)) => {
            warn!(site_id, error = %throttle_error, "check could not be scheduled");
            Err(TaskFailure::new(throttle_error.to_string()))
        }
        Err(panic) => {
            let detail = panic_message(panic.as_ref());
            warn!(site_id, panic = %detail, "check panicked");
            Err(TaskFailure::new(format!("check panicked: {detail}")))
        }
    };

    CheckReport {
        site_id,
        site_name,
        result,
    }
}

async fn run_pipeline(
    pipeline: &CheckPipeline,
    input: CheckInput,
    check_timeout: Option<Duration>,
) -> Result<CheckOutcome, CheckError> {
    match check_timeout {
        Some(limit) => tokio::time::timeout(limit, pipeline.run(input))
            .await
            .unwrap_or_else(|_| Err(CheckError::timed_out(limit))),
        None => pipeline.run(input).await,
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
