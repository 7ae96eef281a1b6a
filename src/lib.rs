//! Sitewatch Core Library
//!
//! Watches web pages for newly appeared links. Each registered page is
//! fetched, compared with its last snapshot and, when it changed, scanned
//! with a CSS selector; links whose target was never seen before are
//! reported and remembered.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`model`] - Plain values shared by the other modules
//! - [`throttle`] - Per-host bounded, spaced execution
//! - [`check`] - Fetch, change detection, link extraction and diffing
//! - [`db`] - Database connection and schema management
//! - [`store`] - Persistence of sites, snapshots and links

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod check;
pub mod db;
pub mod model;
pub mod store;
#[cfg(test)]
pub mod test_support;
pub mod throttle;
pub(crate) mod user_agent;

// Re-export commonly used types
pub use check::{
    BatchStats, CheckEngine, CheckError, CheckInput, CheckOutcome, CheckReport, EngineOptions,
    Fetcher, TaskFailure,
};
pub use db::{Database, DbError};
pub use model::{LinkEntry, MonitoredResource, Snapshot};
pub use store::{Store, StoreError};
pub use throttle::{PartitionPool, RateLimiter, ThrottleError, partition_key};
