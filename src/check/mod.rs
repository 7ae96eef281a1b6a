//! Change detection and link discovery for watched pages.
//!
//! A check runs in stages: the [`Fetcher`] downloads the page, the detector
//! compares it with the latest [`Snapshot`](crate::model::Snapshot), the
//! [`LinkExtractor`] applies the resource's CSS selector and the
//! [`DiffEngine`] keeps the hrefs not seen before. [`CheckEngine`] runs
//! many checks at once under per-host throttling.

mod constants;
mod detector;
mod diff;
mod engine;
mod error;
mod extractor;
mod fetcher;
mod pipeline;

pub use constants::{
    CONNECT_TIMEOUT_SECS, MAX_CONTENT_BYTES, REQUEST_TIMEOUT_SECS, RETAINED_SNAPSHOTS,
};
pub use detector::{Change, detect_change};
pub use diff::DiffEngine;
pub use engine::{BatchStats, CheckBatch, CheckEngine, CheckReport, EngineOptions};
pub use error::{CheckError, CheckErrorKind, TaskFailure};
pub use extractor::{ExtractedLink, LinkExtractor, extract_links};
pub use fetcher::{FetchedPage, Fetcher, FetcherOptions};
pub use pipeline::{CheckInput, CheckOutcome, CheckPipeline};
