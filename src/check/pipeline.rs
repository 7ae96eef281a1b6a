//! One check of one resource: fetch, detect change, extract, diff.

use std::collections::HashSet;

use chrono::Utc;
use tracing::{debug, instrument};

use super::detector::{Change, detect_change};
use super::diff::DiffEngine;
use super::error::CheckError;
use super::extractor::extract_links;
use super::fetcher::Fetcher;
use crate::model::{LinkEntry, MonitoredResource, Snapshot};

/// Everything a check reads: the resource, its latest snapshot and the
/// hrefs already recorded for it.
#[derive(Debug, Clone)]
pub struct CheckInput {
    /// Resource to check.
    pub resource: MonitoredResource,
    /// Most recent snapshot, if any.
    pub latest_snapshot: Option<Snapshot>,
    /// Hrefs already known for this resource.
    pub known_hrefs: HashSet<String>,
}

impl CheckInput {
    /// Input for a resource that has never been checked.
    #[must_use]
    pub fn first_run(resource: MonitoredResource) -> Self {
        Self {
            resource,
            latest_snapshot: None,
            known_hrefs: HashSet::new(),
        }
    }
}

/// Result of a successful check.
///
/// `snapshot` is `None` when the page was unchanged, in which case
/// `new_links` is always empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    /// Resource the outcome belongs to.
    pub site_id: i64,
    /// New snapshot to persist when the content changed.
    pub snapshot: Option<Snapshot>,
    /// Links whose href was not known, in page order.
    pub new_links: Vec<LinkEntry>,
}

impl CheckOutcome {
    /// Outcome for a page identical to its last snapshot.
    #[must_use]
    pub fn unchanged(site_id: i64) -> Self {
        Self {
            site_id,
            snapshot: None,
            new_links: Vec::new(),
        }
    }

    /// Returns true when the page did not change.
    #[must_use]
    pub fn is_unchanged(&self) -> bool {
        self.snapshot.is_none()
    }
}

/// Runs the stages of a single check.
#[derive(Debug, Clone)]
pub struct CheckPipeline {
    fetcher: Fetcher,
}

impl CheckPipeline {
    /// Creates a pipeline that fetches with `fetcher`.
    #[must_use]
    pub fn new(fetcher: Fetcher) -> Self {
        Self { fetcher }
    }

    /// Checks one resource.
    ///
    /// Extraction only runs when the page changed. Nothing here touches
    /// storage; the caller persists the outcome.
    ///
    /// # Errors
    ///
    /// Returns the [`CheckError`] of the first failing stage.
    #[instrument(skip_all, fields(site_id = input.resource.id, site = %input.resource.name))]
    pub async fn run(&self, input: CheckInput) -> Result<CheckOutcome, CheckError> {
        let CheckInput {
            resource,
            latest_snapshot,
            known_hrefs,
        } = input;

        let page = self.fetcher.fetch(&resource.url, &resource.headers).await?;

        let change = detect_change(resource.id, latest_snapshot.as_ref(), page, Utc::now());
        let snapshot = match change {
            Change::Unchanged => {
                debug!("page unchanged");
                return Ok(CheckOutcome::unchanged(resource.id));
            }
            Change::Changed(snapshot) => snapshot,
        };

        let extracted = extract_links(&snapshot.body, &snapshot.url, &resource.selector)?;
        let new_links =
            DiffEngine::new(known_hrefs).new_links(resource.id, extracted, snapshot.captured_at);
        debug!(new_links = new_links.len(), "page changed");

        Ok(CheckOutcome {
            site_id: resource.id,
            snapshot: Some(snapshot),
            new_links,
        })
    }
}
