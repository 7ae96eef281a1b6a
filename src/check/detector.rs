//! Change detection against the most recent snapshot.

use chrono::{DateTime, Utc};

use super::fetcher::FetchedPage;
use crate::model::Snapshot;

/// Result of comparing a fresh fetch with the previous snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// Effective URL and body are identical to the previous snapshot.
    Unchanged,
    /// First fetch, or URL or body differ. Carries the new snapshot.
    Changed(Snapshot),
}

/// Compares `page` with `previous` by exact URL and body equality.
#[must_use]
pub fn detect_change(
    site_id: i64,
    previous: Option<&Snapshot>,
    page: FetchedPage,
    captured_at: DateTime<Utc>,
) -> Change {
    if previous.is_some_and(|snapshot| snapshot.same_content(&page.url, &page.body)) {
        return Change::Unchanged;
    }

    Change::Changed(Snapshot {
        site_id,
        url: page.url,
        body: page.body,
        captured_at,
    })
}
