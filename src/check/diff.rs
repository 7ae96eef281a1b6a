//! Set difference of extracted links against already-known hrefs.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use super::extractor::ExtractedLink;
use crate::model::LinkEntry;

/// Filters extracted links down to the ones whose href is not yet known.
///
/// Identity is the resolved href alone. Order of the extracted list is kept
/// and duplicates within one extraction are not collapsed.
#[derive(Debug, Clone, Default)]
pub struct DiffEngine {
    known: HashSet<String>,
}

impl DiffEngine {
    /// Creates an engine over the hrefs already recorded for a resource.
    pub fn new(known: impl IntoIterator<Item = String>) -> Self {
        Self {
            known: known.into_iter().collect(),
        }
    }

    /// Returns true if `href` is already known.
    #[must_use]
    pub fn is_known(&self, href: &str) -> bool {
        self.known.contains(href)
    }

    /// Returns the unknown links as entries stamped with `discovered_at`.
    #[must_use]
    pub fn new_links(
        &self,
        site_id: i64,
        extracted: Vec<ExtractedLink>,
        discovered_at: DateTime<Utc>,
    ) -> Vec<LinkEntry> {
        extracted
            .into_iter()
            .filter(|link| !self.is_known(&link.href))
            .map(|link| LinkEntry {
                site_id,
                title: link.title,
                href: link.href,
                discovered_at,
            })
            .collect()
    }
}
