//! Values exchanged between the check pipeline and its callers.
//!
//! These are plain data. The check pipeline reads them and returns new ones;
//! persisting them is the job of [`crate::store`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Caller-supplied HTTP request headers, sent as-is with every fetch.
pub type HeaderMap = BTreeMap<String, String>;

/// A web page being watched for new links.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoredResource {
    /// Unique identifier.
    pub id: i64,
    /// Display name (unique among resources).
    pub name: String,
    /// Page to fetch.
    pub url: String,
    /// CSS selector matching the anchors to report.
    pub selector: String,
    /// Optional request headers (cookies, auth tokens, ...).
    pub headers: HeaderMap,
}

/// Captured copy of a page at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Snapshot {
    /// Resource this snapshot belongs to.
    pub site_id: i64,
    /// Effective URL after redirects.
    pub url: String,
    /// Decoded body text.
    pub body: String,
    /// When the page was fetched.
    pub captured_at: DateTime<Utc>,
}

impl Snapshot {
    /// Returns true when `url` and `body` are exactly this snapshot's.
    #[must_use]
    pub fn same_content(&self, url: &str, body: &str) -> bool {
        self.url == url && self.body == body
    }
}

/// A link discovered on a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct LinkEntry {
    /// Resource the link was found on.
    pub site_id: i64,
    /// Visible text of the anchor.
    pub title: String,
    /// Absolute link target.
    pub href: String,
    /// When the link was first seen.
    pub discovered_at: DateTime<Utc>,
}
