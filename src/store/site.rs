//! Site rows and the values used to create and modify them.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use super::error::StoreError;
use crate::model::{HeaderMap, MonitoredResource};

/// A site as registered in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteRecord {
    /// The watched resource.
    pub resource: MonitoredResource,
    /// When the site was added.
    pub created_at: DateTime<Utc>,
}

/// Fields of a site to be added.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewSite {
    /// Unique display name.
    pub name: String,
    /// Page to watch.
    pub url: String,
    /// CSS selector for the anchors to report.
    pub css_selector: String,
    /// Request headers sent with every fetch.
    pub headers: HeaderMap,
}

/// Partial modification of a site. `None` fields are left as they are.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SiteUpdate {
    /// New display name.
    pub name: Option<String>,
    /// New page URL.
    pub url: Option<String>,
    /// New CSS selector.
    pub css_selector: Option<String>,
    /// Replacement header set.
    pub headers: Option<HeaderMap>,
}

impl SiteUpdate {
    /// Returns true when no field would change.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.url.is_none()
            && self.css_selector.is_none()
            && self.headers.is_none()
    }

    pub(crate) fn apply(self, resource: &mut MonitoredResource) {
        if let Some(name) = self.name {
            resource.name = name;
        }
        if let Some(url) = self.url {
            resource.url = url;
        }
        if let Some(selector) = self.css_selector {
            resource.selector = selector;
        }
        if let Some(headers) = self.headers {
            resource.headers = headers;
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct SiteRow {
    id: i64,
    name: String,
    url: String,
    css_selector: String,
    headers_json: Option<String>,
    created_at: DateTime<Utc>,
}

impl SiteRow {
    pub(crate) fn into_record(self) -> Result<SiteRecord, StoreError> {
        let headers = decode_headers(&self.name, self.headers_json.as_deref())?;
        Ok(SiteRecord {
            resource: MonitoredResource {
                id: self.id,
                name: self.name,
                url: self.url,
                selector: self.css_selector,
                headers,
            },
            created_at: self.created_at,
        })
    }
}

/// Headers are stored as a JSON object, or NULL when there are none.
pub(crate) fn encode_headers(
    site: &str,
    headers: &HeaderMap,
) -> Result<Option<String>, StoreError> {
    if headers.is_empty() {
        return Ok(None);
    }
    serde_json::to_string(headers)
        .map(Some)
        .map_err(|e| StoreError::InvalidHeaders {
            site: site.to_string(),
            message: e.to_string(),
        })
}

fn decode_headers(site: &str, json: Option<&str>) -> Result<HeaderMap, StoreError> {
    match json.map(str::trim).filter(|json| !json.is_empty()) {
        None => Ok(HeaderMap::new()),
        Some(json) => serde_json::from_str(json).map_err(|e| StoreError::InvalidHeaders {
            site: site.to_string(),
            message: e.to_string(),
        }),
    }
}
