//! `SQLite`-backed persistence of sites, snapshots and discovered links.
//!
//! The check pipeline never touches the database. The caller loads a
//! [`CheckInput`] per site with [`Store::load_check_inputs`], runs the
//! checks and writes each successful [`CheckOutcome`] back with
//! [`Store::record_outcome`].
//!
//! # Example
//!
//! ```no_run
//! use sitewatch_core::Database;
//! use sitewatch_core::store::{NewSite, Store};
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new(Path::new("db.sqlite")).await?;
//! let store = Store::new(db);
//! let id = store
//!     .add_site(&NewSite {
//!         name: "news".to_string(),
//!         url: "https://example.com/news".to_string(),
//!         css_selector: "ul.news a".to_string(),
//!         ..NewSite::default()
//!     })
//!     .await?;
//! let inputs = store.load_check_inputs(Some(id)).await?;
//! # let _ = inputs;
//! # Ok(())
//! # }
//! ```

mod error;
mod site;

pub use error::{StoreDbErrorKind, StoreError};
pub use site::{NewSite, SiteRecord, SiteUpdate};

use std::collections::HashSet;

use chrono::Utc;
use sqlx::Row;
use tracing::{debug, instrument};

use crate::check::{CheckInput, CheckOutcome, RETAINED_SNAPSHOTS};
use crate::db::Database;
use crate::model::{LinkEntry, Snapshot};
use site::{SiteRow, encode_headers};

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Returns `Ok(())` if at least one row was affected; otherwise [`StoreError::SiteNotFound`].
fn check_affected(id: i64, rows_affected: u64) -> Result<()> {
    if rows_affected == 0 {
        Err(StoreError::SiteNotFound(id))
    } else {
        Ok(())
    }
}

/// Store of sites, snapshots and links.
#[derive(Debug, Clone)]
pub struct Store {
    db: Database,
}

impl Store {
    /// Creates a store over an open database.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Returns the underlying database.
    #[must_use]
    pub fn database(&self) -> &Database {
        &self.db
    }

    // ==================== Sites ====================

    /// Registers a site and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateName`] if the name is taken,
    /// [`StoreError::Database`] if the insert fails.
    #[instrument(skip(self, site), fields(name = %site.name, url = %site.url))]
    pub async fn add_site(&self, site: &NewSite) -> Result<i64> {
        let headers_json = encode_headers(&site.name, &site.headers)?;

        let row = sqlx::query(
            r"INSERT INTO sites (name, url, css_selector, headers_json, created_at)
              VALUES (?, ?, ?, ?, ?)
              RETURNING id",
        )
        .bind(&site.name)
        .bind(&site.url)
        .bind(&site.css_selector)
        .bind(headers_json)
        .bind(Utc::now())
        .fetch_one(self.db.pool())
        .await
        .map_err(|e| StoreError::from_site_write(e, &site.name))?;

        Ok(row.get("id"))
    }

    /// Applies a partial update to a site and returns the updated site.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::SiteNotFound`] for an unknown id,
    /// [`StoreError::DuplicateName`] if the new name is taken.
    #[instrument(skip(self, update))]
    pub async fn update_site(&self, id: i64, update: SiteUpdate) -> Result<SiteRecord> {
        let mut tx = self.db.pool().begin().await?;

        let row = sqlx::query_as::<_, SiteRow>(r"SELECT * FROM sites WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(StoreError::SiteNotFound(id))?;
        let mut record = row.into_record()?;
        update.apply(&mut record.resource);

        let resource = &record.resource;
        let headers_json = encode_headers(&resource.name, &resource.headers)?;
        let result = sqlx::query(
            r"UPDATE sites
              SET name = ?, url = ?, css_selector = ?, headers_json = ?
              WHERE id = ?",
        )
        .bind(&resource.name)
        .bind(&resource.url)
        .bind(&resource.selector)
        .bind(headers_json)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::from_site_write(e, &resource.name))?;
        check_affected(id, result.rows_affected())?;

        tx.commit().await?;
        Ok(record)
    }

    /// Deletes a site with its snapshots and links.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::SiteNotFound`] for an unknown id.
    #[instrument(skip(self))]
    pub async fn remove_site(&self, id: i64) -> Result<()> {
        let result = sqlx::query(r"DELETE FROM sites WHERE id = ?")
            .bind(id)
            .execute(self.db.pool())
            .await?;

        check_affected(id, result.rows_affected())
    }

    /// Gets a site by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::SiteNotFound`] for an unknown id.
    #[instrument(skip(self))]
    pub async fn get_site(&self, id: i64) -> Result<SiteRecord> {
        sqlx::query_as::<_, SiteRow>(r"SELECT * FROM sites WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?
            .ok_or(StoreError::SiteNotFound(id))?
            .into_record()
    }

    /// Lists all sites in id order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn list_sites(&self) -> Result<Vec<SiteRecord>> {
        sqlx::query_as::<_, SiteRow>(r"SELECT * FROM sites ORDER BY id ASC")
            .fetch_all(self.db.pool())
            .await?
            .into_iter()
            .map(SiteRow::into_record)
            .collect()
    }

    // ==================== Links and snapshots ====================

    /// Lists discovered links by site, in discovery order within a site.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn links(&self, site_id: Option<i64>) -> Result<Vec<LinkEntry>> {
        let links = sqlx::query_as::<_, LinkEntry>(
            r"SELECT site_id, title, href, discovered_at FROM links
              WHERE ? IS NULL OR site_id = ?
              ORDER BY site_id ASC, id ASC",
        )
        .bind(site_id)
        .bind(site_id)
        .fetch_all(self.db.pool())
        .await?;

        Ok(links)
    }

    /// Returns the most recent snapshot of a site.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn latest_snapshot(&self, site_id: i64) -> Result<Option<Snapshot>> {
        let snapshot = sqlx::query_as::<_, Snapshot>(
            r"SELECT site_id, url, body, captured_at FROM snapshots
              WHERE site_id = ?
              ORDER BY id DESC
              LIMIT 1",
        )
        .bind(site_id)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(snapshot)
    }

    /// Counts the snapshots kept for a site.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn snapshot_count(&self, site_id: i64) -> Result<i64> {
        let row = sqlx::query(r"SELECT COUNT(*) AS count FROM snapshots WHERE site_id = ?")
            .bind(site_id)
            .fetch_one(self.db.pool())
            .await?;

        Ok(row.get("count"))
    }

    /// Returns every href recorded for a site.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn known_hrefs(&self, site_id: i64) -> Result<HashSet<String>> {
        let hrefs = sqlx::query_scalar::<_, String>(r"SELECT href FROM links WHERE site_id = ?")
            .bind(site_id)
            .fetch_all(self.db.pool())
            .await?;

        Ok(hrefs.into_iter().collect())
    }

    // ==================== Checks ====================

    /// Builds check inputs for one site, or for every site when `site_id` is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::SiteNotFound`] for an unknown id,
    /// [`StoreError::Database`] if a query fails.
    #[instrument(skip(self))]
    pub async fn load_check_inputs(&self, site_id: Option<i64>) -> Result<Vec<CheckInput>> {
        let sites = match site_id {
            Some(id) => vec![self.get_site(id).await?],
            None => self.list_sites().await?,
        };

        let mut inputs = Vec::with_capacity(sites.len());
        for site in sites {
            let id = site.resource.id;
            inputs.push(CheckInput {
                latest_snapshot: self.latest_snapshot(id).await?,
                known_hrefs: self.known_hrefs(id).await?,
                resource: site.resource,
            });
        }
        Ok(inputs)
    }

    /// Persists a successful check and returns how many links were inserted.
    ///
    /// Runs in one transaction: the new snapshot is inserted, older
    /// snapshots beyond the retention limit are deleted and new links are
    /// inserted. A link whose href is already recorded for the site is
    /// skipped. Unchanged outcomes write nothing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if any statement fails; nothing is written then.
    #[instrument(skip(self, outcome), fields(site_id = outcome.site_id))]
    pub async fn record_outcome(&self, outcome: &CheckOutcome) -> Result<u64> {
        let Some(snapshot) = &outcome.snapshot else {
            return Ok(0);
        };

        let mut tx = self.db.pool().begin().await?;

        sqlx::query(
            r"INSERT INTO snapshots (site_id, url, body, captured_at)
              VALUES (?, ?, ?, ?)",
        )
        .bind(snapshot.site_id)
        .bind(&snapshot.url)
        .bind(&snapshot.body)
        .bind(snapshot.captured_at)
        .execute(&mut *tx)
        .await?;

        let retained = i64::try_from(RETAINED_SNAPSHOTS).unwrap_or(i64::MAX);
        let pruned = sqlx::query(
            r"DELETE FROM snapshots
              WHERE site_id = ?
                AND id NOT IN (
                    SELECT id FROM snapshots
                    WHERE site_id = ?
                    ORDER BY id DESC
                    LIMIT ?
                )",
        )
        .bind(snapshot.site_id)
        .bind(snapshot.site_id)
        .bind(retained)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let mut inserted = 0;
        for link in &outcome.new_links {
            inserted += sqlx::query(
                r"INSERT OR IGNORE INTO links (site_id, title, href, discovered_at)
                  VALUES (?, ?, ?, ?)",
            )
            .bind(link.site_id)
            .bind(&link.title)
            .bind(&link.href)
            .bind(link.discovered_at)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }

        tx.commit().await?;
        debug!(pruned, inserted, "check outcome recorded");
        Ok(inserted)
    }
}
