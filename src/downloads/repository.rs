//! Whole-set persistence for downloads.
//!
//! The manager owns the authoritative in-memory set; this repository only
//! snapshots it. Every save replaces the stored set inside one transaction,
//! so readers never observe a partially written set.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use tracing::{debug, instrument};

use super::{Download, DownloadError, DownloadStatus};
use crate::db::Database;

#[derive(Debug, FromRow)]
struct DownloadRow {
    id: String,
    queue_id: String,
    title: String,
    category: String,
    urls: String,
    link_id: Option<i64>,
    agent_id: Option<String>,
    package_name: Option<String>,
    status: String,
    bytes_total: i64,
    bytes_downloaded: i64,
    speed: i64,
    eta: Option<i64>,
    output_path: Option<String>,
    created_at: String,
    completed_at: Option<String>,
    error: Option<String>,
}

impl DownloadRow {
    fn into_download(self) -> Result<Download, DownloadError> {
        let status = self
            .status
            .parse::<DownloadStatus>()
            .map_err(|reason| DownloadError::corrupt(&self.id, reason))?;
        let urls: Vec<String> = serde_json::from_str(&self.urls)
            .map_err(|e| DownloadError::corrupt(&self.id, format!("urls: {e}")))?;
        let created_at = parse_timestamp(&self.created_at)
            .ok_or_else(|| DownloadError::corrupt(&self.id, "created_at"))?;

        Ok(Download {
            queue_id: self.queue_id,
            title: self.title,
            category: self.category,
            urls,
            link_id: self.link_id.and_then(|id| u64::try_from(id).ok()),
            agent_id: self.agent_id,
            package_name: self.package_name,
            status,
            bytes_total: to_u64(self.bytes_total),
            bytes_downloaded: to_u64(self.bytes_downloaded),
            speed: to_u64(self.speed),
            eta: self.eta.and_then(|eta| u64::try_from(eta).ok()),
            output_path: self.output_path,
            created_at,
            completed_at: self.completed_at.as_deref().and_then(parse_timestamp),
            error: self.error,
            id: self.id,
        })
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// `SQLite`-backed snapshot store for the download set.
#[derive(Debug, Clone)]
pub struct DownloadRepository {
    db: Database,
}

impl DownloadRepository {
    /// Creates a repository over an open database.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Loads every persisted download.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Database`] when the query fails and
    /// [`DownloadError::CorruptRecord`] when a row cannot be decoded.
    #[instrument(skip(self))]
    pub async fn load_all(&self) -> Result<Vec<Download>, DownloadError> {
        let rows: Vec<DownloadRow> =
            sqlx::query_as("SELECT * FROM downloads ORDER BY created_at ASC")
                .fetch_all(self.db.pool())
                .await?;
        let downloads = rows
            .into_iter()
            .map(DownloadRow::into_download)
            .collect::<Result<Vec<_>, _>>()?;
        debug!(count = downloads.len(), "Downloads loaded");
        Ok(downloads)
    }

    /// Replaces the stored set with `downloads` atomically.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Database`] when any statement fails; the
    /// previous set is then left untouched.
    #[instrument(skip(self, downloads))]
    pub async fn save_all<'a>(
        &self,
        downloads: impl IntoIterator<Item = &'a Download>,
    ) -> Result<(), DownloadError> {
        let mut tx = self.db.pool().begin().await?;
        sqlx::query("DELETE FROM downloads").execute(&mut *tx).await?;

        let mut count = 0_usize;
        for download in downloads {
            let urls = serde_json::to_string(&download.urls)
                .map_err(|e| DownloadError::corrupt(&download.id, format!("urls: {e}")))?;
            sqlx::query(
                r"INSERT INTO downloads (
                    id, queue_id, title, category, urls, link_id, agent_id, package_name,
                    status, bytes_total, bytes_downloaded, speed, eta, output_path,
                    created_at, completed_at, error
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&download.id)
            .bind(&download.queue_id)
            .bind(&download.title)
            .bind(&download.category)
            .bind(urls)
            .bind(download.link_id.map(to_i64))
            .bind(&download.agent_id)
            .bind(&download.package_name)
            .bind(download.status.as_str())
            .bind(to_i64(download.bytes_total))
            .bind(to_i64(download.bytes_downloaded))
            .bind(to_i64(download.speed))
            .bind(download.eta.map(to_i64))
            .bind(&download.output_path)
            .bind(download.created_at.to_rfc3339())
            .bind(download.completed_at.map(|at| at.to_rfc3339()))
            .bind(&download.error)
            .execute(&mut *tx)
            .await?;
            count += 1;
        }

        tx.commit().await?;
        debug!(count, "Download set persisted");
        Ok(())
    }
}
