//! Docket scrape tasks.

use std::collections::VecDeque;

use async_trait::async_trait;
use sqlx::FromRow;
use tracing::{debug, info, instrument};

use super::{BoxCursor, Cursor, Keyed, Store, StoreError};
use crate::db::Database;
use crate::model::{DocketRecord, ScrapeStatus};

#[derive(Debug, FromRow)]
struct DocketRow {
    id: String,
    docket_id: String,
    scraped: String,
    failure_reason: Option<String>,
    payload: Option<String>,
}

impl DocketRow {
    fn into_record(self) -> Result<DocketRecord, StoreError> {
        let scraped = self
            .scraped
            .parse::<ScrapeStatus>()
            .map_err(|message| StoreError::Serialization {
                field: "dockets.scraped",
                message,
            })?;
        let payload = self
            .payload
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(|error| StoreError::Serialization {
                field: "dockets.payload",
                message: error.to_string(),
            })?;
        Ok(DocketRecord {
            id: self.id,
            docket_id: self.docket_id,
            scraped,
            failure_reason: self.failure_reason,
            payload,
        })
    }
}

/// Outcome of seeding docket tasks from stored documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedSummary {
    /// Distinct docket ids referenced by documents.
    pub total: u64,
    /// Docket tasks created by this run.
    pub new: u64,
}

/// Store seam used by the docket scrape supervisor.
#[async_trait]
pub trait DocketRepository: Send + Sync {
    /// Opens a cursor over dockets still waiting to be scraped, starting
    /// after the record id `after` when given.
    fn pending_dockets(&self, after: Option<&str>) -> BoxCursor<DocketRecord>;

    /// Persists a scrape outcome, keyed by the record's identity.
    async fn save_docket(&self, record: &DocketRecord) -> Result<(), StoreError>;
}

impl Store {
    /// Writes a docket record.
    ///
    /// With `upsert`, an existing record with the same identity is overwritten;
    /// without it, an existing record makes the write a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Serialization`] if the payload cannot be encoded,
    /// or [`StoreError::Database`] if the write fails.
    #[instrument(skip(self, record), fields(docket_id = %record.docket_id, status = %record.scraped))]
    pub async fn save_docket(&self, record: &DocketRecord, upsert: bool) -> Result<(), StoreError> {
        let payload = record
            .payload
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|error| StoreError::Serialization {
                field: "dockets.payload",
                message: error.to_string(),
            })?;

        let sql = if upsert {
            r"INSERT INTO dockets (id, docket_id, scraped, failure_reason, payload, updated_at)
              VALUES (?, ?, ?, ?, ?, datetime('now'))
              ON CONFLICT(id) DO UPDATE SET
                  docket_id = excluded.docket_id,
                  scraped = excluded.scraped,
                  failure_reason = excluded.failure_reason,
                  payload = excluded.payload,
                  updated_at = excluded.updated_at"
        } else {
            r"INSERT OR IGNORE INTO dockets (id, docket_id, scraped, failure_reason, payload, updated_at)
              VALUES (?, ?, ?, ?, ?, datetime('now'))"
        };

        sqlx::query(sql)
            .bind(&record.id)
            .bind(&record.docket_id)
            .bind(record.scraped.as_str())
            .bind(&record.failure_reason)
            .bind(payload)
            .execute(self.db.pool())
            .await?;
        Ok(())
    }

    /// Loads one docket record by identity.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails, or
    /// [`StoreError::Serialization`] if the stored record is invalid.
    pub async fn get_docket(&self, id: &str) -> Result<Option<DocketRecord>, StoreError> {
        sqlx::query_as::<_, DocketRow>(
            r"SELECT id, docket_id, scraped, failure_reason, payload FROM dockets WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.db.pool())
        .await?
        .map(DocketRow::into_record)
        .transpose()
    }

    /// Opens a cursor over dockets with scrape status `pending`.
    #[must_use]
    pub fn pending_dockets(&self) -> DocketCursor {
        self.pending_dockets_after(None)
    }

    /// Like [`Store::pending_dockets`], skipping record ids up to `after`.
    #[must_use]
    pub fn pending_dockets_after(&self, after: Option<&str>) -> DocketCursor {
        DocketCursor {
            db: self.db.clone(),
            page_size: self.page_size,
            last_id: after.unwrap_or_default().to_string(),
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    /// Creates a pending docket task for every docket id referenced by a
    /// document. Existing tasks are left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if a query fails.
    #[instrument(skip(self))]
    pub async fn create_dockets(&self) -> Result<SeedSummary, StoreError> {
        let docket_ids: Vec<(String,)> = sqlx::query_as(
            r"SELECT DISTINCT docket_id FROM documents
              WHERE docket_id IS NOT NULL AND docket_id <> ''
              ORDER BY docket_id",
        )
        .fetch_all(self.db.pool())
        .await?;

        let mut summary = SeedSummary::default();
        let mut tx = self.db.pool().begin().await?;
        for (docket_id,) in docket_ids {
            summary.total += 1;
            let result = sqlx::query(
                r"INSERT OR IGNORE INTO dockets (id, docket_id, scraped) VALUES (?, ?, 'pending')",
            )
            .bind(&docket_id)
            .bind(&docket_id)
            .execute(&mut *tx)
            .await?;
            summary.new += result.rows_affected();
        }
        tx.commit().await?;

        info!(
            total = summary.total,
            new = summary.new,
            "docket tasks seeded"
        );
        Ok(summary)
    }
}

#[async_trait]
impl DocketRepository for Store {
    fn pending_dockets(&self, after: Option<&str>) -> BoxCursor<DocketRecord> {
        Box::new(self.pending_dockets_after(after))
    }

    async fn save_docket(&self, record: &DocketRecord) -> Result<(), StoreError> {
        Store::save_docket(self, record, true).await
    }
}

/// Keyset-paged cursor over pending docket records.
pub struct DocketCursor {
    db: Database,
    page_size: u32,
    last_id: String,
    buffer: VecDeque<DocketRecord>,
    exhausted: bool,
}

impl DocketCursor {
    async fn fetch_page(&mut self) -> Result<(), StoreError> {
        let rows = sqlx::query_as::<_, DocketRow>(
            r"SELECT id, docket_id, scraped, failure_reason, payload FROM dockets
              WHERE scraped = 'pending' AND id > ?
              ORDER BY id LIMIT ?",
        )
        .bind(&self.last_id)
        .bind(i64::from(self.page_size))
        .fetch_all(self.db.pool())
        .await?;

        if rows.len() < self.page_size as usize {
            self.exhausted = true;
        }
        debug!(rows = rows.len(), after = %self.last_id, "docket page fetched");
        for row in rows {
            self.last_id.clone_from(&row.id);
            self.buffer.push_back(row.into_record()?);
        }
        Ok(())
    }
}

impl Keyed for DocketRecord {
    type Key = String;

    fn key(&self) -> String {
        self.id.clone()
    }
}

#[async_trait]
impl Cursor for DocketCursor {
    type Item = DocketRecord;

    async fn next(&mut self) -> Result<Option<DocketRecord>, StoreError> {
        if self.buffer.is_empty() && !self.exhausted {
            self.fetch_page().await?;
        }
        Ok(self.buffer.pop_front())
    }
}
