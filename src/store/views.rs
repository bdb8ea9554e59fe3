//! View queries and view updates.

use std::collections::VecDeque;
use std::path::PathBuf;

use async_trait::async_trait;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection};
use tracing::{debug, instrument};

use super::{Cursor, Store, StoreError, ViewQuery, ViewRecord, ViewScope};
use crate::db::Database;
use crate::model::{DecodeStatus, View};

#[derive(Debug, FromRow)]
pub(super) struct ViewRow {
    row_id: i64,
    document_id: String,
    attachment_id: String,
    url: String,
    object_id: Option<String>,
    file_type: String,
    file_path: Option<String>,
    downloaded: bool,
    decoded: String,
    text: Option<String>,
    ocr: bool,
}

impl ViewRow {
    pub(super) fn into_record(self) -> Result<ViewRecord, StoreError> {
        let decoded = self
            .decoded
            .parse::<DecodeStatus>()
            .map_err(|message| StoreError::Serialization {
                field: "views.decoded",
                message,
            })?;
        Ok(ViewRecord {
            row_id: self.row_id,
            document_id: self.document_id,
            attachment_id: (!self.attachment_id.is_empty()).then_some(self.attachment_id),
            view: View {
                url: self.url,
                object_id: self.object_id,
                file_type: self.file_type,
                file: self.file_path.map(PathBuf::from),
                downloaded: self.downloaded,
                decoded,
                text: self.text,
                ocr: self.ocr,
            },
        })
    }
}

/// Appends one view row for the given owner. `attachment_key` is empty for
/// document-level views.
pub(super) async fn insert_view(
    conn: &mut SqliteConnection,
    document_id: &str,
    attachment_key: &str,
    view: &View,
) -> Result<(), StoreError> {
    sqlx::query(
        r"INSERT INTO views
              (document_id, attachment_id, url, object_id, file_type, file_path,
               downloaded, decoded, text, ocr, updated_at)
          VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, datetime('now'))",
    )
    .bind(document_id)
    .bind(attachment_key)
    .bind(&view.url)
    .bind(&view.object_id)
    .bind(&view.file_type)
    .bind(
        view.file
            .as_ref()
            .map(|path| path.to_string_lossy().into_owned()),
    )
    .bind(view.downloaded)
    .bind(view.decoded.as_str())
    .bind(&view.text)
    .bind(view.ocr)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

impl Store {
    /// Replaces the document-level view whose url matches `view.url`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DocumentNotFound`] if the document does not exist,
    /// or [`StoreError::Database`] if a write fails.
    #[instrument(skip(self, view), fields(url = %view.url))]
    pub async fn update_view(&self, document_id: &str, view: &View) -> Result<(), StoreError> {
        let mut tx = self.db.pool().begin().await?;

        let exists = sqlx::query(r"SELECT 1 FROM documents WHERE id = ?")
            .bind(document_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(StoreError::DocumentNotFound(document_id.to_string()));
        }

        replace_view(&mut tx, document_id, "", view).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Replaces the view on one attachment whose url matches `view.url`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DocumentNotFound`] or
    /// [`StoreError::AttachmentNotFound`] if an owner is missing, or
    /// [`StoreError::Database`] if a write fails.
    #[instrument(skip(self, view), fields(url = %view.url))]
    pub async fn update_attachment_view(
        &self,
        document_id: &str,
        attachment_id: &str,
        view: &View,
    ) -> Result<(), StoreError> {
        let mut tx = self.db.pool().begin().await?;

        let document = sqlx::query(r"SELECT 1 FROM documents WHERE id = ?")
            .bind(document_id)
            .fetch_optional(&mut *tx)
            .await?;
        if document.is_none() {
            return Err(StoreError::DocumentNotFound(document_id.to_string()));
        }

        let attachment =
            sqlx::query(r"SELECT 1 FROM attachments WHERE document_id = ? AND object_id = ?")
                .bind(document_id)
                .bind(attachment_id)
                .fetch_optional(&mut *tx)
                .await?;
        if attachment.is_none() {
            return Err(StoreError::AttachmentNotFound {
                document_id: document_id.to_string(),
                attachment_id: attachment_id.to_string(),
            });
        }

        replace_view(&mut tx, document_id, attachment_id, view).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Returns failed views to the decode backlog.
    ///
    /// With `file_type`, only views of that type are reset.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the update fails.
    #[instrument(skip(self))]
    pub async fn reset_failed_views(&self, file_type: Option<&str>) -> Result<u64, StoreError> {
        let mut builder = QueryBuilder::<Sqlite>::new(
            r"UPDATE views SET decoded = 'pending', text = NULL, ocr = 0,
                  updated_at = datetime('now')
              WHERE decoded = 'failed'",
        );
        if let Some(file_type) = file_type {
            builder.push(" AND file_type = ").push_bind(file_type.to_string());
        }
        let result = builder.build().execute(self.db.pool()).await?;

        debug!(reset = result.rows_affected(), "failed views reset");
        Ok(result.rows_affected())
    }
}

/// Removes the view with the same url from its owner and appends the new one.
async fn replace_view(
    conn: &mut SqliteConnection,
    document_id: &str,
    attachment_key: &str,
    view: &View,
) -> Result<(), StoreError> {
    sqlx::query(r"DELETE FROM views WHERE document_id = ? AND attachment_id = ? AND url = ?")
        .bind(document_id)
        .bind(attachment_key)
        .bind(&view.url)
        .execute(&mut *conn)
        .await?;
    insert_view(conn, document_id, attachment_key, view).await
}

/// Lazy, keyset-paged cursor over views matching a [`ViewQuery`].
///
/// Each page resumes after the last row id seen. A view updated while the
/// cursor is open moves to a new row id, so it is yielded again only if its
/// new state still matches the query.
pub struct ViewCursor {
    db: Database,
    scope: ViewScope,
    query: ViewQuery,
    page_size: u32,
    last_id: i64,
    buffer: VecDeque<ViewRecord>,
    exhausted: bool,
}

impl ViewCursor {
    pub(super) fn new(
        db: Database,
        scope: ViewScope,
        query: ViewQuery,
        page_size: u32,
        after: i64,
    ) -> Self {
        Self {
            db,
            scope,
            query,
            page_size,
            last_id: after,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    async fn fetch_page(&mut self) -> Result<(), StoreError> {
        let mut builder = QueryBuilder::<Sqlite>::new(
            r"SELECT v.id AS row_id, v.document_id, v.attachment_id, v.url, v.object_id,
                     v.file_type, v.file_path, v.downloaded, v.decoded, v.text, v.ocr
              FROM views v JOIN documents d ON d.id = v.document_id
              WHERE v.id > ",
        );
        builder.push_bind(self.last_id);

        match self.scope {
            ViewScope::Documents => builder.push(" AND v.attachment_id = ''"),
            ViewScope::Attachments => builder.push(" AND v.attachment_id <> ''"),
        };
        if let Some(downloaded) = self.query.downloaded {
            builder.push(" AND v.downloaded = ").push_bind(downloaded);
        }
        if let Some(decoded) = self.query.decoded {
            builder.push(" AND v.decoded = ").push_bind(decoded.as_str());
        }
        if let Some(file_type) = &self.query.file_type {
            builder.push(" AND v.file_type = ").push_bind(file_type.clone());
        }
        if let Some(agency) = &self.query.filter.agency {
            builder.push(" AND d.agency = ").push_bind(agency.clone());
        }
        if let Some(docket_id) = &self.query.filter.docket_id {
            builder.push(" AND d.docket_id = ").push_bind(docket_id.clone());
        }
        builder
            .push(" ORDER BY v.id LIMIT ")
            .push_bind(i64::from(self.page_size));

        let rows = builder
            .build_query_as::<ViewRow>()
            .fetch_all(self.db.pool())
            .await?;

        if rows.len() < self.page_size as usize {
            self.exhausted = true;
        }
        for row in rows {
            self.last_id = row.row_id;
            self.buffer.push_back(row.into_record()?);
        }
        Ok(())
    }
}

#[async_trait]
impl Cursor for ViewCursor {
    type Item = ViewRecord;

    async fn next(&mut self) -> Result<Option<ViewRecord>, StoreError> {
        if self.buffer.is_empty() && !self.exhausted {
            self.fetch_page().await?;
        }
        Ok(self.buffer.pop_front())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{Attachment, Document};

    async fn seeded_store() -> Store {
        let store = Store::new(Database::new_in_memory().await.unwrap()).with_page_size(2);
        let mut document = Document::new("D-1");
        document.agency = Some("EPA".to_string());
        document.views = vec![
            View::new("u1", "pdf"),
            View::new("u2", "html"),
            View::new("u3", "pdf"),
        ];
        document.attachments = vec![Attachment {
            object_id: "A-1".to_string(),
            title: None,
            views: vec![View::new("a1", "pdf")],
        }];
        store.insert_document(&document).await.unwrap();
        store
    }

    async fn drain(mut cursor: ViewCursor) -> Vec<ViewRecord> {
        let mut out = Vec::new();
        while let Some(record) = cursor.next().await.unwrap() {
            out.push(record);
        }
        out
    }

    #[tokio::test]
    async fn test_view_cursor_pages_through_document_views() {
        let store = seeded_store().await;
        let records = drain(store.find_views(&ViewQuery::default())).await;

        let urls: Vec<&str> = records.iter().map(|r| r.view.url.as_str()).collect();
        assert_eq!(urls, vec!["u1", "u2", "u3"]);
        assert!(records.iter().all(|r| r.attachment_id.is_none()));
    }

    #[tokio::test]
    async fn test_view_cursor_filters_by_file_type() {
        let store = seeded_store().await;
        let query = ViewQuery::default().with_file_type(Some("pdf".to_string()));
        let records = drain(store.find_views(&query)).await;
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn test_attachment_cursor_carries_owner_ids() {
        let store = seeded_store().await;
        let records = drain(store.find_attachment_views(&ViewQuery::default())).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].document_id, "D-1");
        assert_eq!(records[0].attachment_id.as_deref(), Some("A-1"));
    }

    #[tokio::test]
    async fn test_update_view_replaces_entry_with_same_url() {
        let store = seeded_store().await;
        let mut view = View::new("u2", "html");
        view.mark_downloaded(PathBuf::from("/data/u2.html"));

        store.update_view("D-1", &view).await.unwrap();

        let document = store.get_document("D-1").await.unwrap().unwrap();
        let matching: Vec<&View> = document.views.iter().filter(|v| v.url == "u2").collect();
        assert_eq!(matching.len(), 1);
        assert!(matching[0].downloaded);
        assert_eq!(document.views.last().unwrap().url, "u2");
    }

    #[tokio::test]
    async fn test_update_view_missing_document() {
        let store = seeded_store().await;
        let result = store.update_view("D-404", &View::new("u1", "pdf")).await;
        assert!(matches!(result, Err(StoreError::DocumentNotFound(id)) if id == "D-404"));
    }

    #[tokio::test]
    async fn test_update_attachment_view_missing_attachment() {
        let store = seeded_store().await;
        let result = store
            .update_attachment_view("D-1", "A-404", &View::new("a1", "pdf"))
            .await;
        assert!(matches!(result, Err(StoreError::AttachmentNotFound { .. })));
    }
}
