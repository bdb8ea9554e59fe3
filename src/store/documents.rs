//! Document persistence.

use sqlx::{FromRow, SqliteConnection};
use tracing::{debug, instrument};

use super::views::{ViewRow, insert_view};
use super::{Store, StoreError};
use crate::model::{Attachment, Document, View};

#[derive(Debug, FromRow)]
struct DocumentRow {
    id: String,
    docket_id: Option<String>,
    title: Option<String>,
    agency: Option<String>,
    doc_type: Option<String>,
}

#[derive(Debug, FromRow)]
struct AttachmentRow {
    object_id: String,
    title: Option<String>,
}

impl Store {
    /// Saves a document with all of its views and attachments, replacing any
    /// previously stored copy.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if a write fails, including when two
    /// views of the same owner share a url.
    #[instrument(skip(self, document), fields(document_id = %document.id))]
    pub async fn insert_document(&self, document: &Document) -> Result<(), StoreError> {
        let mut tx = self.db.pool().begin().await?;

        sqlx::query(
            r"INSERT INTO documents (id, docket_id, title, agency, doc_type)
              VALUES (?, ?, ?, ?, ?)
              ON CONFLICT(id) DO UPDATE SET
                  docket_id = excluded.docket_id,
                  title = excluded.title,
                  agency = excluded.agency,
                  doc_type = excluded.doc_type",
        )
        .bind(&document.id)
        .bind(&document.docket_id)
        .bind(&document.title)
        .bind(&document.agency)
        .bind(&document.doc_type)
        .execute(&mut *tx)
        .await?;

        sqlx::query(r"DELETE FROM views WHERE document_id = ?")
            .bind(&document.id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(r"DELETE FROM attachments WHERE document_id = ?")
            .bind(&document.id)
            .execute(&mut *tx)
            .await?;

        insert_views(&mut tx, &document.id, "", &document.views).await?;

        for (position, attachment) in document.attachments.iter().enumerate() {
            sqlx::query(
                r"INSERT INTO attachments (document_id, object_id, title, position)
                  VALUES (?, ?, ?, ?)",
            )
            .bind(&document.id)
            .bind(&attachment.object_id)
            .bind(&attachment.title)
            .bind(i64::try_from(position).unwrap_or(i64::MAX))
            .execute(&mut *tx)
            .await?;
            insert_views(&mut tx, &document.id, &attachment.object_id, &attachment.views).await?;
        }

        tx.commit().await?;
        debug!(
            views = document.views.len(),
            attachments = document.attachments.len(),
            "document saved"
        );
        Ok(())
    }

    /// Loads a document with its views in stored order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if a query fails, or
    /// [`StoreError::Serialization`] if a stored status is invalid.
    #[instrument(skip(self))]
    pub async fn get_document(&self, id: &str) -> Result<Option<Document>, StoreError> {
        let Some(row) = sqlx::query_as::<_, DocumentRow>(
            r"SELECT id, docket_id, title, agency, doc_type FROM documents WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.db.pool())
        .await?
        else {
            return Ok(None);
        };

        let attachment_rows = sqlx::query_as::<_, AttachmentRow>(
            r"SELECT object_id, title FROM attachments
              WHERE document_id = ? ORDER BY position, object_id",
        )
        .bind(id)
        .fetch_all(self.db.pool())
        .await?;

        let view_rows = sqlx::query_as::<_, ViewRow>(
            r"SELECT id AS row_id, document_id, attachment_id, url, object_id, file_type,
                     file_path, downloaded, decoded, text, ocr
              FROM views WHERE document_id = ? ORDER BY id",
        )
        .bind(id)
        .fetch_all(self.db.pool())
        .await?;

        let mut document = Document {
            id: row.id,
            docket_id: row.docket_id,
            title: row.title,
            agency: row.agency,
            doc_type: row.doc_type,
            views: Vec::new(),
            attachments: attachment_rows
                .into_iter()
                .map(|attachment| Attachment {
                    object_id: attachment.object_id,
                    title: attachment.title,
                    views: Vec::new(),
                })
                .collect(),
        };

        for view_row in view_rows {
            let record = view_row.into_record()?;
            match record.attachment_id {
                None => document.views.push(record.view),
                Some(attachment_id) => {
                    if let Some(attachment) = document
                        .attachments
                        .iter_mut()
                        .find(|attachment| attachment.object_id == attachment_id)
                    {
                        attachment.views.push(record.view);
                    }
                }
            }
        }

        Ok(Some(document))
    }
}

async fn insert_views(
    conn: &mut SqliteConnection,
    document_id: &str,
    attachment_key: &str,
    views: &[View],
) -> Result<(), StoreError> {
    for view in views {
        insert_view(&mut *conn, document_id, attachment_key, view).await?;
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[tokio::test]
    async fn test_get_document_missing_returns_none() {
        let store = Store::new(Database::new_in_memory().await.unwrap());
        assert!(store.get_document("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_document_round_trips_views_and_attachments() {
        let store = Store::new(Database::new_in_memory().await.unwrap());
        let mut document = Document::new("EPA-HQ-OAR-2010-0001-0002");
        document.docket_id = Some("EPA-HQ-OAR-2010-0001".to_string());
        document.views = vec![View::new("u1", "pdf"), View::new("u2", "crtext")];
        document.attachments = vec![Attachment {
            object_id: "0900006480a1".to_string(),
            title: Some("Appendix".to_string()),
            views: vec![View::new("a1", "msw8")],
        }];

        store.insert_document(&document).await.unwrap();
        let loaded = store.get_document(&document.id).await.unwrap().unwrap();

        assert_eq!(loaded, document);
    }

    #[tokio::test]
    async fn test_insert_document_replaces_previous_copy() {
        let store = Store::new(Database::new_in_memory().await.unwrap());
        let mut document = Document::new("D-1");
        document.views = vec![View::new("u1", "pdf"), View::new("u2", "pdf")];
        store.insert_document(&document).await.unwrap();

        document.views = vec![View::new("u3", "html")];
        store.insert_document(&document).await.unwrap();

        let loaded = store.get_document("D-1").await.unwrap().unwrap();
        assert_eq!(loaded.views.len(), 1);
        assert_eq!(loaded.views[0].url, "u3");
    }
}
