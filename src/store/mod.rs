//! Persistent store for documents, their views, and docket scrape tasks.
//!
//! The [`Store`] is the store collaborator the pipeline runs against:
//!
//! - `find_views` / `find_attachment_views` return lazy [`ViewCursor`]s over
//!   views matching a [`ViewQuery`]
//! - `update_view` / `update_attachment_view` replace a view by url
//! - `save_docket` persists docket scrape outcomes
//!
//! View updates remove the existing entry with the same url and insert the new
//! one. SQLite lets both steps run in one transaction, so the url is never
//! observed as missing. Callers must still not dispatch two concurrent updates
//! for the same url: the later commit wins.

mod cursor;
mod dockets;
mod documents;
mod error;
mod views;

use serde::{Deserialize, Serialize};

use crate::db::Database;
use crate::model::{DecodeStatus, View};

pub use cursor::{BoxCursor, Cursor, DEFAULT_MAX_CONSECUTIVE_RESETS, Keyed, ResumableCursor};
pub use dockets::{DocketCursor, DocketRepository, SeedSummary};
pub use error::{StoreError, TransientFault};
pub use views::ViewCursor;

/// Default number of rows fetched per cursor page.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Document-level pre-filter applied to every view query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentFilter {
    /// Only documents from this agency.
    pub agency: Option<String>,
    /// Only documents in this docket.
    pub docket_id: Option<String>,
}

/// Predicates selecting views.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewQuery {
    pub downloaded: Option<bool>,
    pub decoded: Option<DecodeStatus>,
    /// File-type restriction.
    pub file_type: Option<String>,
    pub filter: DocumentFilter,
}

impl ViewQuery {
    /// Views that still need to be fetched.
    #[must_use]
    pub fn pending_download() -> Self {
        Self {
            downloaded: Some(false),
            ..Self::default()
        }
    }

    /// Views that are downloaded but not yet decoded.
    #[must_use]
    pub fn pending_decode() -> Self {
        Self {
            downloaded: Some(true),
            decoded: Some(DecodeStatus::Pending),
            ..Self::default()
        }
    }

    /// Restricts the query to one file type.
    #[must_use]
    pub fn with_file_type(mut self, file_type: Option<String>) -> Self {
        self.file_type = file_type;
        self
    }

    /// Applies a document-level filter.
    #[must_use]
    pub fn with_filter(mut self, filter: DocumentFilter) -> Self {
        self.filter = filter;
        self
    }
}

/// Whether a query targets document views or attachment views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewScope {
    Documents,
    Attachments,
}

impl ViewScope {
    /// Human-readable label used in logs.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Documents => "document views",
            Self::Attachments => "attachment views",
        }
    }
}

/// A view together with the identities of its owners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewRecord {
    /// Store row id. Replaced whenever the view is updated.
    pub row_id: i64,
    pub document_id: String,
    /// Set when the view belongs to an attachment.
    pub attachment_id: Option<String>,
    pub view: View,
}

impl Keyed for ViewRecord {
    type Key = i64;

    fn key(&self) -> i64 {
        self.row_id
    }
}

/// SQLite-backed store handle. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Store {
    db: Database,
    page_size: u32,
}

impl Store {
    /// Creates a store over an open database.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self {
            db,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Sets how many rows each cursor page fetches.
    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Returns the underlying database.
    #[must_use]
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Rows fetched per cursor page.
    #[must_use]
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Opens a cursor over views of the given scope.
    #[must_use]
    pub fn find(&self, scope: ViewScope, query: &ViewQuery) -> ViewCursor {
        self.find_after(scope, query, None)
    }

    /// Opens a cursor over views of the given scope whose row id is greater
    /// than `after`.
    #[must_use]
    pub fn find_after(&self, scope: ViewScope, query: &ViewQuery, after: Option<i64>) -> ViewCursor {
        ViewCursor::new(
            self.db.clone(),
            scope,
            query.clone(),
            self.page_size,
            after.unwrap_or(0),
        )
    }

    /// Opens a cursor over document-level views.
    #[must_use]
    pub fn find_views(&self, query: &ViewQuery) -> ViewCursor {
        self.find(ViewScope::Documents, query)
    }

    /// Opens a cursor over attachment views.
    #[must_use]
    pub fn find_attachment_views(&self, query: &ViewQuery) -> ViewCursor {
        self.find(ViewScope::Attachments, query)
    }

    /// Persists a view back to whichever owner the record names.
    ///
    /// # Errors
    ///
    /// See [`Store::update_view`] and [`Store::update_attachment_view`].
    pub async fn update_record(&self, record: &ViewRecord) -> Result<(), StoreError> {
        match record.attachment_id.as_deref() {
            Some(attachment_id) => {
                self.update_attachment_view(&record.document_id, attachment_id, &record.view)
                    .await
            }
            None => self.update_view(&record.document_id, &record.view).await,
        }
    }
}
