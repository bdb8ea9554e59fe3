//! Download pass: fetch every view that is not yet downloaded.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use super::engine::{
    DownloadBatch, DownloadOutcome, DownloadReporter, DownloadRequest, Downloader, EngineError,
};
use crate::model::View;
use crate::store::{
    Cursor, DocumentFilter, ResumableCursor, Store, StoreError, ViewQuery, ViewRecord, ViewScope,
};

/// Errors that abort a download pass.
#[derive(Debug, thiserror::Error)]
pub enum DownloadPassError {
    /// The view cursor failed beyond recovery.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The download engine failed.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Per-scope counts from a download pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadPassSummary {
    pub completed: usize,
    pub failed: usize,
    pub retried: usize,
    /// Views that could not be scheduled (no object id).
    pub skipped: usize,
}

/// Persists successful downloads back onto their views.
struct ViewDownloadReporter {
    store: Store,
    dry_run: bool,
}

#[async_trait]
impl DownloadReporter<ViewRecord> for ViewDownloadReporter {
    async fn report(&self, outcome: DownloadOutcome<ViewRecord>) {
        if !outcome.success {
            warn!(
                url = %outcome.url,
                document_id = %outcome.record.document_id,
                message = outcome.message.as_deref().unwrap_or_default(),
                "view download failed"
            );
            return;
        }

        let mut record = outcome.record;
        record.view.mark_downloaded(outcome.destination);
        if self.dry_run {
            info!(url = %outcome.url, size = outcome.size, "dry run; not saving view");
            return;
        }
        if let Err(error) = self.store.update_record(&record).await {
            warn!(url = %outcome.url, error = %error, "failed to save downloaded view");
        }
    }
}

/// Drives the downloader over the store's download backlog.
#[derive(Debug, Clone)]
pub struct DownloadPass {
    store: Store,
    downloader: Downloader,
    download_dir: PathBuf,
    file_type: Option<String>,
    filter: DocumentFilter,
    dry_run: bool,
}

impl DownloadPass {
    /// Creates a pass writing files under `download_dir`.
    #[must_use]
    pub fn new(store: Store, downloader: Downloader, download_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            downloader,
            download_dir: download_dir.into(),
            file_type: None,
            filter: DocumentFilter::default(),
            dry_run: false,
        }
    }

    /// Restricts the pass to one file type.
    #[must_use]
    pub fn with_file_type(mut self, file_type: Option<String>) -> Self {
        self.file_type = file_type;
        self
    }

    /// Restricts the pass to matching documents.
    #[must_use]
    pub fn with_filter(mut self, filter: DocumentFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Downloads without saving any view state.
    #[must_use]
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Downloads document views, then attachment views.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadPassError`] if the store cursor fails beyond recovery
    /// or the worker pool fails. Per-view failures are logged only.
    #[instrument(skip(self), fields(dry_run = self.dry_run))]
    pub async fn run(&self) -> Result<DownloadPassSummary, DownloadPassError> {
        let mut summary = DownloadPassSummary::default();
        for scope in [ViewScope::Documents, ViewScope::Attachments] {
            let scoped = self.run_scope(scope).await?;
            summary.completed += scoped.completed;
            summary.failed += scoped.failed;
            summary.retried += scoped.retried;
            summary.skipped += scoped.skipped;
        }
        Ok(summary)
    }

    async fn run_scope(&self, scope: ViewScope) -> Result<DownloadPassSummary, DownloadPassError> {
        let query = ViewQuery::pending_download()
            .with_file_type(self.file_type.clone())
            .with_filter(self.filter.clone());
        let reporter = Arc::new(ViewDownloadReporter {
            store: self.store.clone(),
            dry_run: self.dry_run,
        });

        let mut batch = self.downloader.start(reporter)?;
        let mut cursor = ResumableCursor::new(|after: Option<&i64>| {
            self.store.find_after(scope, &query, after.copied())
        });
        let skipped = self.dispatch(&mut cursor, &mut batch).await?;

        let stats = batch.finish().await;
        info!(
            scope = scope.label(),
            completed = stats.completed(),
            failed = stats.failed(),
            skipped,
            "download pass finished"
        );
        Ok(DownloadPassSummary {
            completed: stats.completed(),
            failed: stats.failed(),
            retried: stats.retried(),
            skipped,
        })
    }

    /// Schedules every view the cursor yields. Returns how many views were
    /// skipped for lack of an object id.
    async fn dispatch<C, P>(
        &self,
        cursor: &mut C,
        batch: &mut DownloadBatch<ViewRecord, P>,
    ) -> Result<usize, DownloadPassError>
    where
        C: Cursor<Item = ViewRecord>,
        P: DownloadReporter<ViewRecord> + 'static,
    {
        let mut skipped = 0;
        while let Some(record) = cursor.next().await? {
            let Some(destination) = destination_for(&self.download_dir, &record.view) else {
                warn!(url = %record.view.url, "view has no object id; skipping");
                skipped += 1;
                continue;
            };
            let url = record.view.url.clone();
            batch
                .push(DownloadRequest::new(url, destination, record))
                .await?;
        }
        Ok(skipped)
    }
}

/// `<download_dir>/<object_id>.<file_type>`.
#[must_use]
pub fn destination_for(download_dir: &Path, view: &View) -> Option<PathBuf> {
    let object_id = view.object_id.as_deref().filter(|id| !id.is_empty())?;
    Some(download_dir.join(format!("{object_id}.{}", view.file_type)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use wiremock::matchers::method;
    use wiremock::{Mock, ResponseTemplate};

    use super::*;
    use crate::db::Database;
    use crate::download::{HttpClient, RetryPolicy};
    use crate::model::Document;
    use crate::test_support::FaultAfter;
    use crate::test_support::socket_guard::start_mock_server_or_skip;

    /// Records every url it is told about and saves nothing.
    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    #[async_trait]
    impl DownloadReporter<ViewRecord> for Recorder {
        async fn report(&self, outcome: DownloadOutcome<ViewRecord>) {
            self.0.lock().unwrap().push(outcome.url);
        }
    }

    #[test]
    fn test_destination_uses_object_id_and_type() {
        let view = View::new("u", "pdf").with_object_id("0900006480a1");
        assert_eq!(
            destination_for(Path::new("/data"), &view),
            Some(PathBuf::from("/data/0900006480a1.pdf"))
        );
    }

    #[test]
    fn test_destination_requires_object_id() {
        assert_eq!(destination_for(Path::new("/data"), &View::new("u", "pdf")), None);
    }

    #[tokio::test]
    async fn test_transient_fault_does_not_dispatch_a_view_twice() {
        let Some(server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.4".to_vec()))
            .mount(&server)
            .await;

        let store = Store::new(Database::new_in_memory().await.unwrap()).with_page_size(2);
        let mut document = Document::new("D-1");
        document.views = (0..5)
            .map(|n| View::new(format!("{}/u{n}", server.uri()), "pdf").with_object_id(format!("obj{n}")))
            .collect();
        store.insert_document(&document).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let downloader = Downloader::new(HttpClient::new().unwrap(), 2, RetryPolicy::immediate(1)).unwrap();
        let pass = DownloadPass::new(store.clone(), downloader.clone(), dir.path());
        let recorder = Arc::new(Recorder::default());
        let mut batch = downloader.start(Arc::clone(&recorder)).unwrap();

        let query = ViewQuery::pending_download();
        let mut cursor = ResumableCursor::new(|after: Option<&i64>| {
            FaultAfter::new(
                store.find_after(ViewScope::Documents, &query, after.copied()),
                after.is_none().then_some(3),
            )
        });
        let skipped = pass.dispatch(&mut cursor, &mut batch).await.unwrap();
        let stats = batch.finish().await;

        assert_eq!(skipped, 0);
        assert_eq!(cursor.resets(), 1);
        assert_eq!(stats.completed(), 5);
        let mut urls = recorder.0.lock().unwrap().clone();
        urls.sort();
        urls.dedup();
        assert_eq!(urls.len(), 5);
        assert_eq!(server.received_requests().await.unwrap().len(), 5);
    }
}
