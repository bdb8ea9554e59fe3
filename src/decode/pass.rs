//! Decode pass: extract text from every downloaded, undecoded view.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{info, instrument, warn};

use super::registry::DecoderRegistry;
use crate::model::DecodeStatus;
use crate::pool::{PoolError, WorkerPool};
use crate::store::{
    Cursor, DocumentFilter, ResumableCursor, Store, StoreError, ViewQuery, ViewRecord, ViewScope,
};

/// Default number of concurrent decodes.
pub const DEFAULT_DECODE_CONCURRENCY: usize = 2;

/// Errors that abort a decode pass.
#[derive(Debug, thiserror::Error)]
pub enum DecodePassError {
    /// The view cursor failed beyond recovery.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The worker pool could not be created or closed.
    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Counts from a decode pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodePassSummary {
    pub decoded: usize,
    pub failed: usize,
    /// Decoded views whose text came from OCR.
    pub ocr: usize,
    /// Views whose state could not be saved.
    pub unsaved: usize,
    /// Tasks that panicked.
    pub panicked: usize,
}

#[derive(Debug, Default)]
struct DecodeStats {
    decoded: AtomicUsize,
    failed: AtomicUsize,
    ocr: AtomicUsize,
    unsaved: AtomicUsize,
}

impl DecodeStats {
    fn summary(&self, panicked: usize) -> DecodePassSummary {
        DecodePassSummary {
            decoded: self.decoded.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            ocr: self.ocr.load(Ordering::SeqCst),
            unsaved: self.unsaved.load(Ordering::SeqCst),
            panicked,
        }
    }
}

/// Runs the decoder registry over the store's decode backlog.
#[derive(Debug, Clone)]
pub struct DecodePass {
    store: Store,
    registry: Arc<DecoderRegistry>,
    concurrency: usize,
    file_type: Option<String>,
    filter: DocumentFilter,
    dry_run: bool,
}

impl DecodePass {
    #[must_use]
    pub fn new(store: Store, registry: Arc<DecoderRegistry>) -> Self {
        Self {
            store,
            registry,
            concurrency: DEFAULT_DECODE_CONCURRENCY,
            file_type: None,
            filter: DocumentFilter::default(),
            dry_run: false,
        }
    }

    /// Number of decodes run at once.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    #[must_use]
    pub fn with_file_type(mut self, file_type: Option<String>) -> Self {
        self.file_type = file_type;
        self
    }

    #[must_use]
    pub fn with_filter(mut self, filter: DocumentFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Decodes without saving any view state.
    #[must_use]
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Decodes document views, then attachment views.
    ///
    /// Each scope is drained before the next one starts.
    ///
    /// # Errors
    ///
    /// Returns [`DecodePassError`] if the cursor fails beyond recovery or the
    /// pool size is invalid. Per-view failures end up as view state.
    #[instrument(skip(self), fields(concurrency = self.concurrency, dry_run = self.dry_run))]
    pub async fn run(&self) -> Result<DecodePassSummary, DecodePassError> {
        let mut pool = WorkerPool::new(self.concurrency)?;
        let stats = Arc::new(DecodeStats::default());
        let mut panicked = 0;

        for scope in [ViewScope::Documents, ViewScope::Attachments] {
            let query = ViewQuery::pending_decode()
                .with_file_type(self.file_type.clone())
                .with_filter(self.filter.clone());
            let mut cursor = ResumableCursor::new(|after: Option<&i64>| {
                self.store.find_after(scope, &query, after.copied())
            });
            let submitted = self.dispatch(&mut cursor, &mut pool, &stats).await?;

            let joined = pool.join().await;
            panicked += joined.panicked;
            info!(scope = scope.label(), submitted, "decode scope finished");
        }

        let summary = stats.summary(panicked);
        info!(
            decoded = summary.decoded,
            failed = summary.failed,
            ocr = summary.ocr,
            "decode pass finished"
        );
        Ok(summary)
    }

    /// Submits one decode task per view the cursor yields.
    async fn dispatch<C>(
        &self,
        cursor: &mut C,
        pool: &mut WorkerPool,
        stats: &Arc<DecodeStats>,
    ) -> Result<usize, DecodePassError>
    where
        C: Cursor<Item = ViewRecord>,
    {
        let mut submitted = 0usize;
        while let Some(mut record) = cursor.next().await? {
            let store = self.store.clone();
            let registry = Arc::clone(&self.registry);
            let stats = Arc::clone(stats);
            let dry_run = self.dry_run;
            submitted += 1;

            pool.submit(async move {
                record.view = registry.decode_view(record.view).await;
                match record.view.decoded {
                    DecodeStatus::Success => {
                        stats.decoded.fetch_add(1, Ordering::SeqCst);
                        if record.view.ocr {
                            stats.ocr.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                    _ => {
                        stats.failed.fetch_add(1, Ordering::SeqCst);
                    }
                }
                if dry_run {
                    info!(
                        url = %record.view.url,
                        status = %record.view.decoded,
                        "dry run; not saving view"
                    );
                    return;
                }
                if let Err(error) = store.update_record(&record).await {
                    stats.unsaved.fetch_add(1, Ordering::SeqCst);
                    warn!(url = %record.view.url, error = %error, "failed to save decoded view");
                }
            })
            .await?;
        }
        Ok(submitted)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::db::Database;
    use crate::decode::{DecodeError, Decoder};
    use crate::model::{Document, View};
    use crate::test_support::FaultAfter;

    /// Counts how often each file is decoded.
    #[derive(Debug, Default)]
    struct Tally(Mutex<HashMap<PathBuf, usize>>);

    #[async_trait]
    impl Decoder for Tally {
        fn name(&self) -> &str {
            "tally"
        }

        async fn decode(&self, path: &Path) -> Result<String, DecodeError> {
            *self.0.lock().unwrap().entry(path.to_path_buf()).or_insert(0) += 1;
            Ok(format!("text of {}", path.display()))
        }
    }

    #[tokio::test]
    async fn test_transient_fault_does_not_dispatch_a_view_twice() {
        let store = Store::new(Database::new_in_memory().await.unwrap()).with_page_size(2);
        let mut document = Document::new("D-1");
        document.views = (0..5)
            .map(|n| {
                let mut view = View::new(format!("u{n}"), "txt");
                view.mark_downloaded(PathBuf::from(format!("/data/u{n}.txt")));
                view
            })
            .collect();
        store.insert_document(&document).await.unwrap();

        let tally = Arc::new(Tally::default());
        let mut registry = DecoderRegistry::new();
        registry.register("txt", vec![Arc::clone(&tally) as Arc<dyn Decoder>]);
        // Dry run keeps every view pending, so a restart from the first row
        // would hand u0..u2 out again.
        let pass = DecodePass::new(store.clone(), Arc::new(registry)).dry_run(true);

        let query = ViewQuery::pending_decode();
        let mut cursor = ResumableCursor::new(|after: Option<&i64>| {
            FaultAfter::new(
                store.find_after(ViewScope::Documents, &query, after.copied()),
                after.is_none().then_some(3),
            )
        });
        let mut pool = WorkerPool::new(2).unwrap();
        let stats = Arc::new(DecodeStats::default());

        let submitted = pass.dispatch(&mut cursor, &mut pool, &stats).await.unwrap();
        assert_eq!(pool.join().await.panicked, 0);

        assert_eq!(cursor.resets(), 1);
        assert_eq!(submitted, 5);
        assert_eq!(stats.summary(0).decoded, 5);
        let calls = tally.0.lock().unwrap();
        assert_eq!(calls.len(), 5);
        assert!(calls.values().all(|&count| count == 1));
    }
}
