//! Retry-supervised docket scraping on a fixed set of isolated workers.
//!
//! Each worker owns one remote session and one store handle, opened before
//! any work is handed out. A producer feeds pending dockets into a bounded
//! channel. Workers pull with a grace timeout and exit once the channel is
//! closed and drained, or once no work arrived within the grace period.
//!
//! Per docket, a worker makes up to `max_attempts` scrape calls. The first
//! success is saved as scraped; exhaustion saves the docket as failed with
//! the last error. Save failures are logged and the worker moves on. An
//! interrupt stops every worker and fails the run.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};

use super::client::ScrapeClient;
use super::error::{ScrapeError, SupervisorError};
use crate::model::DocketRecord;
use crate::store::{Cursor, DocketRepository, ResumableCursor, StoreError};

/// Default idle time after which a worker exits.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(5);

/// Default scrape attempts per docket.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Largest allowed worker count.
pub const MAX_WORKERS: usize = 64;

/// Queue slots per worker.
const QUEUE_SLOTS_PER_WORKER: usize = 3;

/// Opens the exclusive resources of one worker.
#[async_trait]
pub trait WorkerResources: Send + Sync {
    /// A fresh remote session for `worker`.
    async fn open_session(&self, worker: usize) -> Result<Box<dyn ScrapeClient>, ScrapeError>;

    /// A fresh store handle for `worker`.
    async fn open_store(&self, worker: usize) -> Result<Box<dyn DocketRepository>, StoreError>;
}

/// Counts from a scrape run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScrapeSummary {
    pub queued: usize,
    pub scraped: usize,
    pub failed: usize,
    /// Outcomes that could not be saved.
    pub unsaved: usize,
}

#[derive(Debug, Default)]
struct ScrapeStats {
    scraped: AtomicUsize,
    failed: AtomicUsize,
    unsaved: AtomicUsize,
}

/// Why a worker stopped before its queue ran dry.
#[derive(Debug)]
struct WorkerInterrupted;

#[derive(Clone)]
struct WorkerSettings {
    grace: Duration,
    max_attempts: u32,
    interrupted: Arc<AtomicBool>,
    stats: Arc<ScrapeStats>,
}

/// Runs docket scrapes on `workers` isolated workers.
#[derive(Debug, Clone)]
pub struct ScrapeSupervisor {
    workers: usize,
    grace: Duration,
    max_attempts: u32,
    interrupted: Arc<AtomicBool>,
}

impl ScrapeSupervisor {
    /// Creates a supervisor with default grace period and attempts.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::InvalidWorkers`] if `workers` is outside 1..=64.
    pub fn new(workers: usize) -> Result<Self, SupervisorError> {
        if !(1..=MAX_WORKERS).contains(&workers) {
            return Err(SupervisorError::InvalidWorkers { value: workers });
        }
        Ok(Self {
            workers,
            grace: DEFAULT_GRACE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            interrupted: Arc::new(AtomicBool::new(false)),
        })
    }

    #[must_use]
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Attempts per docket, clamped to at least 1.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Shares an interrupt flag, typically set from a Ctrl-C handler.
    #[must_use]
    pub fn with_interrupt_flag(mut self, interrupted: Arc<AtomicBool>) -> Self {
        self.interrupted = interrupted;
        self
    }

    /// The flag that stops the run when set.
    #[must_use]
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupted)
    }

    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Scrapes every pending docket in `repository`.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::Session`] or [`SupervisorError::WorkerStore`]
    /// if a worker cannot be equipped (no work is started in that case),
    /// [`SupervisorError::Store`] if the docket cursor fails beyond recovery,
    /// and [`SupervisorError::Interrupted`] if the run was interrupted.
    #[instrument(skip_all, fields(workers = self.workers))]
    pub async fn run<R, W>(
        &self,
        repository: &R,
        resources: &W,
    ) -> Result<ScrapeSummary, SupervisorError>
    where
        R: DocketRepository + ?Sized,
        W: WorkerResources + ?Sized,
    {
        let mut equipped = Vec::with_capacity(self.workers);
        for worker in 0..self.workers {
            let session = resources
                .open_session(worker)
                .await
                .map_err(|source| SupervisorError::Session { worker, source })?;
            let store = resources
                .open_store(worker)
                .await
                .map_err(|source| SupervisorError::WorkerStore { worker, source })?;
            equipped.push((session, store));
        }

        let (sender, receiver) = mpsc::channel(self.workers * QUEUE_SLOTS_PER_WORKER);
        let receiver = Arc::new(Mutex::new(receiver));
        let settings = WorkerSettings {
            grace: self.grace,
            max_attempts: self.max_attempts,
            interrupted: Arc::clone(&self.interrupted),
            stats: Arc::new(ScrapeStats::default()),
        };

        let mut workers = JoinSet::new();
        for (worker, (session, store)) in equipped.into_iter().enumerate() {
            workers.spawn(worker_loop(
                worker,
                session,
                store,
                Arc::clone(&receiver),
                settings.clone(),
            ));
        }
        // Workers hold the only receiver handles, so sends fail once all exit.
        drop(receiver);

        let produced = self.produce(repository, sender).await;

        let mut interrupted = false;
        while let Some(result) = workers.join_next().await {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(WorkerInterrupted)) => interrupted = true,
                Err(join_error) => error!(error = %join_error, "scrape worker panicked"),
            }
        }

        if interrupted || self.interrupted.load(Ordering::SeqCst) {
            warn!("scrape run interrupted");
            return Err(SupervisorError::Interrupted);
        }
        let queued = produced?;

        let summary = ScrapeSummary {
            queued,
            scraped: settings.stats.scraped.load(Ordering::SeqCst),
            failed: settings.stats.failed.load(Ordering::SeqCst),
            unsaved: settings.stats.unsaved.load(Ordering::SeqCst),
        };
        info!(
            queued = summary.queued,
            scraped = summary.scraped,
            failed = summary.failed,
            "scrape run finished"
        );
        Ok(summary)
    }

    /// Pushes pending dockets until the cursor is exhausted or every worker
    /// has gone away. Dropping `sender` closes the queue.
    async fn produce<R>(
        &self,
        repository: &R,
        sender: mpsc::Sender<DocketRecord>,
    ) -> Result<usize, StoreError>
    where
        R: DocketRepository + ?Sized,
    {
        let mut cursor = ResumableCursor::new(|after: Option<&String>| {
            repository.pending_dockets(after.map(String::as_str))
        });
        let mut queued = 0;

        while let Some(record) = cursor.next().await? {
            if self.interrupted.load(Ordering::SeqCst) {
                debug!("producer observed interrupt");
                break;
            }
            if sender.send(record).await.is_err() {
                warn!(queued, "all scrape workers exited; stopping producer");
                break;
            }
            queued += 1;
        }

        debug!(queued, resets = cursor.resets(), "producer finished");
        Ok(queued)
    }
}

async fn worker_loop(
    worker: usize,
    session: Box<dyn ScrapeClient>,
    store: Box<dyn DocketRepository>,
    receiver: Arc<Mutex<mpsc::Receiver<DocketRecord>>>,
    settings: WorkerSettings,
) -> Result<(), WorkerInterrupted> {
    debug!(worker, "scrape worker started");
    loop {
        if settings.interrupted.load(Ordering::SeqCst) {
            return Err(WorkerInterrupted);
        }

        let next = timeout(settings.grace, async { receiver.lock().await.recv().await }).await;
        let record = match next {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!(worker, "queue closed; worker exiting");
                return Ok(());
            }
            Err(_) => {
                debug!(worker, "no work within grace period; worker exiting");
                return Ok(());
            }
        };

        process_record(worker, &record, session.as_ref(), store.as_ref(), &settings).await?;
    }
}

async fn process_record(
    worker: usize,
    record: &DocketRecord,
    session: &dyn ScrapeClient,
    store: &dyn DocketRepository,
    settings: &WorkerSettings,
) -> Result<(), WorkerInterrupted> {
    let mut last_error = None;

    for attempt in 1..=settings.max_attempts {
        if settings.interrupted.load(Ordering::SeqCst) {
            return Err(WorkerInterrupted);
        }
        match session.scrape(&record.docket_id).await {
            Ok(payload) => {
                settings.stats.scraped.fetch_add(1, Ordering::SeqCst);
                info!(worker, docket_id = %record.docket_id, attempt, "docket scraped");
                save(store, &record.scraped_with(payload), settings).await;
                return Ok(());
            }
            Err(ScrapeError::Interrupted) => return Err(WorkerInterrupted),
            Err(error) => {
                warn!(
                    worker,
                    docket_id = %record.docket_id,
                    attempt,
                    max_attempts = settings.max_attempts,
                    error = %error,
                    "docket scrape attempt failed"
                );
                last_error = Some(error);
            }
        }
    }

    let reason = failure_reason(last_error.as_ref(), settings.max_attempts);
    settings.stats.failed.fetch_add(1, Ordering::SeqCst);
    warn!(worker, docket_id = %record.docket_id, reason, "docket scrape failed permanently");
    save(store, &record.failed_with(reason), settings).await;
    Ok(())
}

/// Reason stored on an exhausted docket; never empty.
fn failure_reason(last_error: Option<&ScrapeError>, max_attempts: u32) -> String {
    last_error
        .map(ToString::to_string)
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| format!("scrape failed after {max_attempts} attempts"))
}

async fn save(store: &dyn DocketRepository, record: &DocketRecord, settings: &WorkerSettings) {
    if let Err(error) = store.save_docket(record).await {
        settings.stats.unsaved.fetch_add(1, Ordering::SeqCst);
        error!(docket_id = %record.docket_id, error = %error, "failed to save docket");
    }
}
