//! Bulk concurrent downloader with per-item retry.
//!
//! The [`Downloader`] runs every [`DownloadRequest`] on a bounded
//! [`WorkerPool`]. Each request is retried independently up to the policy's
//! attempt budget and then reported exactly once through a
//! [`DownloadReporter`], which owns all persistence. The downloader keeps no
//! per-item state after reporting.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use regscrape_core::download::{
//!     DownloadOutcome, DownloadReporter, DownloadRequest, Downloader, HttpClient, RetryPolicy,
//! };
//!
//! struct Print;
//!
//! #[async_trait::async_trait]
//! impl DownloadReporter<()> for Print {
//!     async fn report(&self, outcome: DownloadOutcome<()>) {
//!         println!("{} -> {}", outcome.url, outcome.success);
//!     }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let downloader = Downloader::new(HttpClient::new()?, 5, RetryPolicy::default())?;
//! let items = vec![DownloadRequest::new("https://example.gov/a.pdf", "/tmp/a.pdf", ())];
//! let stats = downloader.bulk_download(items, Arc::new(Print)).await?;
//! println!("completed: {}", stats.completed());
//! # Ok(())
//! # }
//! ```

use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use super::retry::{FailureKind, RetryDecision, RetryPolicy, classify_error};
use super::{DownloadError, HttpClient};
use crate::pool::{MAX_POOL_SIZE, MIN_POOL_SIZE, PoolError, WorkerPool};

/// Errors from the engine itself; individual transfers never produce these.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The requested concurrency is outside the pool's bounds.
    #[error("download concurrency {value} is outside {MIN_POOL_SIZE}..={MAX_POOL_SIZE}")]
    InvalidConcurrency { value: usize },

    /// The worker pool could not be created or was closed.
    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// One item to fetch.
#[derive(Debug, Clone)]
pub struct DownloadRequest<R> {
    /// Absolute http(s) url to fetch.
    pub url: String,
    /// File the body is streamed to; replaced if it exists.
    pub destination: PathBuf,
    /// Opaque caller context handed back in the outcome.
    pub record: R,
}

impl<R> DownloadRequest<R> {
    /// Creates a request.
    pub fn new(url: impl Into<String>, destination: impl Into<PathBuf>, record: R) -> Self {
        Self {
            url: url.into(),
            destination: destination.into(),
            record,
        }
    }
}

/// Final result of one request, delivered once to the reporter.
#[derive(Debug, Clone)]
pub struct DownloadOutcome<R> {
    /// Whether the final attempt produced a file of at least the minimum size.
    pub success: bool,
    /// Failure description; `None` on success.
    pub message: Option<String>,
    /// Failure classification; `None` on success.
    pub failure: Option<FailureKind>,
    /// Bytes written by the successful attempt (0 on failure).
    pub size: u64,
    /// Attempts made.
    pub attempts: u32,
    /// Url from the request.
    pub url: String,
    /// Destination from the request. Holds the file only on success.
    pub destination: PathBuf,
    /// Caller context from the request.
    pub record: R,
}

/// Receives the terminal outcome of every download.
#[async_trait]
pub trait DownloadReporter<R>: Send + Sync {
    /// Called exactly once per request.
    async fn report(&self, outcome: DownloadOutcome<R>);
}

/// Per-batch counters, updated by concurrent transfer tasks.
#[derive(Debug, Default)]
pub struct DownloadStats {
    completed: AtomicUsize,
    failed: AtomicUsize,
    retried: AtomicUsize,
}

impl DownloadStats {
    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Requests reported so far.
    #[must_use]
    pub fn total(&self) -> usize {
        self.completed() + self.failed()
    }

    /// Attempts beyond the first, across all requests.
    #[must_use]
    pub fn retried(&self) -> usize {
        self.retried.load(Ordering::SeqCst)
    }

    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
    }

    fn snapshot(&self) -> Self {
        Self {
            completed: AtomicUsize::new(self.completed()),
            failed: AtomicUsize::new(self.failed()),
            retried: AtomicUsize::new(self.retried()),
        }
    }
}

/// Bulk downloader configuration. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: HttpClient,
    concurrency: usize,
    retry_policy: RetryPolicy,
    min_size: u64,
}

impl Downloader {
    /// Creates a downloader running at most `concurrency` transfers at once.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] if the value is outside 1..=100.
    #[instrument(level = "debug", skip(client, retry_policy))]
    pub fn new(
        client: HttpClient,
        concurrency: usize,
        retry_policy: RetryPolicy,
    ) -> Result<Self, EngineError> {
        if !(MIN_POOL_SIZE..=MAX_POOL_SIZE).contains(&concurrency) {
            return Err(EngineError::InvalidConcurrency { value: concurrency });
        }
        debug!(
            concurrency,
            max_attempts = retry_policy.max_attempts(),
            "creating downloader"
        );
        Ok(Self {
            client,
            concurrency,
            retry_policy,
            min_size: 0,
        })
    }

    /// Requires every successful transfer to produce at least `min_size` bytes.
    #[must_use]
    pub fn with_min_size(mut self, min_size: u64) -> Self {
        self.min_size = min_size;
        self
    }

    /// Returns the configured concurrency limit.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Returns the configured retry policy.
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Returns the configured minimum size.
    #[must_use]
    pub fn min_size(&self) -> u64 {
        self.min_size
    }

    /// Opens a batch that accepts requests one at a time.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Pool`] if the worker pool cannot be created.
    pub fn start<R, P>(&self, reporter: Arc<P>) -> Result<DownloadBatch<R, P>, EngineError>
    where
        R: Send + 'static,
        P: DownloadReporter<R> + 'static,
    {
        Ok(DownloadBatch {
            pool: WorkerPool::new(self.concurrency)?,
            downloader: self.clone(),
            reporter,
            stats: Arc::new(DownloadStats::default()),
            _record: PhantomData,
        })
    }

    /// Downloads every item and waits for all reports to be delivered.
    ///
    /// Individual download failures do not fail the batch; they are reported.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] only if the worker pool itself fails.
    #[instrument(skip_all, fields(concurrency = self.concurrency))]
    pub async fn bulk_download<R, P, I>(
        &self,
        items: I,
        reporter: Arc<P>,
    ) -> Result<DownloadStats, EngineError>
    where
        R: Send + 'static,
        P: DownloadReporter<R> + 'static,
        I: IntoIterator<Item = DownloadRequest<R>>,
    {
        let mut batch = self.start(reporter)?;
        for request in items {
            batch.push(request).await?;
        }
        Ok(batch.finish().await)
    }
}

/// An in-progress bulk download.
pub struct DownloadBatch<R, P> {
    pool: WorkerPool,
    downloader: Downloader,
    reporter: Arc<P>,
    stats: Arc<DownloadStats>,
    _record: PhantomData<fn(R)>,
}

impl<R, P> DownloadBatch<R, P>
where
    R: Send + 'static,
    P: DownloadReporter<R> + 'static,
{
    /// Schedules one request, waiting while the pool is saturated.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Pool`] if the pool was closed.
    pub async fn push(&mut self, request: DownloadRequest<R>) -> Result<(), EngineError> {
        let client = self.downloader.client.clone();
        let policy = self.downloader.retry_policy.clone();
        let min_size = self.downloader.min_size;
        let reporter = Arc::clone(&self.reporter);
        let stats = Arc::clone(&self.stats);

        self.pool
            .submit(async move {
                let outcome = download_with_retry(&client, request, &policy, min_size, &stats).await;
                reporter.report(outcome).await;
            })
            .await?;
        Ok(())
    }

    /// Waits for every scheduled request to be reported.
    pub async fn finish(mut self) -> DownloadStats {
        self.pool.join().await;

        let stats = Arc::try_unwrap(self.stats).unwrap_or_else(|shared| shared.snapshot());
        info!(
            completed = stats.completed(),
            failed = stats.failed(),
            retried = stats.retried(),
            total = stats.total(),
            "bulk download complete"
        );
        stats
    }
}

/// Runs attempts for one request until success or the policy gives up.
#[instrument(skip_all, fields(url = %request.url))]
async fn download_with_retry<R>(
    client: &HttpClient,
    request: DownloadRequest<R>,
    policy: &RetryPolicy,
    min_size: u64,
    stats: &DownloadStats,
) -> DownloadOutcome<R> {
    let DownloadRequest {
        url,
        destination,
        record,
    } = request;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        debug!(attempt, "attempting download");

        let error = match client.download_to_path(&url, &destination).await {
            Ok(size) if size >= min_size => {
                info!(%url, size, attempt, "downloaded");
                DownloadStats::bump(&stats.completed);
                return DownloadOutcome {
                    success: true,
                    message: None,
                    failure: None,
                    size,
                    attempts: attempt,
                    url,
                    destination,
                    record,
                };
            }
            Ok(size) => {
                if let Err(error) = tokio::fs::remove_file(&destination).await {
                    debug!(error = %error, "undersized file already gone");
                }
                DownloadError::size_too_small(&url, size, min_size)
            }
            Err(error) => error,
        };

        let kind = classify_error(&error);
        match policy.should_retry(kind, attempt) {
            RetryDecision::Retry { delay, .. } => {
                debug!(%kind, error = %error, delay_ms = delay.as_millis(), "retrying download");
                DownloadStats::bump(&stats.retried);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
            RetryDecision::DoNotRetry { reason } => {
                warn!(%url, %kind, error = %error, attempts = attempt, %reason, "download failed");
                DownloadStats::bump(&stats.failed);
                return DownloadOutcome {
                    success: false,
                    message: Some(error.to_string()),
                    failure: Some(kind),
                    size: 0,
                    attempts: attempt,
                    url,
                    destination,
                    record,
                };
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn client() -> HttpClient {
        HttpClient::new().unwrap()
    }

    #[test]
    fn test_downloader_new_valid_concurrency() {
        assert_eq!(
            Downloader::new(client(), 1, RetryPolicy::default())
                .unwrap()
                .concurrency(),
            1
        );
        assert_eq!(
            Downloader::new(client(), 100, RetryPolicy::default())
                .unwrap()
                .concurrency(),
            100
        );
    }

    #[test]
    fn test_downloader_new_invalid_concurrency() {
        assert!(matches!(
            Downloader::new(client(), 0, RetryPolicy::default()),
            Err(EngineError::InvalidConcurrency { value: 0 })
        ));
        assert!(matches!(
            Downloader::new(client(), 101, RetryPolicy::default()),
            Err(EngineError::InvalidConcurrency { value: 101 })
        ));
    }

    #[test]
    fn test_downloader_keeps_settings() {
        let downloader = Downloader::new(client(), 5, RetryPolicy::with_max_attempts(4))
            .unwrap()
            .with_min_size(512);
        assert_eq!(downloader.retry_policy().max_attempts(), 4);
        assert_eq!(downloader.min_size(), 512);
    }

    #[test]
    fn test_download_stats_increment() {
        let stats = DownloadStats::default();
        DownloadStats::bump(&stats.completed);
        DownloadStats::bump(&stats.completed);
        DownloadStats::bump(&stats.failed);
        DownloadStats::bump(&stats.retried);

        assert_eq!(stats.completed(), 2);
        assert_eq!(stats.failed(), 1);
        assert_eq!(stats.retried(), 1);
        assert_eq!(stats.total(), 3);

        let copy = stats.snapshot();
        assert_eq!(copy.total(), 3);
    }

    #[test]
    fn test_engine_error_display() {
        let msg = EngineError::InvalidConcurrency { value: 0 }.to_string();
        assert_eq!(msg, "download concurrency 0 is outside 1..=100");
    }
}
