//! Per-worker resources backed by the SQLite store and the HTTP client.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::client::{HttpScrapeClient, ScrapeClient};
use super::error::ScrapeError;
use super::supervisor::WorkerResources;
use crate::db::{Database, DatabaseOptions};
use crate::store::{DocketRepository, Store, StoreError};

/// Gives every worker its own single-connection database handle and its own
/// HTTP client.
#[derive(Debug, Clone)]
pub struct SqliteWorkerResources {
    database: PathBuf,
    page_size: u32,
    base_url: String,
    request_timeout: Duration,
}

impl SqliteWorkerResources {
    #[must_use]
    pub fn new(
        database: impl Into<PathBuf>,
        page_size: u32,
        base_url: impl Into<String>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            database: database.into(),
            page_size,
            base_url: base_url.into(),
            request_timeout,
        }
    }
}

#[async_trait]
impl WorkerResources for SqliteWorkerResources {
    async fn open_session(&self, worker: usize) -> Result<Box<dyn ScrapeClient>, ScrapeError> {
        debug!(worker, base_url = %self.base_url, "opening scrape session");
        Ok(Box::new(HttpScrapeClient::new(
            &self.base_url,
            self.request_timeout,
        )?))
    }

    async fn open_store(&self, worker: usize) -> Result<Box<dyn DocketRepository>, StoreError> {
        debug!(worker, database = %self.database.display(), "opening worker store");
        let options = DatabaseOptions::default().single_connection();
        let db = Database::new_with_options(&self.database, options)
            .await
            .map_err(|error| StoreError::Database(error.to_string()))?;
        Ok(Box::new(Store::new(db).with_page_size(self.page_size)))
    }
}
