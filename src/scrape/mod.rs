//! Docket scraping against the remote portal.
//!
//! - [`ScrapeClient`] / [`HttpScrapeClient`]: one session fetching docket metadata
//! - [`ScrapeSupervisor`]: fixed worker set with per-docket retry and failure recording
//! - [`SqliteWorkerResources`]: opens each worker's exclusive session and store

mod client;
mod error;
mod resources;
mod supervisor;

pub use client::{HttpScrapeClient, ScrapeClient};
pub use error::{ScrapeError, SupervisorError};
pub use resources::SqliteWorkerResources;
pub use supervisor::{
    DEFAULT_GRACE, DEFAULT_MAX_ATTEMPTS, MAX_WORKERS, ScrapeSummary, ScrapeSupervisor,
    WorkerResources,
};
