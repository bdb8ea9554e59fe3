//! Fetching views from the portal.
//!
//! [`HttpClient`] streams one url to disk. [`Downloader`] runs many requests
//! on a bounded pool, retrying each per its [`RetryPolicy`] and enforcing a
//! minimum file size. [`DownloadPass`] feeds it every not-yet-downloaded view
//! from the store and records the outcomes.
//!
//! ```no_run
//! use regscrape_core::download::HttpClient;
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpClient::new()?;
//! let size = client
//!     .download_to_path(
//!         "https://downloads.regulations.gov/EPA-HQ-OAR-2010-0001-0002/content.pdf",
//!         Path::new("downloads/0900006480a1.pdf"),
//!     )
//!     .await?;
//! println!("{size} bytes");
//! # Ok(())
//! # }
//! ```

mod client;
pub mod constants;
mod engine;
mod error;
mod pass;
mod retry;

pub use client::HttpClient;
pub use engine::{
    DownloadBatch, DownloadOutcome, DownloadReporter, DownloadRequest, DownloadStats, Downloader,
    EngineError,
};
pub use error::DownloadError;
pub use pass::{DownloadPass, DownloadPassError, DownloadPassSummary, destination_for};
pub use retry::{DEFAULT_MAX_RETRIES, FailureKind, RetryDecision, RetryPolicy, classify_error};
