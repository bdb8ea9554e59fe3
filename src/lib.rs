//! regscrape core library
//!
//! Acquisition-and-extraction pipeline for regulatory filings: documents and
//! their views are downloaded on a bounded worker pool with retry, decoded to
//! text through per-file-type fallback chains of external programs (with OCR
//! as the last resort for scanned PDFs), and docket metadata is scraped by a
//! retry-supervised set of isolated workers.
//!
//! # Architecture
//!
//! - [`config`] - Pipeline configuration (defaults, TOML file, validation)
//! - [`db`] - Database connection and schema management
//! - [`model`] - Documents, views, and docket records
//! - [`store`] - View and docket persistence with resumable cursors
//! - [`pool`] - Bounded worker pool
//! - [`download`] - Streaming HTTP downloads with retry and size checks
//! - [`decode`] - Text extraction: decoders, OCR, and chain registry
//! - [`scrape`] - Remote docket client and scrape supervisor

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod db;
pub mod decode;
pub mod download;
pub mod model;
pub mod pool;
pub mod scrape;
pub mod store;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use config::{ConfigError, LoadedConfig, PipelineConfig};
pub use db::{Database, DatabaseOptions};
pub use decode::{
    BinaryDecoder, DecodeError, DecodePass, DecodePassSummary, Decoder, DecoderRegistry,
    OcrDecoder, OutputKind,
};
pub use download::{
    DEFAULT_MAX_RETRIES, DownloadError, DownloadOutcome, DownloadPass, DownloadReporter,
    DownloadRequest, DownloadStats, Downloader, EngineError, FailureKind, HttpClient, RetryPolicy,
};
pub use model::{Attachment, DecodeStatus, DocketRecord, Document, ScrapeStatus, View};
pub use pool::{PoolError, WorkerPool};
pub use scrape::{
    HttpScrapeClient, ScrapeClient, ScrapeError, ScrapeSupervisor, SqliteWorkerResources,
    SupervisorError, WorkerResources,
};
pub use store::{
    Cursor, DocketRepository, DocumentFilter, Keyed, ResumableCursor, Store, StoreError,
    ViewQuery, ViewRecord, ViewScope,
};
