//! CLI command handlers.

mod decode;
mod dockets;
mod download;
mod reprocess;

use anyhow::{Context, Result};
use regscrape_core::{Database, DocumentFilter, PipelineConfig, Store};
use tracing::debug;

use crate::cli::PassArgs;

pub use decode::run_decode_command;
pub use dockets::{run_create_dockets_command, run_scrape_dockets_command};
pub use download::run_download_command;
pub use reprocess::run_reprocess_command;

/// Opens the configured database and wraps it in a store.
pub(crate) async fn open_store(config: &PipelineConfig) -> Result<Store> {
    let path = &config.store.database;
    debug!(path = %path.display(), "opening store");
    let db = Database::new(path)
        .await
        .with_context(|| format!("Failed to open database '{}'", path.display()))?;
    Ok(Store::new(db).with_page_size(config.store.page_size))
}

/// The config filter with any CLI restrictions layered on top.
pub(crate) fn effective_filter(config: &PipelineConfig, args: &PassArgs) -> DocumentFilter {
    let mut filter = config.filter.clone();
    if let Some(agency) = &args.agency {
        filter.agency = Some(agency.clone());
    }
    if let Some(docket) = &args.docket {
        filter.docket_id = Some(docket.clone());
    }
    filter
}
