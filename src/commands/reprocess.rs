//! Reprocess command handler: reset failed decodes.

use anyhow::Result;
use regscrape_core::PipelineConfig;
use tracing::info;

use super::open_store;
use crate::cli::ReprocessArgs;

pub async fn run_reprocess_command(config: PipelineConfig, args: &ReprocessArgs) -> Result<()> {
    let store = open_store(&config).await?;
    let reset = store.reset_failed_views(args.file_type.as_deref()).await?;
    info!(reset, file_type = args.file_type.as_deref(), "Failed views reset for decoding");
    Ok(())
}
