//! Decode command handler.

use std::sync::Arc;

use anyhow::Result;
use regscrape_core::{DecodePass, DecoderRegistry, PipelineConfig};
use tracing::info;

use super::{effective_filter, open_store};
use crate::cli::DecodeArgs;

pub async fn run_decode_command(mut config: PipelineConfig, args: &DecodeArgs) -> Result<()> {
    if let Some(concurrency) = args.concurrency {
        config.decode.concurrency = usize::from(concurrency);
    }
    if let Some(timeout) = args.timeout {
        config.decode.timeout_secs = timeout;
    }
    if args.no_ocr {
        config.decode.ocr = false;
    }
    config.validate()?;

    let store = open_store(&config).await?;
    let registry = Arc::new(DecoderRegistry::with_defaults(&config.decode));

    let summary = DecodePass::new(store, registry)
        .with_concurrency(config.decode.concurrency)
        .with_file_type(args.pass.file_type.clone())
        .with_filter(effective_filter(&config, &args.pass))
        .dry_run(args.pass.dry_run)
        .run()
        .await?;

    info!(
        decoded = summary.decoded,
        failed = summary.failed,
        ocr = summary.ocr,
        unsaved = summary.unsaved,
        "Decode complete"
    );
    Ok(())
}
