//! Download command handler.

use anyhow::{Context, Result};
use regscrape_core::{DownloadPass, Downloader, HttpClient, PipelineConfig, RetryPolicy};
use tracing::info;

use super::{effective_filter, open_store};
use crate::cli::DownloadArgs;

/// Applies CLI overrides to the download section.
pub(crate) fn apply_download_overrides(config: &mut PipelineConfig, args: &DownloadArgs) {
    if let Some(concurrency) = args.concurrency {
        config.download.concurrency = usize::from(concurrency);
    }
    if let Some(retries) = args.retries {
        config.download.retries = retries;
    }
    if let Some(min_size) = args.min_size {
        config.download.min_size = min_size;
    }
    if let Some(dir) = &args.download_dir {
        config.download.directory.clone_from(dir);
    }
}

pub async fn run_download_command(mut config: PipelineConfig, args: &DownloadArgs) -> Result<()> {
    apply_download_overrides(&mut config, args);
    config.validate()?;
    let settings = &config.download;

    let store = open_store(&config).await?;
    let client = HttpClient::new_with_timeouts(
        settings.connect_timeout_secs,
        settings.read_timeout_secs,
    )
    .context("Failed to build HTTP client")?;
    let downloader = Downloader::new(
        client,
        settings.concurrency,
        RetryPolicy::with_max_attempts(settings.retries),
    )?
    .with_min_size(settings.min_size);

    let summary = DownloadPass::new(store, downloader, settings.directory.clone())
        .with_file_type(args.pass.file_type.clone())
        .with_filter(effective_filter(&config, &args.pass))
        .dry_run(args.pass.dry_run)
        .run()
        .await?;

    info!(
        completed = summary.completed,
        failed = summary.failed,
        retried = summary.retried,
        skipped = summary.skipped,
        "Download complete"
    );
    Ok(())
}
