//! Docket command handlers: seeding and supervised scraping.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use anyhow::Result;
use regscrape_core::{PipelineConfig, ScrapeSupervisor, SqliteWorkerResources};
use tracing::info;

use super::open_store;
use crate::cli::ScrapeArgs;

pub async fn run_create_dockets_command(config: PipelineConfig) -> Result<()> {
    let store = open_store(&config).await?;
    let summary = store.create_dockets().await?;
    println!(
        "Iterated over {} dockets, of which {} were new.",
        summary.total, summary.new
    );
    Ok(())
}

pub async fn run_scrape_dockets_command(
    mut config: PipelineConfig,
    args: &ScrapeArgs,
    interrupted: Arc<AtomicBool>,
) -> Result<()> {
    if let Some(workers) = args.workers {
        config.scrape.workers = usize::from(workers);
    }
    if let Some(base_url) = &args.base_url {
        config.scrape.base_url.clone_from(base_url);
    }
    config.validate()?;
    let settings = &config.scrape;

    let store = open_store(&config).await?;
    let resources = SqliteWorkerResources::new(
        config.store.database.clone(),
        config.store.page_size,
        settings.base_url.clone(),
        Duration::from_secs(settings.request_timeout_secs),
    );
    let supervisor = ScrapeSupervisor::new(settings.workers)?
        .with_grace(Duration::from_secs(settings.grace_secs))
        .with_max_attempts(settings.max_attempts)
        .with_interrupt_flag(interrupted);

    info!(workers = supervisor.workers(), "Starting docket scrape");
    let summary = supervisor.run(&store, &resources).await?;
    info!(
        queued = summary.queued,
        scraped = summary.scraped,
        failed = summary.failed,
        unsaved = summary.unsaved,
        "Docket scrape complete"
    );
    Ok(())
}
