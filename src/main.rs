//! CLI entry point for regscrape.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use clap::Parser;
use regscrape_core::PipelineConfig;
use tracing::{debug, info, warn};

mod cli;
mod commands;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let cli = Cli::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?cli, "CLI arguments parsed");

    let loaded = PipelineConfig::load_or_default(cli.config.as_deref())?;
    match (&loaded.path, loaded.loaded_from_file) {
        (Some(path), true) => info!(path = %path.display(), "Loaded config file"),
        _ => debug!("No config file; using defaults"),
    }
    let mut config = loaded.config;
    if let Some(db) = cli.db {
        config.store.database = db;
    }

    let interrupted = Arc::new(AtomicBool::new(false));
    if cli.command.stops_gracefully() {
        spawn_interrupt_handler(Arc::clone(&interrupted));
    }

    match &cli.command {
        Command::Download(args) => commands::run_download_command(config, args).await,
        Command::Decode(args) => commands::run_decode_command(config, args).await,
        Command::Reprocess(args) => commands::run_reprocess_command(config, args).await,
        Command::CreateDockets => commands::run_create_dockets_command(config).await,
        Command::ScrapeDockets(args) => {
            commands::run_scrape_dockets_command(config, args, interrupted).await
        }
    }
}

/// First Ctrl-C asks the scrape workers to stop; a second one exits at once.
fn spawn_interrupt_handler(interrupted: Arc<AtomicBool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("Interrupt received; stopping after in-flight work (Ctrl-C again to abort)");
        interrupted.store(true, Ordering::SeqCst);

        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });
}
