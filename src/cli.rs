//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Download regulatory filings, extract their text, and scrape docket metadata.
#[derive(Parser, Debug)]
#[command(name = "regscrape")]
#[command(author, version, about)]
pub struct Cli {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (default: $XDG_CONFIG_HOME/regscrape/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// SQLite database file (overrides config)
    #[arg(long, global = true, value_name = "PATH")]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download every view that has not been downloaded yet
    Download(DownloadArgs),
    /// Extract text from every downloaded, undecoded view
    Decode(DecodeArgs),
    /// Reset failed decodes so the next decode pass retries them
    Reprocess(ReprocessArgs),
    /// Create a scrape task for every docket referenced by a document
    CreateDockets,
    /// Scrape metadata for every pending docket
    ScrapeDockets(ScrapeArgs),
}

impl Command {
    /// Whether the command can wind down cleanly on a first Ctrl-C. Other
    /// commands keep the default signal behavior and stop immediately.
    #[must_use]
    pub fn stops_gracefully(&self) -> bool {
        matches!(self, Self::ScrapeDockets(_))
    }
}

/// Options shared by the download and decode passes.
#[derive(Args, Debug, Clone, Default)]
pub struct PassArgs {
    /// Process without saving any state
    #[arg(long)]
    pub dry_run: bool,

    /// Only process views of this file type (e.g. pdf, msw8)
    #[arg(short = 't', long = "type", value_name = "TYPE")]
    pub file_type: Option<String>,

    /// Only process documents from this agency
    #[arg(long)]
    pub agency: Option<String>,

    /// Only process documents in this docket
    #[arg(long)]
    pub docket: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct DownloadArgs {
    #[command(flatten)]
    pub pass: PassArgs,

    /// Maximum concurrent downloads (1-100)
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub concurrency: Option<u8>,

    /// Attempts per file, including the first (1-10)
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u32).range(1..=10))]
    pub retries: Option<u32>,

    /// Minimum acceptable file size in bytes
    #[arg(long, value_name = "BYTES")]
    pub min_size: Option<u64>,

    /// Directory downloaded files are written to
    #[arg(short = 'o', long = "dir", value_name = "DIR")]
    pub download_dir: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct DecodeArgs {
    #[command(flatten)]
    pub pass: PassArgs,

    /// Maximum concurrent decodes (1-100)
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub concurrency: Option<u8>,

    /// Seconds before a decoder is killed (1-3600)
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub timeout: Option<u64>,

    /// Do not fall back to OCR for PDFs
    #[arg(long)]
    pub no_ocr: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ReprocessArgs {
    /// Only reset views of this file type
    #[arg(short = 't', long = "type", value_name = "TYPE")]
    pub file_type: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ScrapeArgs {
    /// Number of scrape workers (1-64, default: number of CPUs)
    #[arg(short = 'm', long, value_parser = clap::value_parser!(u8).range(1..=64))]
    pub workers: Option<u8>,

    /// Base URL of the docket metadata API
    #[arg(long, value_name = "URL")]
    pub base_url: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_requires_subcommand() {
        let result = Cli::try_parse_from(["regscrape"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_verbose_flag_is_global() {
        let cli = Cli::try_parse_from(["regscrape", "decode", "-vv"]).unwrap();
        assert_eq!(cli.verbose, 2);

        let cli = Cli::try_parse_from(["regscrape", "-q", "create-dockets"]).unwrap();
        assert!(cli.quiet);
    }

    #[test]
    fn test_cli_download_flags() {
        let cli = Cli::try_parse_from([
            "regscrape", "download", "--dry-run", "--type", "pdf", "-c", "8", "-r", "2",
            "--min-size", "1024", "--dir", "/data",
        ])
        .unwrap();

        let Command::Download(args) = cli.command else {
            panic!("expected download");
        };
        assert!(args.pass.dry_run);
        assert_eq!(args.pass.file_type.as_deref(), Some("pdf"));
        assert_eq!(args.concurrency, Some(8));
        assert_eq!(args.retries, Some(2));
        assert_eq!(args.min_size, Some(1024));
        assert_eq!(args.download_dir, Some(PathBuf::from("/data")));
    }

    #[test]
    fn test_cli_download_concurrency_zero_rejected() {
        let err = Cli::try_parse_from(["regscrape", "download", "-c", "0"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_decode_flags() {
        let cli = Cli::try_parse_from(["regscrape", "decode", "--no-ocr", "--timeout", "30"]).unwrap();
        let Command::Decode(args) = cli.command else {
            panic!("expected decode");
        };
        assert!(args.no_ocr);
        assert_eq!(args.timeout, Some(30));
        assert!(!args.pass.dry_run);
    }

    #[test]
    fn test_cli_scrape_workers_range() {
        let cli = Cli::try_parse_from(["regscrape", "scrape-dockets", "-m", "4"]).unwrap();
        let Command::ScrapeDockets(args) = cli.command else {
            panic!("expected scrape-dockets");
        };
        assert_eq!(args.workers, Some(4));

        let err = Cli::try_parse_from(["regscrape", "scrape-dockets", "--workers", "65"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_global_db_after_subcommand() {
        let cli = Cli::try_parse_from(["regscrape", "reprocess", "--type", "pdf", "--db", "x.db"]).unwrap();
        assert_eq!(cli.db, Some(PathBuf::from("x.db")));
        let Command::Reprocess(args) = cli.command else {
            panic!("expected reprocess");
        };
        assert_eq!(args.file_type.as_deref(), Some("pdf"));
    }

    #[test]
    fn test_only_scrape_dockets_stops_gracefully() {
        let graceful = |args: &[&str]| {
            Cli::try_parse_from(args.iter().copied())
                .unwrap()
                .command
                .stops_gracefully()
        };
        assert!(graceful(&["regscrape", "scrape-dockets"]));
        assert!(!graceful(&["regscrape", "download"]));
        assert!(!graceful(&["regscrape", "decode", "--no-ocr"]));
        assert!(!graceful(&["regscrape", "create-dockets"]));
    }
}
