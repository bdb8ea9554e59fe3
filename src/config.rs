//! Pipeline configuration: defaults, TOML file loading and validation.
//!
//! Every section has working defaults, so an absent file or an empty table is
//! valid. CLI flags are applied on top by the binary.

use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::download::DEFAULT_MAX_RETRIES;
use crate::download::constants::{CONNECT_TIMEOUT_SECS, DEFAULT_DOWNLOADERS, READ_TIMEOUT_SECS};
use crate::store::{DEFAULT_PAGE_SIZE, DocumentFilter};

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config value for `{field}`: {value}. Expected range: {expected}")]
    Invalid {
        field: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// Store section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// SQLite database file.
    pub database: PathBuf,
    /// Rows fetched per cursor page.
    pub page_size: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("regulations.db"),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Download section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DownloadConfig {
    pub directory: PathBuf,
    pub concurrency: usize,
    /// Attempts per file, including the first.
    pub retries: u32,
    /// Files smaller than this many bytes count as failed.
    pub min_size: u64,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("downloads"),
            concurrency: DEFAULT_DOWNLOADERS,
            retries: DEFAULT_MAX_RETRIES,
            min_size: 0,
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
            read_timeout_secs: READ_TIMEOUT_SECS,
        }
    }
}

/// Decode section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DecodeConfig {
    pub concurrency: usize,
    /// Budget per decoder (and per OCR stage) run.
    pub timeout_secs: u64,
    /// Append OCR to the PDF chain.
    pub ocr: bool,
    /// Directory holding helper scripts such as `extract_docx.py`.
    pub scripts_dir: PathBuf,
    /// Interpreter used to run helper scripts.
    pub interpreter: String,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            timeout_secs: 120,
            ocr: true,
            scripts_dir: PathBuf::from("scripts"),
            interpreter: "python3".to_string(),
        }
    }
}

/// Scrape section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScrapeConfig {
    /// Worker count; defaults to the number of CPUs.
    pub workers: usize,
    /// How long an idle worker waits for work before exiting.
    pub grace_secs: u64,
    /// Attempts per docket, including the first.
    pub max_attempts: u32,
    pub base_url: String,
    pub request_timeout_secs: u64,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            grace_secs: 5,
            max_attempts: 3,
            base_url: "https://api.regulations.gov/v4".to_string(),
            request_timeout_secs: 60,
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map_or(1, std::num::NonZeroUsize::get)
        .min(64)
}

/// Full pipeline configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub store: StoreConfig,
    pub download: DownloadConfig,
    pub decode: DecodeConfig,
    pub scrape: ScrapeConfig,
    /// Restricts download and decode passes to matching documents.
    pub filter: DocumentFilter,
}

impl PipelineConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] or [`ConfigError::Invalid`].
    pub fn from_toml_str(raw: &str, origin: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, parsed or validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw, path)
    }

    /// Loads `explicit` if given, else the default path if it exists, else defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a file is present but invalid. An explicit
    /// path that does not exist is an error; a missing default file is not.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<LoadedConfig, ConfigError> {
        if let Some(path) = explicit {
            return Ok(LoadedConfig {
                config: Self::load(path)?,
                path: Some(path.to_path_buf()),
                loaded_from_file: true,
            });
        }

        match resolve_default_config_path() {
            Some(path) if path.exists() => Ok(LoadedConfig {
                config: Self::load(&path)?,
                path: Some(path),
                loaded_from_file: true,
            }),
            path => Ok(LoadedConfig {
                config: Self::default(),
                path,
                loaded_from_file: false,
            }),
        }
    }

    /// Checks every value against its allowed range.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for the first value out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("store.page_size", self.store.page_size, 1..=10_000, "1..=10000")?;

        check_range("download.concurrency", self.download.concurrency, 1..=100, "1..=100")?;
        check_range("download.retries", self.download.retries, 1..=10, "1..=10")?;
        validate_timeout_secs("download.connect_timeout_secs", self.download.connect_timeout_secs)?;
        validate_timeout_secs("download.read_timeout_secs", self.download.read_timeout_secs)?;

        check_range("decode.concurrency", self.decode.concurrency, 1..=100, "1..=100")?;
        validate_timeout_secs("decode.timeout_secs", self.decode.timeout_secs)?;

        check_range("scrape.workers", self.scrape.workers, 1..=64, "1..=64")?;
        check_range("scrape.max_attempts", self.scrape.max_attempts, 1..=10, "1..=10")?;
        validate_timeout_secs("scrape.grace_secs", self.scrape.grace_secs)?;
        validate_timeout_secs("scrape.request_timeout_secs", self.scrape.request_timeout_secs)?;
        if url::Url::parse(&self.scrape.base_url).is_err() {
            return Err(ConfigError::Invalid {
                field: "scrape.base_url",
                value: self.scrape.base_url.clone(),
                expected: "an absolute http(s) URL",
            });
        }
        Ok(())
    }
}

fn check_range<T>(
    field: &'static str,
    value: T,
    range: std::ops::RangeInclusive<T>,
    expected: &'static str,
) -> Result<(), ConfigError>
where
    T: PartialOrd + ToString,
{
    if range.contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            value: value.to_string(),
            expected,
        })
    }
}

fn validate_timeout_secs(field: &'static str, value: u64) -> Result<(), ConfigError> {
    check_range(field, value, 1..=3600, "1..=3600")
}

/// A configuration together with where it came from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: PipelineConfig,
    /// Resolved config path if one is known.
    pub path: Option<PathBuf>,
    pub loaded_from_file: bool,
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/regscrape/config.toml`
/// 2. `$HOME/.config/regscrape/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("regscrape")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("regscrape")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}
