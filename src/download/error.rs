//! Failures of a single view transfer.

use std::path::PathBuf;

use thiserror::Error;

/// Why one attempt at fetching a view did not produce a usable file.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Connection, TLS or body-stream failure.
    #[error("request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("timeout fetching {url}")]
    Timeout { url: String },

    /// The portal answered with a non-success status.
    #[error("{url} answered HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    /// Creating or writing the destination file failed.
    #[error("cannot write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("not a fetchable url: {url}")]
    InvalidUrl { url: String },

    /// The body was shorter than the configured minimum. The message is
    /// stored verbatim as the view's failure reason.
    #[error("Resulting file was smaller than the minimum file size.")]
    SizeTooSmall { url: String, bytes: u64, min_size: u64 },

    #[error("cannot build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
}

impl DownloadError {
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    pub fn size_too_small(url: impl Into<String>, bytes: u64, min_size: u64) -> Self {
        Self::SizeTooSmall {
            url: url.into(),
            bytes,
            min_size,
        }
    }

    /// The url involved, when the failure is tied to one.
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Network { url, .. }
            | Self::Timeout { url }
            | Self::HttpStatus { url, .. }
            | Self::InvalidUrl { url }
            | Self::SizeTooSmall { url, .. } => Some(url),
            Self::Io { .. } | Self::ClientBuild(_) => None,
        }
    }
}
