//! Streaming HTTP transfer of one view into a local file.

use std::path::Path;
use std::time::Duration;

use futures_util::TryStreamExt;
use reqwest::Client;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, instrument};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS, USER_AGENT, WRITE_CHUNK_SIZE};
use super::error::DownloadError;

/// Shared portal client. Clones reuse one connection pool.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Client with a 30 s connect timeout and a 5 min whole-transfer timeout.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::ClientBuild`] if the TLS backend cannot be initialised.
    pub fn new() -> Result<Self, DownloadError> {
        Self::new_with_timeouts(CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// # Errors
    ///
    /// Returns [`DownloadError::ClientBuild`] if the TLS backend cannot be initialised.
    pub fn new_with_timeouts(
        connect_timeout_secs: u64,
        read_timeout_secs: u64,
    ) -> Result<Self, DownloadError> {
        Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .timeout(Duration::from_secs(read_timeout_secs))
            .gzip(true)
            .user_agent(USER_AGENT)
            .build()
            .map(|client| Self { client })
            .map_err(DownloadError::ClientBuild)
    }

    /// Fetches `url` into `destination` and returns the body length.
    ///
    /// Each call truncates the destination, so a retry never appends to an
    /// earlier attempt. Nothing is left on disk when the transfer fails.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError`] on an invalid url, transport failure, timeout,
    /// non-success status, or local write failure.
    #[instrument(skip(self), fields(destination = %destination.display()))]
    pub async fn download_to_path(&self, url: &str, destination: &Path) -> Result<u64, DownloadError> {
        if Url::parse(url).is_err() {
            return Err(DownloadError::invalid_url(url));
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| transport_error(url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::http_status(url, status.as_u16()));
        }

        if let Some(dir) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| DownloadError::io(dir, e))?;
        }
        let file = File::create(destination)
            .await
            .map_err(|e| DownloadError::io(destination, e))?;

        match write_body(file, response, url, destination).await {
            Ok(size) => Ok(size),
            Err(error) => {
                debug!(error = %error, "removing partial file");
                if let Err(remove_error) = tokio::fs::remove_file(destination).await {
                    debug!(error = %remove_error, "partial file already gone");
                }
                Err(error)
            }
        }
    }
}

fn transport_error(url: &str, error: reqwest::Error) -> DownloadError {
    if error.is_timeout() {
        DownloadError::timeout(url)
    } else {
        DownloadError::network(url, error)
    }
}

async fn write_body(
    file: File,
    response: reqwest::Response,
    url: &str,
    destination: &Path,
) -> Result<u64, DownloadError> {
    let mut writer = BufWriter::with_capacity(WRITE_CHUNK_SIZE, file);
    let mut body = response.bytes_stream();
    let mut size = 0u64;

    while let Some(chunk) = body.try_next().await.map_err(|e| transport_error(url, e))? {
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(destination, e))?;
        size += chunk.len() as u64;
    }
    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(destination, e))?;
    Ok(size)
}
