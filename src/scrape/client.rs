//! Remote docket metadata client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, instrument};
use url::Url;

use super::ScrapeError;
use crate::download::constants::{CONNECT_TIMEOUT_SECS, USER_AGENT};

/// One worker's session against the remote service.
#[async_trait]
pub trait ScrapeClient: Send + Sync {
    /// Fetches the metadata of one docket.
    async fn scrape(&self, docket_id: &str) -> Result<serde_json::Value, ScrapeError>;
}

/// HTTP implementation: `GET {base_url}/dockets/{docket_id}`.
///
/// Each instance owns its own connection pool, so workers never share one.
#[derive(Debug, Clone)]
pub struct HttpScrapeClient {
    client: Client,
    base_url: Url,
}

impl HttpScrapeClient {
    /// Builds a client with its own connection pool.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::Session`] if the base URL is invalid or the
    /// client cannot be constructed.
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, ScrapeError> {
        let mut base_url =
            Url::parse(base_url).map_err(|error| ScrapeError::Session(error.to_string()))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(request_timeout)
            .user_agent(USER_AGENT)
            .gzip(true)
            .build()
            .map_err(|error| ScrapeError::Session(error.to_string()))?;

        Ok(Self { client, base_url })
    }

    fn docket_url(&self, docket_id: &str) -> Result<Url, ScrapeError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ScrapeError::other(format!("base url cannot be a base: {}", self.base_url)))?
            .pop_if_empty()
            .extend(["dockets", docket_id]);
        Ok(url)
    }
}

#[async_trait]
impl ScrapeClient for HttpScrapeClient {
    #[instrument(skip(self))]
    async fn scrape(&self, docket_id: &str) -> Result<serde_json::Value, ScrapeError> {
        let url = self.docket_url(docket_id)?;
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|error| ScrapeError::other(format!("request to {url} failed: {error}")))?;

        let status = response.status();
        debug!(%status, "docket response");
        if let Some(error) = status_error(status) {
            return Err(error);
        }

        response
            .json::<serde_json::Value>()
            .await
            .map_err(|error| ScrapeError::other(format!("invalid docket payload: {error}")))
    }
}

fn status_error(status: StatusCode) -> Option<ScrapeError> {
    if status.is_success() {
        None
    } else if status.is_server_error() {
        Some(ScrapeError::remote_action(format!("HTTP {}", status.as_u16())))
    } else {
        Some(ScrapeError::other(format!("HTTP {}", status.as_u16())))
    }
}
