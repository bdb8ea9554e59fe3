//! Error types for docket scraping.

use thiserror::Error;

use crate::store::StoreError;

/// Failure of one scrape call.
///
/// `RemoteAction` and `Other` are retried identically; `Interrupted` ends the
/// whole run.
#[derive(Debug, Clone, Error)]
pub enum ScrapeError {
    /// The remote service failed to carry out the request.
    #[error("remote action failed: {0}")]
    RemoteAction(String),

    /// Any other failure (transport, unexpected response, decoding).
    #[error("{0}")]
    Other(String),

    /// The user asked the run to stop.
    #[error("scrape interrupted")]
    Interrupted,

    /// A worker session could not be opened.
    #[error("failed to open scrape session: {0}")]
    Session(String),
}

impl ScrapeError {
    /// Creates a remote-action failure.
    pub fn remote_action(message: impl Into<String>) -> Self {
        Self::RemoteAction(message.into())
    }

    /// Creates a generic failure.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

/// Errors that abort a supervised scrape run.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The worker count is out of range.
    #[error("invalid worker count {value}: must be between 1 and 64")]
    InvalidWorkers { value: usize },

    /// A worker's remote session could not be opened.
    #[error("worker {worker}: {source}")]
    Session {
        worker: usize,
        #[source]
        source: ScrapeError,
    },

    /// A worker's store handle could not be opened.
    #[error("worker {worker}: failed to open store: {source}")]
    WorkerStore {
        worker: usize,
        #[source]
        source: StoreError,
    },

    /// The docket cursor failed beyond recovery.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The run was interrupted by the user.
    #[error("scrape interrupted")]
    Interrupted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scrape_error_display() {
        assert_eq!(
            ScrapeError::remote_action("HTTP 503").to_string(),
            "remote action failed: HTTP 503"
        );
        assert_eq!(ScrapeError::other("timed out").to_string(), "timed out");
    }

    #[test]
    fn test_supervisor_session_error_names_worker() {
        let error = SupervisorError::Session {
            worker: 3,
            source: ScrapeError::Session("connection refused".to_string()),
        };
        assert_eq!(
            error.to_string(),
            "worker 3: failed to open scrape session: connection refused"
        );
    }
}
