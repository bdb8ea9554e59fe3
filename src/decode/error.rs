//! Error types for text extraction.

use std::path::PathBuf;

use thiserror::Error;

/// Why a single decoder failed on a file.
///
/// Every variant means "advance to the next decoder in the chain"; none is
/// retried by the decoder itself.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The program ran but its output was judged unusable.
    #[error("extraction failed{}", reason_suffix(.0))]
    ExtractionFailed(String),

    /// The program exceeded its wall-clock budget and was killed.
    #[error("{program} timed out after {secs}s")]
    TimedOut {
        /// Program that was killed.
        program: String,
        /// Budget that was exceeded.
        secs: u64,
    },

    /// The program could not be started (usually: not installed).
    #[error("failed to run {program}: {source}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Local file system failure while preparing or collecting output.
    #[error("IO error on {path}: {source}")]
    Io {
        /// Path involved in the failure.
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn reason_suffix(reason: &str) -> String {
    if reason.is_empty() {
        String::new()
    } else {
        format!(": {reason}")
    }
}

impl DecodeError {
    /// Creates an extraction failure with a reason.
    pub fn extraction_failed(reason: impl Into<String>) -> Self {
        Self::ExtractionFailed(reason.into())
    }

    /// Creates a spawn failure.
    pub fn spawn(program: impl Into<String>, source: std::io::Error) -> Self {
        Self::Spawn {
            program: program.into(),
            source,
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns true if the failure was a timeout kill.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }
}
