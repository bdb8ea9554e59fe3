//! Attempt budget and spacing for view downloads.
//!
//! A failed attempt is classified into a [`FailureKind`] for reporting, but
//! the kind never changes the decision: attempts are independent, so every
//! failure is retried until the budget is spent. [`RetryPolicy::default`]
//! spaces attempts with capped exponential backoff plus jitter;
//! [`RetryPolicy::immediate`] retries back to back.

use std::fmt;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, instrument};

use super::DownloadError;

/// Attempts per view, including the first.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(32);
const MAX_JITTER: Duration = Duration::from_millis(500);

/// Failure taxonomy recorded on a view that could not be fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Network, protocol or HTTP status fault.
    Transfer,
    SizeTooSmall,
    Unknown,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Transfer => "TransferError",
            Self::SizeTooSmall => "SizeTooSmall",
            Self::Unknown => "UnknownError",
        })
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep `delay`, then make attempt number `attempt`.
    Retry { delay: Duration, attempt: u32 },
    /// Budget spent; report the last failure.
    DoNotRetry { reason: String },
}

/// `delay(n) = min(base * multiplier^(n-1), cap) + jitter` for failed attempt `n`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Default backoff with a custom budget, clamped to at least one attempt.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// No delay between attempts.
    #[must_use]
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
            jitter: false,
        }
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Decides what follows failed attempt `attempt` (1-indexed).
    #[instrument(skip(self), fields(max_attempts = self.max_attempts))]
    pub fn should_retry(&self, kind: FailureKind, attempt: u32) -> RetryDecision {
        if attempt >= self.max_attempts {
            debug!(attempt, "attempt budget spent");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        let delay = self.delay_after(attempt);
        debug!(%kind, attempt, delay_ms = delay.as_millis(), "retrying");
        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }

    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = f64::from(attempt.saturating_sub(1));
        let backoff_ms = (self.base_delay.as_millis() as f64 * self.multiplier.powf(exponent))
            .min(self.max_delay.as_millis() as f64);
        let jitter = if self.jitter {
            let max = MAX_JITTER.as_millis() as u64;
            Duration::from_millis(rand::thread_rng().gen_range(0..=max))
        } else {
            Duration::ZERO
        };
        Duration::from_millis(backoff_ms as u64) + jitter
    }
}

/// Maps a transfer error onto the reported failure taxonomy.
#[must_use]
pub fn classify_error(error: &DownloadError) -> FailureKind {
    match error {
        DownloadError::SizeTooSmall { .. } => FailureKind::SizeTooSmall,
        DownloadError::Io { .. } | DownloadError::ClientBuild(_) => FailureKind::Unknown,
        DownloadError::Network { .. }
        | DownloadError::Timeout { .. }
        | DownloadError::HttpStatus { .. }
        | DownloadError::InvalidUrl { .. } => FailureKind::Transfer,
    }
}
