//! Constants for the download module (timeouts, buffer sizes).

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default overall request timeout (5 minutes for large files).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Write granularity for streamed bodies; bounds memory per transfer.
pub const WRITE_CHUNK_SIZE: usize = 16 * 1024;

/// Default number of concurrent downloads.
pub const DEFAULT_DOWNLOADERS: usize = 5;

/// User-Agent sent with every request.
pub const USER_AGENT: &str = concat!("regscrape/", env!("CARGO_PKG_VERSION"));
