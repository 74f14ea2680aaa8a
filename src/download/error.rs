//! Error types for the download module.
//!
//! [`DownloadError`] is the tagged error every transfer step returns. The
//! retry policy inspects its variants (status code, Retry-After hint, I/O
//! origin) to decide what happens next, so each variant carries the context
//! needed for that decision and for a useful log line.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while downloading a single file.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection reset, TLS errors, etc.)
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request or body read exceeded its deadline.
    #[error("timeout downloading {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
        /// Parsed Retry-After hint, if the response carried one.
        retry_after: Option<Duration>,
    },

    /// File system error (create, preallocate, write, rename).
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The provided URL is malformed or uses an unsupported scheme.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// A caller supplied header could not be encoded.
    #[error("invalid header {name}")]
    InvalidHeader {
        /// Header name as supplied.
        name: String,
    },

    /// Number of bytes received does not match what the server announced.
    #[error("size mismatch downloading {url}: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        /// The URL being downloaded.
        url: String,
        /// Expected size in bytes.
        expected: u64,
        /// Actual size in bytes.
        actual: u64,
    },

    /// The server answered a ranged request without a partial response.
    #[error("range request not honored for {url} (HTTP {status})")]
    RangeNotHonored {
        /// The URL being downloaded.
        url: String,
        /// Status returned instead of 206.
        status: u16,
    },

    /// The download was cancelled.
    #[error("download cancelled: {url}")]
    Cancelled {
        /// The URL being downloaded.
        url: String,
    },
}

impl DownloadError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after: None,
        }
    }

    /// Creates an HTTP status error carrying a Retry-After hint.
    pub fn http_status_with_retry_after(
        url: impl Into<String>,
        status: u16,
        retry_after: Option<Duration>,
    ) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates an invalid header error.
    pub fn invalid_header(name: impl Into<String>) -> Self {
        Self::InvalidHeader { name: name.into() }
    }

    /// Creates a size mismatch error.
    pub fn size_mismatch(url: impl Into<String>, expected: u64, actual: u64) -> Self {
        Self::SizeMismatch {
            url: url.into(),
            expected,
            actual,
        }
    }

    /// Creates a protocol mismatch error for a ranged request.
    pub fn range_not_honored(url: impl Into<String>, status: u16) -> Self {
        Self::RangeNotHonored {
            url: url.into(),
            status,
        }
    }

    /// Creates a cancellation error.
    pub fn cancelled(url: impl Into<String>) -> Self {
        Self::Cancelled { url: url.into() }
    }

    /// Returns the HTTP status code when the error came from a response.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } | Self::RangeNotHonored { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns the server Retry-After hint, if any.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::HttpStatus { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Returns true for a cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Error type for batch-level (infrastructure) failures.
///
/// Individual file failures never surface here; they are recorded in the
/// batch result instead.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Invalid concurrency value provided.
    #[error("invalid concurrency value {value}: must be between 1 and {max}")]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
        /// Largest accepted value.
        max: usize,
    },

    /// The target directory could not be created.
    #[error("cannot create directory {path}: {source}")]
    CreateDir {
        /// Directory that could not be created.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}
