//! Per-download tuning: headers, deadlines, retries and chunking thresholds.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use super::constants::{
    DEFAULT_CHUNK_THREADS, DEFAULT_MIN_PART_SIZE, DEFAULT_MIN_SIZE_FOR_CHUNKING,
    DEFAULT_REQUEST_TIMEOUT, MIN_PART_SIZE_FLOOR,
};
use super::error::DownloadError;
use super::retry::RetryPolicy;

/// Options applied to every request of one download.
///
/// Built with the `with_*` methods starting from [`DownloadOptions::default`]:
///
/// ```
/// use std::time::Duration;
/// use chunkfetch_core::download::DownloadOptions;
///
/// let options = DownloadOptions::default()
///     .with_timeout(Duration::from_secs(10))
///     .with_max_retries(5)
///     .with_chunk_threads(8);
/// assert_eq!(options.retry_policy().max_attempts(), 6);
/// ```
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    headers: HeaderMap,
    timeout: Duration,
    retry_policy: RetryPolicy,
    chunk_threads: usize,
    min_size_for_chunking: u64,
    min_part_size: u64,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            headers: HeaderMap::new(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            retry_policy: RetryPolicy::default(),
            chunk_threads: DEFAULT_CHUNK_THREADS,
            min_size_for_chunking: DEFAULT_MIN_SIZE_FOR_CHUNKING,
            min_part_size: DEFAULT_MIN_PART_SIZE,
        }
    }
}

impl DownloadOptions {
    /// Adds an extra request header.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::InvalidHeader`] if the name or value cannot be
    /// encoded as an HTTP header.
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, DownloadError> {
        let header_name = HeaderName::from_bytes(name.trim().as_bytes())
            .map_err(|_| DownloadError::invalid_header(name))?;
        let header_value =
            HeaderValue::from_str(value.trim()).map_err(|_| DownloadError::invalid_header(name))?;
        self.headers.insert(header_name, header_value);
        Ok(self)
    }

    /// Replaces all extra headers.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Sets the per-request deadline (response headers, and each body read).
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the number of retries after the first attempt.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.retry_policy = self
            .retry_policy
            .with_max_attempts(max_retries.saturating_add(1));
        self
    }

    /// Replaces the retry policy (delays and attempt cap).
    #[must_use]
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Sets the number of concurrent range connections for one file.
    #[must_use]
    pub fn with_chunk_threads(mut self, chunk_threads: usize) -> Self {
        self.chunk_threads = chunk_threads.max(1);
        self
    }

    /// Resources smaller than this are downloaded sequentially.
    #[must_use]
    pub fn with_min_size_for_chunking(mut self, min_size_for_chunking: u64) -> Self {
        self.min_size_for_chunking = min_size_for_chunking;
        self
    }

    /// Sets the smallest part the planner may produce.
    #[must_use]
    pub fn with_min_part_size(mut self, min_part_size: u64) -> Self {
        self.min_part_size = min_part_size;
        self
    }

    /// Extra headers sent with every request.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Per-request deadline.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Retry policy applied to every transfer of the download.
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    #[must_use]
    pub fn chunk_threads(&self) -> usize {
        self.chunk_threads
    }

    #[must_use]
    pub fn min_size_for_chunking(&self) -> u64 {
        self.min_size_for_chunking
    }

    /// Minimum part size as configured, before the floor is applied.
    #[must_use]
    pub fn min_part_size(&self) -> u64 {
        self.min_part_size
    }

    /// Minimum part size handed to the planner, never below 256 KiB.
    #[must_use]
    pub fn effective_min_part_size(&self) -> u64 {
        self.min_part_size.max(MIN_PART_SIZE_FLOOR)
    }
}
