//! Retry logic with exponential backoff for transient download failures.
//!
//! When a transfer attempt fails, the error is classified into a
//! [`FailureType`]:
//! - [`FailureType::Transient`] - timeouts, connection resets, 408, 5xx, size mismatches
//! - [`FailureType::RateLimited`] - HTTP 429, retried with backoff or the server's hint
//! - [`FailureType::Permanent`] - other 4xx, filesystem errors, protocol mismatches
//!
//! [`RetryPolicy::should_retry`] then turns the failure and the attempt number
//! into a [`RetryDecision`].
//!
//! # Example
//!
//! ```
//! use chunkfetch_core::download::{DownloadError, RetryDecision, RetryPolicy};
//!
//! let policy = RetryPolicy::default();
//! let error = DownloadError::http_status("https://example.com/file.bin", 503);
//!
//! match policy.should_retry(&error, 1) {
//!     RetryDecision::Retry { delay, attempt } => {
//!         println!("Retrying in {:?} (attempt {})", delay, attempt);
//!     }
//!     RetryDecision::DoNotRetry { reason } => {
//!         println!("Not retrying: {}", reason);
//!     }
//! }
//! ```

use std::time::{Duration, SystemTime};

use rand::Rng;
use tracing::{debug, instrument};

use super::DownloadError;
use super::constants::{
    DEFAULT_MAX_RETRIES, DEFAULT_RETRY_AFTER_CAP, DEFAULT_RETRY_BASE_DELAY,
    DEFAULT_RETRY_MAX_DELAY,
};

/// Largest exponent used for the backoff doubling.
const MAX_BACKOFF_EXPONENT: u32 = 20;

/// Classification of download failure types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Temporary failure that may succeed on retry.
    Transient,

    /// Server rate limiting (HTTP 429).
    RateLimited,

    /// Failure that won't succeed regardless of retries.
    Permanent,
}

impl FailureType {
    /// Returns true when a failure of this type may be retried.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        !matches!(self, Self::Permanent)
    }
}

/// Decision on whether to retry a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which attempt number this will be (1-indexed, so first retry is attempt 2).
        attempt: u32,
    },

    /// Do not retry.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Configuration for retry behavior with exponential backoff.
///
/// # Default Values
///
/// - `max_attempts`: 4 (one attempt plus three retries)
/// - `base_delay`: 350 ms
/// - `max_delay`: 8 seconds
/// - `retry_after_cap`: 30 seconds
///
/// # Delay Calculation
///
/// ```text
/// delay  = min(retry_after, retry_after_cap)          when the server sent a hint
///        = min(base_delay * 2^(attempt-1), max_delay)  otherwise
/// delay += uniform(0 ..= delay / 3)
/// ```
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial attempt).
    max_attempts: u32,

    /// Base delay for the first retry.
    base_delay: Duration,

    /// Maximum backoff delay.
    max_delay: Duration,

    /// Ceiling for Retry-After hints.
    retry_after_cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RETRIES + 1,
            base_delay: DEFAULT_RETRY_BASE_DELAY,
            max_delay: DEFAULT_RETRY_MAX_DELAY,
            retry_after_cap: DEFAULT_RETRY_AFTER_CAP,
        }
    }
}

impl RetryPolicy {
    /// Creates a new retry policy with custom settings.
    ///
    /// # Arguments
    ///
    /// * `max_attempts` - Maximum attempts including the initial one (clamped to >= 1)
    /// * `base_delay` - Base delay for the first retry
    /// * `max_delay` - Cap of the exponential backoff
    /// * `retry_after_cap` - Cap applied to server Retry-After hints
    #[must_use]
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        retry_after_cap: Duration,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            retry_after_cap,
        }
    }

    /// Creates a policy allowing `max_retries` retries after the first attempt.
    #[must_use]
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_attempts: max_retries.saturating_add(1),
            ..Self::default()
        }
    }

    /// Returns a copy of this policy allowing `max_attempts` attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Returns the maximum number of attempts configured.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns true if the error is worth another attempt.
    #[must_use]
    pub fn is_retryable(&self, error: &DownloadError) -> bool {
        classify_error(error).is_retryable()
    }

    /// Determines whether to retry a failed attempt.
    ///
    /// `attempt` is the attempt number that just failed (1-indexed).
    #[instrument(level = "debug", skip(self, error), fields(max_attempts = self.max_attempts))]
    pub fn should_retry(&self, error: &DownloadError, attempt: u32) -> RetryDecision {
        let failure_type = classify_error(error);
        if !failure_type.is_retryable() {
            return RetryDecision::DoNotRetry {
                reason: "permanent failure - retry would not help".to_string(),
            };
        }

        if attempt >= self.max_attempts {
            debug!(attempt, max = self.max_attempts, "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        let delay = self.delay_for(error, attempt);
        debug!(
            attempt,
            next_attempt = attempt + 1,
            delay_ms = delay.as_millis(),
            ?failure_type,
            "will retry"
        );

        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }

    /// Computes the wait before the attempt following `attempt`, jitter included.
    #[must_use]
    pub fn delay_for(&self, error: &DownloadError, attempt: u32) -> Duration {
        let delay = self.base_delay_for(error, attempt);
        delay + jitter(delay)
    }

    /// Delay before jitter: the capped server hint, or the capped backoff.
    fn base_delay_for(&self, error: &DownloadError, attempt: u32) -> Duration {
        match error.retry_after() {
            Some(hint) if !hint.is_zero() => hint.min(self.retry_after_cap),
            _ => self.backoff(attempt),
        }
    }

    /// `base_delay * 2^(attempt-1)`, capped at `max_delay`.
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
        self.base_delay
            .saturating_mul(1_u32 << exponent)
            .min(self.max_delay)
    }
}

/// Uniform random jitter between zero and a third of `delay`.
fn jitter(delay: Duration) -> Duration {
    let ceiling_ms = u64::try_from(delay.as_millis() / 3).unwrap_or(u64::MAX);
    if ceiling_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=ceiling_ms))
}

/// Classifies a download error into a failure type for retry decisions.
///
/// | Error | Type |
/// |-------|------|
/// | HTTP 408, 5xx | Transient |
/// | HTTP 429 | RateLimited |
/// | other HTTP >= 400 | Permanent |
/// | Timeout, Network | Transient |
/// | SizeMismatch | Transient (usually a truncated connection) |
/// | Io | Permanent (disk full, permission denied) |
/// | RangeNotHonored | Permanent (strategy must change instead) |
/// | InvalidUrl, InvalidHeader, Cancelled | Permanent |
#[must_use]
pub fn classify_error(error: &DownloadError) -> FailureType {
    match error {
        DownloadError::HttpStatus { status, .. } => classify_http_status(*status),
        DownloadError::Timeout { .. }
        | DownloadError::Network { .. }
        | DownloadError::SizeMismatch { .. } => FailureType::Transient,
        DownloadError::Io { .. }
        | DownloadError::InvalidUrl { .. }
        | DownloadError::InvalidHeader { .. }
        | DownloadError::RangeNotHonored { .. }
        | DownloadError::Cancelled { .. } => FailureType::Permanent,
    }
}

fn classify_http_status(status: u16) -> FailureType {
    match status {
        408 => FailureType::Transient,
        429 => FailureType::RateLimited,
        500..=599 => FailureType::Transient,
        _ => FailureType::Permanent,
    }
}

/// Parses a Retry-After header value (delay-seconds or HTTP-date).
///
/// Returns `None` for empty, negative, zero or unparseable values. An
/// HTTP-date in the past yields `None` as well, since there is nothing to
/// wait for.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use chunkfetch_core::download::parse_retry_after;
///
/// assert_eq!(parse_retry_after("120"), Some(Duration::from_secs(120)));
/// assert_eq!(parse_retry_after("invalid"), None);
/// ```
#[must_use]
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let header_value = header_value.trim();
    if header_value.is_empty() {
        return None;
    }

    if let Ok(seconds) = header_value.parse::<i64>() {
        if seconds <= 0 {
            debug!(seconds, "non-positive Retry-After value, ignoring");
            return None;
        }
        return u64::try_from(seconds).ok().map(Duration::from_secs);
    }

    match httpdate::parse_http_date(header_value) {
        Ok(at) => at
            .duration_since(SystemTime::now())
            .ok()
            .filter(|d| !d.is_zero()),
        Err(_) => {
            debug!(header_value, "unparseable Retry-After value");
            None
        }
    }
}
