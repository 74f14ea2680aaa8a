//! HTTP client wrapper shared by every download step.
//!
//! The client is constructed explicitly and handed to the [`Downloader`]
//! rather than living in a process-wide static, so callers (and tests) decide
//! which transport, proxy and timeouts are in effect.
//!
//! [`Downloader`]: super::Downloader

use std::time::Duration;

use reqwest::header::{ACCEPT, ACCEPT_ENCODING, HeaderValue, RETRY_AFTER};
use reqwest::{Client, Method, RequestBuilder, Response};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, USER_AGENT};
use super::error::DownloadError;
use super::options::DownloadOptions;
use super::retry::parse_retry_after;

/// HTTP client for downloading files with streaming support.
///
/// This client is designed to be created once and reused for many downloads,
/// taking advantage of connection pooling. Cloning is cheap.
///
/// Bodies are never decompressed transparently: every request asks for
/// `Accept-Encoding: identity`, so byte offsets always refer to the stored
/// representation.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Creates a new HTTP client with the default connect timeout (20 s).
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    pub fn new() -> Self {
        Self::with_connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
    }

    /// Creates a new HTTP client with an explicit connect timeout.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn with_connect_timeout(connect_timeout: Duration) -> Self {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .user_agent(USER_AGENT)
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self { client }
    }

    /// Wraps an already configured reqwest client (proxies, TLS roots, ...).
    #[must_use]
    pub fn from_reqwest(client: Client) -> Self {
        Self { client }
    }

    /// Returns a reference to the underlying reqwest client.
    #[must_use]
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Starts a request with the common headers applied.
    ///
    /// Caller supplied headers are applied last and override the defaults.
    pub(crate) fn request(
        &self,
        method: Method,
        url: &Url,
        options: &DownloadOptions,
    ) -> RequestBuilder {
        let mut headers = options.headers().clone();
        headers
            .entry(ACCEPT)
            .or_insert(HeaderValue::from_static("*/*"));
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));
        self.client.request(method, url.clone()).headers(headers)
    }

    /// Sends a request, bounded by `timeout` until the response headers
    /// arrive and interruptible through `cancel`.
    ///
    /// Statuses are not interpreted here; callers decide what a 200, 206 or
    /// 416 means for their strategy.
    pub(crate) async fn send(
        &self,
        request: RequestBuilder,
        url: &Url,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Response, DownloadError> {
        let send = tokio::time::timeout(timeout, request.send());
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(DownloadError::cancelled(url.as_str())),
            outcome = send => match outcome {
                Err(_) => Err(DownloadError::timeout(url.as_str())),
                Ok(Err(e)) if e.is_timeout() => Err(DownloadError::timeout(url.as_str())),
                Ok(Err(e)) => Err(DownloadError::network(url.as_str(), e)),
                Ok(Ok(response)) => Ok(response),
            }
        }
    }
}

/// Builds the tagged status error for a failed response, including its
/// Retry-After hint.
pub(crate) fn status_error(url: &Url, response: &Response) -> DownloadError {
    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after);
    DownloadError::http_status_with_retry_after(
        url.as_str(),
        response.status().as_u16(),
        retry_after,
    )
}

/// Logs the headers that drive the engine's decisions for one response.
pub(crate) fn log_response_summary(url: &Url, response: &Response, range_start: Option<u64>) {
    let header = |name: reqwest::header::HeaderName| {
        response
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-")
            .to_string()
    };
    debug!(
        url = %url,
        status = response.status().as_u16(),
        ?range_start,
        content_length = %header(reqwest::header::CONTENT_LENGTH),
        content_range = %header(reqwest::header::CONTENT_RANGE),
        accept_ranges = %header(reqwest::header::ACCEPT_RANGES),
        etag = %header(reqwest::header::ETAG),
        last_modified = %header(reqwest::header::LAST_MODIFIED),
        retry_after = %header(RETRY_AFTER),
        "response received"
    );
}
