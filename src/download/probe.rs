//! Capability probing: does the server honour byte ranges, and how large is
//! the resource?
//!
//! A cheap `HEAD` is tried first. When it does not announce both
//! `Accept-Ranges: bytes` and a `Content-Length`, a one-byte ranged `GET`
//! (`Range: bytes=0-0`) settles the question. Probe failures never abort a
//! download; they only rule out chunking.

use reqwest::Method;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH, ETAG, HeaderMap, LAST_MODIFIED, RANGE};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use url::Url;

use super::client::{HttpClient, log_response_summary};
use super::error::DownloadError;
use super::options::DownloadOptions;

/// What the server told us about a resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeMeta {
    /// Total length in bytes, if known.
    pub total_len: Option<u64>,
    /// Whether the server honours `Range: bytes=...` requests.
    pub accept_ranges: bool,
    /// `ETag` or `Last-Modified` value usable with `If-Range`.
    pub validator: Option<String>,
}

impl RangeMeta {
    /// Metadata for a server that must be read sequentially.
    #[must_use]
    pub fn not_range_capable() -> Self {
        Self::default()
    }

    /// Total length usable for chunk planning: only known when ranges are
    /// honoured.
    #[must_use]
    pub fn chunkable_len(&self) -> Option<u64> {
        if self.accept_ranges {
            self.total_len.filter(|len| *len > 0)
        } else {
            None
        }
    }
}

/// A parsed `Content-Range: bytes <start>-<end>/<total>` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    /// Inclusive first and last byte positions, absent for `bytes */<total>`.
    pub span: Option<(u64, u64)>,
    /// Complete length, absent for `/*`.
    pub total: Option<u64>,
}

/// Parses a `Content-Range` header value.
///
/// ```
/// use chunkfetch_core::download::{ContentRange, parse_content_range};
///
/// assert_eq!(
///     parse_content_range("bytes 0-0/1234"),
///     Some(ContentRange { span: Some((0, 0)), total: Some(1234) })
/// );
/// assert_eq!(
///     parse_content_range("bytes */1234"),
///     Some(ContentRange { span: None, total: Some(1234) })
/// );
/// ```
#[must_use]
pub fn parse_content_range(value: &str) -> Option<ContentRange> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let (span, total) = rest.rsplit_once('/')?;
    let total = match total.trim() {
        "*" => None,
        t => Some(t.parse::<u64>().ok()?),
    };
    let span = match span.trim() {
        "*" => None,
        s => {
            let (start, end) = s.split_once('-')?;
            let start = start.trim().parse::<u64>().ok()?;
            let end = end.trim().parse::<u64>().ok()?;
            if end < start {
                return None;
            }
            Some((start, end))
        }
    };
    Some(ContentRange { span, total })
}

/// Extracts the complete length from a `Content-Range` value.
#[must_use]
pub fn parse_total_from_content_range(value: &str) -> Option<u64> {
    parse_content_range(value)?.total
}

/// Picks the `If-Range` validator: `ETag` first, then `Last-Modified`.
#[must_use]
pub fn pick_validator(headers: &HeaderMap) -> Option<String> {
    [ETAG, LAST_MODIFIED].into_iter().find_map(|name| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    })
}

/// Reads the raw `Content-Length` header.
///
/// reqwest reports a zero body size for `HEAD` responses, so the header is
/// parsed directly.
pub(crate) fn header_content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
}

fn advertises_byte_ranges(headers: &HeaderMap) -> bool {
    headers
        .get(ACCEPT_RANGES)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.to_ascii_lowercase().contains("bytes"))
}

/// Probes `url` for range support, total length and a validator.
///
/// # Errors
///
/// Only [`DownloadError::Cancelled`] is returned. Any other failure of the
/// two probes yields [`RangeMeta::not_range_capable`].
#[instrument(skip(client, options, cancel), fields(url = %url))]
pub async fn probe_range_meta(
    client: &HttpClient,
    url: &Url,
    options: &DownloadOptions,
    cancel: &CancellationToken,
) -> Result<RangeMeta, DownloadError> {
    let head = client.request(Method::HEAD, url, options);
    match client.send(head, url, options.timeout(), cancel).await {
        Ok(response) => {
            log_response_summary(url, &response, None);
            if response.status().as_u16() < 400 {
                let headers = response.headers();
                let accept_ranges = advertises_byte_ranges(headers);
                let total_len = header_content_length(headers).filter(|len| *len > 0);
                if accept_ranges && total_len.is_some() {
                    debug!(?total_len, "HEAD announces byte ranges");
                    return Ok(RangeMeta {
                        total_len,
                        accept_ranges,
                        validator: pick_validator(headers),
                    });
                }
                debug!(accept_ranges, ?total_len, "HEAD insufficient, trying range probe");
            }
        }
        Err(e) if e.is_cancelled() => return Err(e),
        Err(e) => debug!(error = %e, "HEAD failed, trying range probe"),
    }

    let probe = client
        .request(Method::GET, url, options)
        .header(RANGE, "bytes=0-0");
    let response = match client.send(probe, url, options.timeout(), cancel).await {
        Ok(response) => response,
        Err(e) if e.is_cancelled() => return Err(e),
        Err(e) => {
            debug!(error = %e, "range probe failed, not range capable");
            return Ok(RangeMeta::not_range_capable());
        }
    };
    log_response_summary(url, &response, Some(0));

    if response.status() != StatusCode::PARTIAL_CONTENT {
        debug!(
            status = response.status().as_u16(),
            "range probe not honoured"
        );
        return Ok(RangeMeta::not_range_capable());
    }

    let headers = response.headers();
    let total_len = headers
        .get(reqwest::header::CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_total_from_content_range)
        .filter(|len| *len > 0);
    debug!(?total_len, "range probe honoured");
    Ok(RangeMeta {
        total_len,
        accept_ranges: true,
        validator: pick_validator(headers),
    })
}
