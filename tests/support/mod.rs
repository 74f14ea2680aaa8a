//! Shared utilities for socket-bound integration tests.
//!
//! [`RangeServer`] is a wiremock responder serving one in-memory resource
//! the way a real file server would: it honours `Range` and `If-Range`,
//! answers `416` past the end, and can inject failures. [`RawResource`]
//! covers the connection-level behaviour wiremock cannot produce.

#![allow(dead_code)]

pub mod loopback;
pub mod raw_http;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

pub use loopback::start_mock_server_or_skip;
pub use raw_http::RawResource;

/// Deterministic, non-repeating-looking test payload of `len` bytes.
#[must_use]
pub fn test_body(len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| u8::try_from((i * 31 + i / 251) % 251).unwrap_or(0))
        .collect()
}

/// Counters and request log shared between a [`RangeServer`] and the test.
#[derive(Debug, Default)]
pub struct ServerLog {
    hits: AtomicUsize,
    ranges: Mutex<Vec<Option<String>>>,
    if_ranges: Mutex<Vec<Option<String>>>,
}

impl ServerLog {
    #[must_use]
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// `Range` header of every GET, in arrival order.
    #[must_use]
    pub fn ranges(&self) -> Vec<Option<String>> {
        self.ranges.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// `If-Range` header of every GET, in arrival order.
    #[must_use]
    pub fn if_ranges(&self) -> Vec<Option<String>> {
        self.if_ranges.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Range requests other than the `bytes=0-0` capability probe.
    #[must_use]
    pub fn transfer_ranges(&self) -> Vec<String> {
        self.ranges()
            .into_iter()
            .flatten()
            .filter(|r| r != "bytes=0-0")
            .collect()
    }
}

/// Responder serving `body` with optional range support.
#[derive(Clone)]
pub struct RangeServer {
    body: Arc<Vec<u8>>,
    etag: Option<String>,
    honor_ranges: bool,
    fail_first: usize,
    fail_status: u16,
    retry_after: Option<String>,
    delay: Option<Duration>,
    log: Arc<ServerLog>,
}

impl RangeServer {
    #[must_use]
    pub fn new(body: Vec<u8>) -> Self {
        Self {
            body: Arc::new(body),
            etag: None,
            honor_ranges: true,
            fail_first: 0,
            fail_status: 503,
            retry_after: None,
            delay: None,
            log: Arc::new(ServerLog::default()),
        }
    }

    #[must_use]
    pub fn with_etag(mut self, etag: &str) -> Self {
        self.etag = Some(etag.to_string());
        self
    }

    /// Serves `200` with the whole body regardless of `Range`.
    #[must_use]
    pub fn ignoring_ranges(mut self) -> Self {
        self.honor_ranges = false;
        self
    }

    /// Fails the first `count` GET requests with `status`.
    #[must_use]
    pub fn failing_first(mut self, count: usize, status: u16) -> Self {
        self.fail_first = count;
        self.fail_status = status;
        self
    }

    #[must_use]
    pub fn with_retry_after(mut self, value: &str) -> Self {
        self.retry_after = Some(value.to_string());
        self
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    #[must_use]
    pub fn log(&self) -> Arc<ServerLog> {
        Arc::clone(&self.log)
    }

    /// Mounts this responder for `GET route` on `server`.
    pub async fn mount(self, server: &MockServer, route: &str) -> Arc<ServerLog> {
        let log = self.log();
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(self)
            .mount(server)
            .await;
        log
    }

    fn header(request: &Request, name: &str) -> Option<String> {
        request
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    fn full(&self) -> ResponseTemplate {
        let mut template = ResponseTemplate::new(200).set_body_bytes(self.body.as_slice());
        if self.honor_ranges {
            template = template.insert_header("Accept-Ranges", "bytes");
        }
        if let Some(etag) = &self.etag {
            template = template.insert_header("ETag", etag.as_str());
        }
        template
    }

    fn partial(&self, range: &str) -> ResponseTemplate {
        let total = self.body.len() as u64;
        let Some((start, end)) = parse_range(range, total) else {
            return ResponseTemplate::new(416)
                .insert_header("Content-Range", format!("bytes */{total}").as_str());
        };
        let (start_idx, end_idx) = (
            usize::try_from(start).unwrap_or(usize::MAX),
            usize::try_from(end).unwrap_or(usize::MAX),
        );
        let mut template = ResponseTemplate::new(206)
            .insert_header("Accept-Ranges", "bytes")
            .insert_header(
                "Content-Range",
                format!("bytes {start}-{end}/{total}").as_str(),
            )
            .set_body_bytes(&self.body[start_idx..=end_idx]);
        if let Some(etag) = &self.etag {
            template = template.insert_header("ETag", etag.as_str());
        }
        template
    }
}

/// Parses `bytes=a-b` or `bytes=a-` against `total`; `None` when unsatisfiable.
fn parse_range(value: &str, total: u64) -> Option<(u64, u64)> {
    let set = value.strip_prefix("bytes=")?;
    let (start, end) = set.split_once('-')?;
    let start: u64 = start.trim().parse().ok()?;
    if start >= total {
        return None;
    }
    let end = match end.trim() {
        "" => total - 1,
        e => e.parse::<u64>().ok()?.min(total - 1),
    };
    (start <= end).then_some((start, end))
}

impl Respond for RangeServer {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let n = self.log.hits.fetch_add(1, Ordering::SeqCst);
        let range = Self::header(request, "range");
        let if_range = Self::header(request, "if-range");
        if let Ok(mut ranges) = self.log.ranges.lock() {
            ranges.push(range.clone());
        }
        if let Ok(mut if_ranges) = self.log.if_ranges.lock() {
            if_ranges.push(if_range.clone());
        }

        let template = if n < self.fail_first {
            let mut failure = ResponseTemplate::new(self.fail_status);
            if let Some(retry_after) = &self.retry_after {
                failure = failure.insert_header("Retry-After", retry_after.as_str());
            }
            failure
        } else {
            let validator_matches = match (&if_range, &self.etag) {
                (Some(sent), Some(current)) => sent == current,
                (Some(_), None) => false,
                (None, _) => true,
            };
            match range {
                Some(range) if self.honor_ranges && validator_matches => self.partial(&range),
                _ => self.full(),
            }
        };

        match self.delay {
            Some(delay) => template.set_delay(delay),
            None => template,
        }
    }
}

