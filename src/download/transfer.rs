//! Part transfer: the attempt loops that stream response bodies into the
//! `.part` file.
//!
//! Two flavours share one streaming routine:
//! - the whole-file transfer, which resumes from the current `.part`
//!   length on every retry and restarts from zero when the server refuses
//!   or ignores the resume;
//! - the range transfer, which writes exactly one planned range and treats
//!   anything but `206` as a protocol mismatch.

use futures_util::StreamExt;
use reqwest::header::{CONTENT_RANGE, IF_RANGE, RANGE};
use reqwest::{Method, Response, StatusCode};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use url::Url;

use super::attempt::TransferAttempt;
use super::client::{HttpClient, log_response_summary, status_error};
use super::constants::COPY_BUFFER_SIZE;
use super::error::DownloadError;
use super::part_file::PartFile;
use super::plan::ByteRange;
use super::probe::{ContentRange, header_content_length, parse_content_range};
use super::progress::ProgressLog;
use super::request::DownloadRequest;
use super::retry::RetryDecision;

/// Result of one whole-file attempt that did not fail.
#[derive(Debug, PartialEq, Eq)]
enum WholeOutcome {
    /// The `.part` file holds the complete body of this many bytes.
    Complete(u64),
    /// Local data was discarded; the next request starts at byte zero.
    Restart,
}

/// Everything one download's transfers share.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Transfer<'a> {
    pub(crate) client: &'a HttpClient,
    pub(crate) request: &'a DownloadRequest,
    pub(crate) cancel: &'a CancellationToken,
}

impl Transfer<'_> {
    fn url(&self) -> &Url {
        self.request.url()
    }

    /// Downloads the whole resource into `part`, starting with `first`.
    ///
    /// Returns the final length of the `.part` file.
    #[instrument(skip_all, fields(url = %self.url(), resume_from = first.resume_from()))]
    pub(crate) async fn whole(
        &self,
        part: &PartFile,
        first: TransferAttempt,
    ) -> Result<u64, DownloadError> {
        let policy = self.request.options().retry_policy();
        let mut attempt = first;
        loop {
            let (seen, result) = self.whole_attempt(part, attempt).await;
            attempt = seen;
            let error = match result {
                Ok(WholeOutcome::Complete(len)) => return Ok(len),
                Ok(WholeOutcome::Restart) => {
                    attempt = attempt.restarted();
                    continue;
                }
                Err(e) => e,
            };

            match policy.should_retry(&error, attempt.index()) {
                RetryDecision::Retry {
                    delay,
                    attempt: next,
                } => {
                    warn!(
                        attempt = attempt.index(),
                        next_attempt = next,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %error,
                        "transfer failed, retrying"
                    );
                    self.backoff(delay).await?;
                    let resume_from = part.len().await?;
                    attempt = attempt.next(resume_from);
                }
                RetryDecision::DoNotRetry { reason } => {
                    debug!(attempt = attempt.index(), %reason, "giving up");
                    return Err(error);
                }
            }
        }
    }

    /// Runs one attempt, returning the attempt refreshed with the validator
    /// the server sent, if any.
    async fn whole_attempt(
        &self,
        part: &PartFile,
        attempt: TransferAttempt,
    ) -> (TransferAttempt, Result<WholeOutcome, DownloadError>) {
        let response = match self.open_whole(&attempt).await {
            Ok(response) => response,
            Err(e) => return (attempt, Err(e)),
        };
        let attempt = attempt.with_validator(super::probe::pick_validator(response.headers()));
        let result = self.consume_whole(part, &attempt, response).await;
        (attempt, result)
    }

    async fn open_whole(&self, attempt: &TransferAttempt) -> Result<Response, DownloadError> {
        let options = self.request.options();
        let mut builder = self.client.request(Method::GET, self.url(), options);
        if let Some(range) = attempt.range_header() {
            builder = builder.header(RANGE, range);
            if let Some(validator) = attempt.if_range_header() {
                builder = builder.header(IF_RANGE, validator);
            }
        }
        let response = self
            .client
            .send(builder, self.url(), options.timeout(), self.cancel)
            .await?;
        log_response_summary(
            self.url(),
            &response,
            attempt.is_resume().then_some(attempt.resume_from()),
        );
        Ok(response)
    }

    async fn consume_whole(
        &self,
        part: &PartFile,
        attempt: &TransferAttempt,
        response: Response,
    ) -> Result<WholeOutcome, DownloadError> {
        let status = response.status();
        let resume_from = attempt.resume_from();
        let content_range = content_range(&response);

        let (offset, expected_total) = match status {
            StatusCode::RANGE_NOT_SATISFIABLE if attempt.is_resume() => {
                if content_range.and_then(|r| r.total) == Some(resume_from) {
                    debug!(resume_from, "part file already holds the whole resource");
                    return Ok(WholeOutcome::Complete(resume_from));
                }
                debug!(resume_from, "resume range not satisfiable, restarting from zero");
                part.set_len(0).await?;
                return Ok(WholeOutcome::Restart);
            }
            StatusCode::PARTIAL_CONTENT if attempt.is_resume() => {
                match content_range.and_then(|r| r.span) {
                    Some((start, _)) if start == resume_from => {
                        (resume_from, content_range.and_then(|r| r.total))
                    }
                    span => {
                        debug!(?span, resume_from, "partial response does not continue the part file, restarting");
                        part.set_len(0).await?;
                        return Ok(WholeOutcome::Restart);
                    }
                }
            }
            StatusCode::PARTIAL_CONTENT => (0, content_range.and_then(|r| r.total)),
            s if s.is_success() => {
                if attempt.is_resume() {
                    debug!(resume_from, "server ignored the range, rewriting from zero");
                    part.set_len(0).await?;
                }
                (0, header_content_length(response.headers()))
            }
            _ => return Err(status_error(self.url(), &response)),
        };

        let content_length = header_content_length(response.headers());
        let mut progress =
            ProgressLog::new(self.url().as_str(), expected_total).starting_at(offset);
        let written = self
            .stream_body_at(response, part, offset, content_length, &mut progress)
            .await?;

        if let Some(expected) = content_length
            && written != expected
        {
            return Err(DownloadError::size_mismatch(
                self.url().as_str(),
                expected,
                written,
            ));
        }
        let final_len = offset + written;
        if let Some(total) = expected_total
            && final_len != total
        {
            return Err(DownloadError::size_mismatch(
                self.url().as_str(),
                total,
                final_len,
            ));
        }
        Ok(WholeOutcome::Complete(final_len))
    }

    /// Downloads exactly `range` into `part` at its absolute offset.
    #[instrument(skip_all, fields(url = %self.url(), part = index, range = %range))]
    pub(crate) async fn range(
        &self,
        part: &PartFile,
        index: usize,
        range: ByteRange,
        validator: Option<String>,
    ) -> Result<(), DownloadError> {
        let policy = self.request.options().retry_policy();
        let mut attempt = TransferAttempt::first(validator);
        loop {
            let error = match self.range_attempt(part, index, range, &attempt).await {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };
            match policy.should_retry(&error, attempt.index()) {
                RetryDecision::Retry {
                    delay,
                    attempt: next,
                } => {
                    warn!(
                        attempt = attempt.index(),
                        next_attempt = next,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %error,
                        "part failed, retrying"
                    );
                    self.backoff(delay).await?;
                    attempt = attempt.next(0);
                }
                RetryDecision::DoNotRetry { reason } => {
                    debug!(attempt = attempt.index(), %reason, "part giving up");
                    return Err(error);
                }
            }
        }
    }

    async fn range_attempt(
        &self,
        part: &PartFile,
        index: usize,
        range: ByteRange,
        attempt: &TransferAttempt,
    ) -> Result<(), DownloadError> {
        let options = self.request.options();
        let mut builder = self
            .client
            .request(Method::GET, self.url(), options)
            .header(RANGE, range.header_value());
        if let Some(validator) = attempt.validator() {
            builder = builder.header(IF_RANGE, validator);
        }
        let response = self
            .client
            .send(builder, self.url(), options.timeout(), self.cancel)
            .await?;
        log_response_summary(self.url(), &response, Some(range.start));

        let status = response.status();
        if status != StatusCode::PARTIAL_CONTENT {
            if status.is_client_error() || status.is_server_error() {
                return Err(status_error(self.url(), &response));
            }
            return Err(DownloadError::range_not_honored(
                self.url().as_str(),
                status.as_u16(),
            ));
        }
        if let Some(served) = content_range(&response).and_then(|r| r.span)
            && served != (range.start, range.end)
        {
            debug!(?served, "server answered with a different range");
            return Err(DownloadError::range_not_honored(
                self.url().as_str(),
                status.as_u16(),
            ));
        }

        let expected = range.len();
        let mut progress = ProgressLog::new(format!("{} part {index}", self.url()), Some(expected));
        let written = self
            .stream_body_at(response, part, range.start, Some(expected), &mut progress)
            .await?;
        if written != expected {
            return Err(DownloadError::size_mismatch(
                self.url().as_str(),
                expected,
                written,
            ));
        }
        Ok(())
    }

    /// Streams the body into `part` starting at `start`, coalescing reads
    /// into buffers of [`COPY_BUFFER_SIZE`] before each positioned write.
    ///
    /// Every read is bounded by the request timeout and raced against
    /// cancellation. Reading more than `limit` bytes fails immediately so a
    /// misbehaving server can never write past its range.
    async fn stream_body_at(
        &self,
        response: Response,
        part: &PartFile,
        start: u64,
        limit: Option<u64>,
        progress: &mut ProgressLog,
    ) -> Result<u64, DownloadError> {
        let url = self.url().as_str();
        let timeout = self.request.options().timeout();
        let mut stream = response.bytes_stream();
        let mut buffer = Vec::with_capacity(COPY_BUFFER_SIZE);
        let mut flushed_to = start;
        let mut written: u64 = 0;

        loop {
            let next = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Err(DownloadError::cancelled(url)),
                next = tokio::time::timeout(timeout, stream.next()) => next,
            };
            let chunk = match next {
                Err(_) => return Err(DownloadError::timeout(url)),
                Ok(None) => break,
                Ok(Some(Err(e))) if e.is_timeout() => return Err(DownloadError::timeout(url)),
                Ok(Some(Err(e))) => return Err(DownloadError::network(url, e)),
                Ok(Some(Ok(chunk))) => chunk,
            };

            written += chunk.len() as u64;
            if let Some(limit) = limit
                && written > limit
            {
                return Err(DownloadError::size_mismatch(url, limit, written));
            }
            buffer.extend_from_slice(&chunk);
            if buffer.len() >= COPY_BUFFER_SIZE {
                let data = std::mem::replace(&mut buffer, Vec::with_capacity(COPY_BUFFER_SIZE));
                let len = data.len() as u64;
                part.write_at(flushed_to, data).await?;
                flushed_to += len;
                progress.record(written);
            }
        }

        if !buffer.is_empty() {
            part.write_at(flushed_to, buffer).await?;
        }
        progress.finish(written);
        Ok(written)
    }

    async fn backoff(&self, delay: std::time::Duration) -> Result<(), DownloadError> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(DownloadError::cancelled(self.url().as_str())),
            () = tokio::time::sleep(delay) => Ok(()),
        }
    }
}

fn content_range(response: &Response) -> Option<ContentRange> {
    response
        .headers()
        .get(CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_content_range)
}
