//! Single-file orchestration.
//!
//! [`Downloader::download_to_file`] is the sequential, resumable path.
//! [`Downloader::download_to_file_fast`] walks the states
//! `Probing -> Planning -> Transferring -> Committing -> Done` and falls
//! back to the sequential path when probing rules out chunking or when any
//! part of a chunked transfer fails.

use std::fmt;
use std::path::{Path, PathBuf};

use futures_util::future::try_join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::attempt::TransferAttempt;
use super::client::HttpClient;
use super::error::DownloadError;
use super::filename::sanitize_file_name;
use super::options::DownloadOptions;
use super::part_file::{PartFile, PartFileGuard, commit_part_file, remove_part_file};
use super::plan::{ByteRange, ChunkPlan, plan_chunks};
use super::probe::{RangeMeta, probe_range_meta};
use super::progress::format_bytes;
use super::request::DownloadRequest;
use super::transfer::Transfer;

/// States of a single-file download, logged as it progresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadPhase {
    Probing,
    Planning,
    Transferring,
    Committing,
    Done,
    Failed,
}

impl fmt::Display for DownloadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Probing => "probing",
            Self::Planning => "planning",
            Self::Transferring => "transferring",
            Self::Committing => "committing",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Downloads single files over an injected [`HttpClient`].
///
/// Cloning is cheap; clones share the client's connection pool and the
/// cancellation token.
#[derive(Debug, Clone, Default)]
pub struct Downloader {
    client: HttpClient,
    cancel: CancellationToken,
}

impl Downloader {
    #[must_use]
    pub fn new(client: HttpClient) -> Self {
        Self {
            client,
            cancel: CancellationToken::new(),
        }
    }

    /// Uses `cancel` to interrupt every in-flight request, body read and
    /// backoff sleep of this downloader.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn client(&self) -> &HttpClient {
        &self.client
    }

    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    fn transfer<'a>(&'a self, request: &'a DownloadRequest) -> Transfer<'a> {
        Transfer {
            client: &self.client,
            request,
            cancel: &self.cancel,
        }
    }

    /// Sequential, resumable whole-file download.
    ///
    /// A `.part` file left behind by an interrupted earlier run is continued
    /// when the server supports ranges and supplies a validator; otherwise
    /// the download starts over. The target only appears once complete.
    ///
    /// # Errors
    ///
    /// Returns the last [`DownloadError`] once retries are exhausted or a
    /// permanent failure occurs. The `.part` file is removed on every error.
    #[instrument(skip_all, fields(url = %request.url(), target = %request.target().display()))]
    pub async fn download_to_file(&self, request: &DownloadRequest) -> Result<(), DownloadError> {
        ensure_parent_dir(request.target()).await?;
        let part_path = request.part_path();
        let guard = PartFileGuard::new(&part_path);

        let (part, first) = self.open_sequential(request, &part_path).await?;
        debug!(phase = %DownloadPhase::Transferring, resume_from = first.resume_from(), "sequential transfer");
        let len = self.transfer(request).whole(&part, first).await?;

        self.commit(&part, request.target(), guard).await?;
        info!(size = %format_bytes(len), "download complete");
        Ok(())
    }

    /// Opens the `.part` file for a sequential transfer, continuing a stale
    /// one when that is safe.
    async fn open_sequential(
        &self,
        request: &DownloadRequest,
        part_path: &Path,
    ) -> Result<(PartFile, TransferAttempt), DownloadError> {
        let stale_len = match tokio::fs::metadata(part_path).await {
            Ok(meta) if meta.is_file() => meta.len(),
            _ => 0,
        };
        if stale_len > 0 {
            debug!(phase = %DownloadPhase::Probing, stale_len, "found part file from an earlier run");
            let meta =
                probe_range_meta(&self.client, request.url(), request.options(), &self.cancel)
                    .await?;
            if meta.accept_ranges
                && let Some(validator) = meta.validator
            {
                let (part, len) = PartFile::open_existing(part_path).await?;
                info!(resume_from = %format_bytes(len), "resuming earlier download");
                return Ok((part, TransferAttempt::resuming(len, Some(validator))));
            }
            debug!("part file cannot be resumed safely, starting over");
        }
        let part = PartFile::create_truncated(part_path).await?;
        Ok((part, TransferAttempt::first(None)))
    }

    /// Chunked download when the server allows it, sequential otherwise.
    ///
    /// Any failure of the chunked strategy (protocol mismatch, a part
    /// running out of retries, a size mismatch) discards the `.part` file
    /// and reruns the download sequentially once.
    ///
    /// # Errors
    ///
    /// Returns the error of the sequential path, or
    /// [`DownloadError::Cancelled`] as soon as cancellation is observed.
    #[instrument(skip_all, fields(url = %request.url(), target = %request.target().display()))]
    pub async fn download_to_file_fast(
        &self,
        request: &DownloadRequest,
    ) -> Result<(), DownloadError> {
        let options = request.options();
        debug!(phase = %DownloadPhase::Probing);
        let meta =
            probe_range_meta(&self.client, request.url(), options, &self.cancel).await?;
        debug!(
            accept_ranges = meta.accept_ranges,
            total_len = ?meta.total_len,
            has_validator = meta.validator.is_some(),
            "range metadata"
        );

        debug!(phase = %DownloadPhase::Planning);
        let plan = plan_chunks(
            meta.chunkable_len(),
            options.chunk_threads(),
            options.min_size_for_chunking(),
            options.effective_min_part_size(),
        );
        let ranges = match plan {
            ChunkPlan::Chunked(ranges) => ranges,
            ChunkPlan::Sequential { total } => {
                debug!(?total, "not chunking");
                return self.download_to_file(request).await;
            }
        };

        match self.download_chunked(request, &meta, &ranges).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_cancelled() => Err(e),
            Err(e) => {
                warn!(error = %e, "chunked download failed, falling back to sequential");
                self.download_to_file(request).await
            }
        }
    }

    async fn download_chunked(
        &self,
        request: &DownloadRequest,
        meta: &RangeMeta,
        ranges: &[ByteRange],
    ) -> Result<(), DownloadError> {
        let total = ranges.last().map_or(0, |r| r.end + 1);
        ensure_parent_dir(request.target()).await?;
        let part_path = request.part_path();
        remove_part_file(&part_path).await?;
        let guard = PartFileGuard::new(&part_path);

        debug!(
            phase = %DownloadPhase::Transferring,
            parts = ranges.len(),
            total = %format_bytes(total),
            "chunked transfer"
        );
        let part = PartFile::create_preallocated(&part_path, total).await?;
        let transfer = self.transfer(request);
        try_join_all(
            ranges
                .iter()
                .enumerate()
                .map(|(index, range)| transfer.range(&part, index, *range, meta.validator.clone())),
        )
        .await?;

        let written = part.len().await?;
        if written != total {
            return Err(DownloadError::size_mismatch(
                request.url().as_str(),
                total,
                written,
            ));
        }
        self.commit(&part, request.target(), guard).await?;
        info!(parts = ranges.len(), size = %format_bytes(total), "download complete");
        Ok(())
    }

    async fn commit(
        &self,
        part: &PartFile,
        target: &Path,
        guard: PartFileGuard,
    ) -> Result<(), DownloadError> {
        debug!(phase = %DownloadPhase::Committing);
        part.sync().await?;
        commit_part_file(part.path(), target).await?;
        guard.disarm();
        debug!(phase = %DownloadPhase::Done);
        Ok(())
    }

    /// Sequential download of `url` into `dir` under a sanitized `name`.
    ///
    /// Creates `dir` if missing and returns the final path.
    ///
    /// # Errors
    ///
    /// See [`Self::download_to_file`].
    pub async fn download_to_dir(
        &self,
        url: &str,
        dir: &Path,
        name: &str,
        options: &DownloadOptions,
    ) -> Result<PathBuf, DownloadError> {
        let request = dir_request(url, dir, name, options).await?;
        self.download_to_file(&request).await?;
        Ok(request.target().to_path_buf())
    }

    /// Like [`Self::download_to_dir`], using the chunked path.
    ///
    /// # Errors
    ///
    /// See [`Self::download_to_file_fast`].
    pub async fn download_to_dir_fast(
        &self,
        url: &str,
        dir: &Path,
        name: &str,
        options: &DownloadOptions,
    ) -> Result<PathBuf, DownloadError> {
        let request = dir_request(url, dir, name, options).await?;
        self.download_to_file_fast(&request).await?;
        Ok(request.target().to_path_buf())
    }
}

async fn dir_request(
    url: &str,
    dir: &Path,
    name: &str,
    options: &DownloadOptions,
) -> Result<DownloadRequest, DownloadError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| DownloadError::io(dir, e))?;
    let target = dir.join(sanitize_file_name(name));
    Ok(DownloadRequest::new(url, target)?.with_options(options.clone()))
}

async fn ensure_parent_dir(target: &Path) -> Result<(), DownloadError> {
    match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| DownloadError::io(parent, e)),
        _ => Ok(()),
    }
}
