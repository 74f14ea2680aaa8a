//! Batch orchestration: many single-file downloads into one directory.
//!
//! [`DownloadEngine::download_all_to_dir_concurrent`] bounds the number of
//! files in flight with a semaphore; each file runs in its own Tokio task
//! and its failure is recorded by name without touching its siblings.
//! [`DownloadEngine::download_all_to_dir`] processes the same items one after
//! another.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use chunkfetch_core::download::{DownloadEngine, Downloader, NamedUrl};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = DownloadEngine::new(Downloader::default(), 4)?;
//! let items = vec![
//!     NamedUrl::new("a.bin", "https://example.com/a.bin"),
//!     NamedUrl::new("b.bin", "https://example.com/b.bin"),
//! ];
//! let result = engine
//!     .download_all_to_dir_concurrent(&items, Path::new("./downloads"))
//!     .await?;
//! println!("ok: {}, failed: {:?}", result.succeeded(), result.failed());
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::constants::{DEFAULT_MAX_CONCURRENT_FILES, MAX_CONCURRENT_FILES};
use super::downloader::{DownloadPhase, Downloader};
use super::error::{DownloadError, EngineError};
use super::filename::{FALLBACK_FILE_NAME, sanitize_file_name};
use super::options::DownloadOptions;
use super::request::DownloadRequest;

/// Minimum allowed concurrency value.
const MIN_CONCURRENCY: usize = 1;

/// One batch item: the file name to write and the URL to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedUrl {
    pub name: String,
    pub url: String,
}

impl NamedUrl {
    #[must_use]
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// Outcome of a batch: how many files landed, and which did not.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    succeeded: usize,
    failed: Vec<String>,
}

impl BatchResult {
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.succeeded
    }

    /// Names of the items that failed, in submission order.
    #[must_use]
    pub fn failed(&self) -> &[String] {
        &self.failed
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.succeeded + self.failed.len()
    }

    #[must_use]
    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty()
    }

    fn record_success(&mut self) {
        self.succeeded += 1;
    }

    fn record_failure(&mut self, name: impl Into<String>) {
        self.failed.push(name.into());
    }
}

/// Runs batches of downloads with a bounded number of files in flight.
#[derive(Debug, Clone)]
pub struct DownloadEngine {
    downloader: Downloader,
    max_concurrent_files: usize,
    options: DownloadOptions,
}

impl DownloadEngine {
    /// Creates an engine running at most `max_concurrent_files` downloads at
    /// once.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] if the value is outside
    /// `1..=64`.
    ///
    /// ```
    /// use chunkfetch_core::download::{DownloadEngine, Downloader};
    ///
    /// assert!(DownloadEngine::new(Downloader::default(), 8).is_ok());
    /// assert!(DownloadEngine::new(Downloader::default(), 0).is_err());
    /// ```
    pub fn new(downloader: Downloader, max_concurrent_files: usize) -> Result<Self, EngineError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENT_FILES).contains(&max_concurrent_files) {
            return Err(EngineError::InvalidConcurrency {
                value: max_concurrent_files,
                max: MAX_CONCURRENT_FILES,
            });
        }
        Ok(Self {
            downloader,
            max_concurrent_files,
            options: DownloadOptions::default(),
        })
    }

    /// Options applied to every file. `chunk_threads <= 1` selects the
    /// sequential transfer, anything above the chunked one.
    #[must_use]
    pub fn with_options(mut self, options: DownloadOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn max_concurrent_files(&self) -> usize {
        self.max_concurrent_files
    }

    #[must_use]
    pub fn options(&self) -> &DownloadOptions {
        &self.options
    }

    /// Downloads every item into `dir`, at most `max_concurrent_files` at a
    /// time, returning once every item has finished.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::CreateDir`] if `dir` cannot be created.
    /// Individual download failures never error; they are listed in the
    /// returned [`BatchResult`].
    #[instrument(skip(self, items), fields(dir = %dir.display(), items = items.len(), concurrency = self.max_concurrent_files))]
    pub async fn download_all_to_dir_concurrent(
        &self,
        items: &[NamedUrl],
        dir: &Path,
    ) -> Result<BatchResult, EngineError> {
        create_dir(dir).await?;
        let mut result = BatchResult::default();
        let mut jobs = Vec::with_capacity(items.len());
        for item in items {
            match self.prepare(item, dir) {
                Ok(job) => jobs.push(job),
                Err(name) => result.record_failure(name),
            }
        }

        let downloader = self.downloader.clone();
        let chunked = self.options.chunk_threads() > 1;
        let names: Vec<String> = jobs.iter().map(|job| job.name.clone()).collect();
        let outcomes = run_bounded(
            jobs,
            self.max_concurrent_files,
            self.downloader.cancellation_token(),
            move |job| {
                let downloader = downloader.clone();
                async move { run_job(&downloader, &job, chunked).await }
            },
        )
        .await;

        for (name, outcome) in names.into_iter().zip(outcomes) {
            match outcome {
                Some(Ok(())) => result.record_success(),
                Some(Err(_)) => result.record_failure(name),
                None => {
                    warn!(name = %name, "download did not run to completion");
                    result.record_failure(name);
                }
            }
        }

        info!(
            succeeded = result.succeeded(),
            failed = result.failed().len(),
            "batch complete"
        );
        Ok(result)
    }

    /// Downloads every item into `dir`, one after another.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::CreateDir`] if `dir` cannot be created.
    #[instrument(skip(self, items), fields(dir = %dir.display(), items = items.len()))]
    pub async fn download_all_to_dir(
        &self,
        items: &[NamedUrl],
        dir: &Path,
    ) -> Result<BatchResult, EngineError> {
        create_dir(dir).await?;
        let chunked = self.options.chunk_threads() > 1;
        let mut result = BatchResult::default();
        for item in items {
            match self.prepare(item, dir) {
                Ok(job) => match run_job(&self.downloader, &job, chunked).await {
                    Ok(()) => result.record_success(),
                    Err(_) => result.record_failure(job.name),
                },
                Err(name) => result.record_failure(name),
            }
        }
        info!(
            succeeded = result.succeeded(),
            failed = result.failed().len(),
            "batch complete"
        );
        Ok(result)
    }

    /// Validates one item, returning the name to record on failure.
    fn prepare(&self, item: &NamedUrl, dir: &Path) -> Result<Job, String> {
        if item.name.trim().is_empty() {
            warn!(url = %item.url, "batch item without a name");
            return Err(FALLBACK_FILE_NAME.to_string());
        }
        let target: PathBuf = dir.join(sanitize_file_name(&item.name));
        match DownloadRequest::new(&item.url, target) {
            Ok(request) => Ok(Job {
                name: item.name.clone(),
                request: request.with_options(self.options.clone()),
            }),
            Err(e) => {
                warn!(name = %item.name, error = %e, "skipping batch item");
                Err(item.name.clone())
            }
        }
    }
}

impl Default for DownloadEngine {
    fn default() -> Self {
        Self {
            downloader: Downloader::default(),
            max_concurrent_files: DEFAULT_MAX_CONCURRENT_FILES,
            options: DownloadOptions::default(),
        }
    }
}

#[derive(Debug)]
struct Job {
    name: String,
    request: DownloadRequest,
}

async fn run_job(downloader: &Downloader, job: &Job, chunked: bool) -> Result<(), DownloadError> {
    let outcome = if chunked {
        downloader.download_to_file_fast(&job.request).await
    } else {
        downloader.download_to_file(&job.request).await
    };
    match &outcome {
        Ok(()) => debug!(name = %job.name, "file done"),
        Err(e) => warn!(
            name = %job.name,
            url = %job.request.url(),
            phase = %DownloadPhase::Failed,
            error = %e,
            "download failed"
        ),
    }
    outcome
}

async fn create_dir(dir: &Path) -> Result<(), EngineError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| EngineError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })
}

/// Runs `task` for every item with at most `limit` running at once.
///
/// A permit is acquired before each task is spawned and released when the
/// task ends. Returns one entry per item in submission order, after every
/// spawned task has finished; `None` marks an item that panicked or never
/// started because `cancel` fired first.
pub(crate) async fn run_bounded<T, F, Fut>(
    items: Vec<T>,
    limit: usize,
    cancel: &CancellationToken,
    task: F,
) -> Vec<Option<Fut::Output>>
where
    T: Send + 'static,
    F: Fn(T) -> Fut,
    Fut: Future + Send + 'static,
    Fut::Output: Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(limit.max(MIN_CONCURRENCY)));
    let total = items.len();
    let mut handles = Vec::with_capacity(total);

    for item in items {
        let permit = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };
        let future = task(item);
        handles.push(tokio::spawn(async move {
            let _permit = permit;
            future.await
        }));
    }

    let mut outputs = Vec::with_capacity(total);
    for handle in handles {
        match handle.await {
            Ok(output) => outputs.push(Some(output)),
            Err(e) => {
                warn!(error = %e, "download task panicked");
                outputs.push(None);
            }
        }
    }
    outputs.resize_with(total, || None);
    outputs
}
