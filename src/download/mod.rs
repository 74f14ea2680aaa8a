//! Resumable, range-chunked file download engine.
//!
//! # Components
//!
//! - [`probe_range_meta`] - asks the server whether it honours byte ranges
//! - [`RetryPolicy`] - classifies failures and computes backoff delays
//! - [`plan_chunks`] - splits a known length into disjoint ranges
//! - [`Downloader`] - one file, sequential or chunked, published by rename
//! - [`DownloadEngine`] - many files under a concurrency ceiling
//!
//! # Example
//!
//! ```no_run
//! use chunkfetch_core::download::{DownloadRequest, Downloader, HttpClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let downloader = Downloader::new(HttpClient::new());
//! let request = DownloadRequest::new("https://example.com/big.iso", "./big.iso")?;
//! downloader.download_to_file_fast(&request).await?;
//! # Ok(())
//! # }
//! ```

mod attempt;
mod client;
pub mod constants;
mod downloader;
mod engine;
mod error;
mod filename;
mod options;
mod part_file;
mod plan;
mod probe;
mod progress;
mod request;
mod retry;
mod transfer;

pub use attempt::TransferAttempt;
pub use client::HttpClient;
pub use downloader::{DownloadPhase, Downloader};
pub use engine::{BatchResult, DownloadEngine, NamedUrl};
pub use error::{DownloadError, EngineError};
pub use filename::{FALLBACK_FILE_NAME, file_name_from_url, sanitize_file_name};
pub use options::DownloadOptions;
pub use part_file::{PartFile, PartFileGuard, commit_part_file, part_path_for, remove_part_file};
pub use plan::{ByteRange, ChunkPlan, plan_chunks};
pub use probe::{
    ContentRange, RangeMeta, parse_content_range, parse_total_from_content_range, pick_validator,
    probe_range_meta,
};
pub use progress::{format_bytes, format_speed};
pub use request::{DownloadRequest, resolve_url};
pub use retry::{FailureType, RetryDecision, RetryPolicy, classify_error, parse_retry_after};
