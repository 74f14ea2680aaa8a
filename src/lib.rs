//! Chunkfetch Core Library
//!
//! A download engine that fetches files reliably over unreliable networks:
//! it probes servers for byte-range support, splits large files into
//! concurrent range transfers, resumes interrupted transfers, retries
//! transient failures with backoff and runs batches under a concurrency
//! ceiling.
//!
//! # Architecture
//!
//! - [`download`] - the engine (probe, plan, transfer, commit, batch)

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod download;

// Re-export commonly used types
pub use download::{
    BatchResult, DownloadEngine, DownloadError, DownloadOptions, DownloadRequest, Downloader,
    EngineError, HttpClient, NamedUrl, RetryPolicy,
};
