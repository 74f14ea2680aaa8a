//! Constants for the download module (timeouts, chunking, retry tuning).

use std::time::Duration;

/// Default HTTP connect timeout (20 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 20;

/// Default per-request deadline: time to response headers, and the longest
/// allowed gap between two body reads.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of files a batch downloads at the same time.
pub const DEFAULT_MAX_CONCURRENT_FILES: usize = 8;

/// Upper bound accepted for the batch concurrency.
pub const MAX_CONCURRENT_FILES: usize = 64;

/// Default number of concurrent range connections for one file.
pub const DEFAULT_CHUNK_THREADS: usize = 4;

/// Resources smaller than this are always fetched sequentially (8 MiB).
pub const DEFAULT_MIN_SIZE_FOR_CHUNKING: u64 = 8 * 1024 * 1024;

/// Default minimum size of one chunk (2 MiB).
pub const DEFAULT_MIN_PART_SIZE: u64 = 2 * 1024 * 1024;

/// Absolute floor for the minimum part size (256 KiB).
pub const MIN_PART_SIZE_FLOOR: u64 = 256 * 1024;

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Base delay of the exponential backoff.
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_millis(350);

/// Cap of the exponential backoff.
pub const DEFAULT_RETRY_MAX_DELAY: Duration = Duration::from_secs(8);

/// Cap applied to server supplied Retry-After hints.
pub const DEFAULT_RETRY_AFTER_CAP: Duration = Duration::from_secs(30);

/// Size of the buffer coalescing body chunks before a positioned write (64 KiB).
pub const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Minimum interval between two debug progress lines of one transfer.
pub const PROGRESS_LOG_INTERVAL: Duration = Duration::from_secs(1);

/// Suffix of the temporary sibling file a download writes into.
pub const PART_SUFFIX: &str = ".part";

/// User-Agent sent with every request.
pub const USER_AGENT: &str = concat!("chunkfetch/", env!("CARGO_PKG_VERSION"));
