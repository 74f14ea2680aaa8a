//! The temporary `<target>.part` file and its publication to the target path.
//!
//! Writes are positioned (`pwrite` on Unix, `seek_write` on Windows) so any
//! number of range transfers can share one handle and write their disjoint
//! ranges without a lock. File calls run on the blocking pool.

use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use super::constants::PART_SUFFIX;
use super::error::DownloadError;

/// Returns `<target>.part` in the same directory as `target`.
#[must_use]
pub fn part_path_for(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map_or_else(|| OsString::from("file"), OsString::from);
    name.push(PART_SUFFIX);
    target.with_file_name(name)
}

/// Shared handle to a `.part` file.
#[derive(Debug, Clone)]
pub struct PartFile {
    path: PathBuf,
    file: Arc<std::fs::File>,
}

impl PartFile {
    /// Creates (or truncates) the file and preallocates `len` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Io`] if the file cannot be created or sized.
    pub async fn create_preallocated(path: &Path, len: u64) -> Result<Self, DownloadError> {
        let part = Self::create_truncated(path).await?;
        part.set_len(len).await?;
        Ok(part)
    }

    /// Creates the file, truncating any previous content.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Io`] if the file cannot be created.
    pub async fn create_truncated(path: &Path) -> Result<Self, DownloadError> {
        let owned = path.to_path_buf();
        let file = run_blocking(path, move || {
            std::fs::OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&owned)
        })
        .await?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Arc::new(file),
        })
    }

    /// Opens an existing file without truncating it, returning its length.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Io`] if the file cannot be opened.
    pub async fn open_existing(path: &Path) -> Result<(Self, u64), DownloadError> {
        let owned = path.to_path_buf();
        let file = run_blocking(path, move || {
            std::fs::OpenOptions::new().write(true).open(&owned)
        })
        .await?;
        let part = Self {
            path: path.to_path_buf(),
            file: Arc::new(file),
        };
        let len = part.len().await?;
        Ok((part, len))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current length of the file on disk.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Io`] if metadata cannot be read.
    pub async fn len(&self) -> Result<u64, DownloadError> {
        let file = Arc::clone(&self.file);
        run_blocking(&self.path, move || file.metadata().map(|m| m.len())).await
    }

    /// Resizes the file; `set_len(0)` discards everything written so far.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Io`] if the file cannot be resized.
    pub async fn set_len(&self, len: u64) -> Result<(), DownloadError> {
        let file = Arc::clone(&self.file);
        run_blocking(&self.path, move || file.set_len(len)).await
    }

    /// Writes all of `data` starting at absolute `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Io`] on any write failure.
    pub async fn write_at(&self, offset: u64, data: Vec<u8>) -> Result<(), DownloadError> {
        let file = Arc::clone(&self.file);
        run_blocking(&self.path, move || write_all_at(&file, &data, offset)).await
    }

    /// Flushes file content to disk.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Io`] if the sync fails.
    pub async fn sync(&self) -> Result<(), DownloadError> {
        let file = Arc::clone(&self.file);
        run_blocking(&self.path, move || file.sync_all()).await
    }
}

#[cfg(unix)]
fn write_all_at(file: &std::fs::File, data: &[u8], offset: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(data, offset)
}

#[cfg(windows)]
fn write_all_at(file: &std::fs::File, mut data: &[u8], mut offset: u64) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !data.is_empty() {
        match file.seek_write(data, offset) {
            Ok(0) => return Err(std::io::Error::from(ErrorKind::WriteZero)),
            Ok(n) => {
                data = &data[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

async fn run_blocking<T, F>(path: &Path, op: F) -> Result<T, DownloadError>
where
    T: Send + 'static,
    F: FnOnce() -> std::io::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(std::io::Error::other)
        .and_then(|result| result)
        .map_err(|e| DownloadError::io(path, e))
}

/// Removes the `.part` file when dropped, unless disarmed.
///
/// Covers every exit path of a download future: errors, cancellation and
/// the future simply being dropped.
#[derive(Debug)]
pub struct PartFileGuard {
    path: PathBuf,
    armed: bool,
}

impl PartFileGuard {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            armed: true,
        }
    }

    /// Keeps the file; called once it has been published.
    pub fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PartFileGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "removed part file"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to remove part file"),
        }
    }
}

/// Deletes a `.part` file, ignoring a missing one.
///
/// # Errors
///
/// Returns [`DownloadError::Io`] for any other failure.
pub async fn remove_part_file(path: &Path) -> Result<(), DownloadError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(DownloadError::io(path, e)),
    }
}

/// Publishes a completed `.part` file at `target`, replacing it.
///
/// A rename is the publish point. Only when the platform refuses the rename
/// across devices is the file copied and the source removed.
///
/// # Errors
///
/// Returns [`DownloadError::Io`] if neither the rename nor the copy succeeds.
pub async fn commit_part_file(part: &Path, target: &Path) -> Result<(), DownloadError> {
    match tokio::fs::rename(part, target).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::CrossesDevices => {
            debug!(
                part = %part.display(),
                target = %target.display(),
                "rename across devices refused, copying"
            );
            tokio::fs::copy(part, target)
                .await
                .map_err(|e| DownloadError::io(target, e))?;
            remove_part_file(part).await
        }
        Err(e) => Err(DownloadError::io(target, e)),
    }
}
