//! The immutable input of one single-file download.

use std::path::{Path, PathBuf};

use url::Url;

use super::error::DownloadError;
use super::options::DownloadOptions;
use super::part_file::part_path_for;

/// A URL, the final target path, and the options applying to the transfer.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    url: Url,
    target: PathBuf,
    options: DownloadOptions,
}

impl DownloadRequest {
    /// Parses `url` and pairs it with a target path and default options.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::InvalidUrl`] if the URL does not parse or is
    /// not `http`/`https`.
    pub fn new(url: &str, target: impl Into<PathBuf>) -> Result<Self, DownloadError> {
        let parsed = Url::parse(url.trim()).map_err(|_| DownloadError::invalid_url(url))?;
        Self::from_url(parsed, target)
    }

    /// Builds a request from an already parsed URL.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::InvalidUrl`] for schemes other than `http`/`https`.
    pub fn from_url(url: Url, target: impl Into<PathBuf>) -> Result<Self, DownloadError> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(DownloadError::invalid_url(url.as_str()));
        }
        Ok(Self {
            url,
            target: target.into(),
            options: DownloadOptions::default(),
        })
    }

    #[must_use]
    pub fn with_options(mut self, options: DownloadOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    #[must_use]
    pub fn target(&self) -> &Path {
        &self.target
    }

    #[must_use]
    pub fn options(&self) -> &DownloadOptions {
        &self.options
    }

    /// Sibling `<target>.part` file the transfer writes into.
    #[must_use]
    pub fn part_path(&self) -> PathBuf {
        part_path_for(&self.target)
    }
}

/// Resolves `path_or_url` against a server root.
///
/// Absolute `http(s)://` URLs are returned as-is; `/a/b` and `a/b` both
/// resolve against the root of `server`.
///
/// ```
/// use chunkfetch_core::download::resolve_url;
/// use url::Url;
///
/// let server = Url::parse("https://cdn.example.com/api/").unwrap();
/// assert_eq!(
///     resolve_url(&server, "files/a.bin").unwrap().as_str(),
///     "https://cdn.example.com/files/a.bin"
/// );
/// ```
///
/// # Errors
///
/// Returns [`DownloadError::InvalidUrl`] when the result is not a valid URL.
pub fn resolve_url(server: &Url, path_or_url: &str) -> Result<Url, DownloadError> {
    let trimmed = path_or_url.trim();
    let resolved = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        Url::parse(trimmed)
    } else if trimmed.starts_with('/') {
        server.join(trimmed)
    } else {
        server.join(&format!("/{trimmed}"))
    };
    resolved.map_err(|_| DownloadError::invalid_url(trimmed))
}
