//! Archive download with filename-keyed caching
//!
//! Raw task archives are fetched once and kept under the cache directory by
//! their remote filename. A cached file is trusted as-is: no network call is
//! made and no checksum is computed.
//!
//! ## Example
//!
//! ```rust,ignore
//! use superglue_eval::download::{ArchiveCache, DownloadConfig, HttpFetcher};
//!
//! let config = DownloadConfig::default();
//! let cache = ArchiveCache::new(&config.cache_dir, HttpFetcher::new(&config)?);
//! let path = cache.maybe_download("https://dl.fbaipublicfiles.com/glue/superglue/data/v2/AX-b.zip")?;
//! ```

use serde_json::Value;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Download errors
#[derive(Error, Debug)]
pub enum DownloadError {
    /// Network error
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Non-success HTTP status
    #[error("HTTP {status} fetching {url}")]
    HttpStatus { url: String, status: u16 },

    /// URL has no usable file name
    #[error("Cannot derive a cache file name from URL: {0}")]
    InvalidUrl(String),

    /// Archive member missing
    #[error("Archive {archive} has no member {member}")]
    MissingMember { archive: PathBuf, member: String },

    /// Malformed JSON line
    #[error("Invalid JSON on line {line} of {member}: {source}")]
    InvalidRecord {
        member: String,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    /// Zip error
    #[error("Zip error: {0}")]
    ZipError(#[from] zip::result::ZipError),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Download configuration
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Cache directory
    pub cache_dir: PathBuf,
    /// Request timeout
    pub timeout: Duration,
    /// User agent sent with every request
    pub user_agent: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("."),
            timeout: Duration::from_secs(600),
            user_agent: format!("superglue-eval/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Blocking byte fetcher
///
/// The seam between the harness and the network; tests substitute an
/// in-memory implementation.
pub trait Fetch {
    /// Fetch the full body at `url`
    ///
    /// # Errors
    ///
    /// Returns an error on network failure or non-success status.
    fn fetch(&self, url: &str) -> Result<Vec<u8>, DownloadError>;
}

impl<F: Fetch + ?Sized> Fetch for &F {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, DownloadError> {
        (**self).fetch(url)
    }
}

/// HTTP fetcher backed by a blocking reqwest client
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    /// Build the HTTP client
    ///
    /// # Errors
    ///
    /// Returns `NetworkError` if the client cannot be constructed.
    pub fn new(config: &DownloadConfig) -> Result<Self, DownloadError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.timeout)
            .build()
            .map_err(|e| DownloadError::NetworkError(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, DownloadError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| DownloadError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response
            .bytes()
            .map_err(|e| DownloadError::NetworkError(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// Last path segment of a URL, ignoring query and fragment
///
/// # Errors
///
/// Returns `InvalidUrl` when the URL ends in a slash or has no path.
pub fn archive_file_name(url: &str) -> Result<&str, DownloadError> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    match path.rsplit('/').next() {
        Some(name) if !name.is_empty() && path.contains('/') => Ok(name),
        _ => Err(DownloadError::InvalidUrl(url.to_string())),
    }
}

/// Filename-keyed archive cache
#[derive(Debug)]
pub struct ArchiveCache<F> {
    cache_dir: PathBuf,
    fetcher: F,
}

impl<F: Fetch> ArchiveCache<F> {
    /// Create a cache rooted at `cache_dir`
    pub fn new<P: AsRef<Path>>(cache_dir: P, fetcher: F) -> Self {
        Self {
            cache_dir: cache_dir.as_ref().to_path_buf(),
            fetcher,
        }
    }

    /// Local path an archive is (or will be) cached at
    ///
    /// # Errors
    ///
    /// Returns `InvalidUrl` if no file name can be derived.
    pub fn cached_path(&self, url: &str) -> Result<PathBuf, DownloadError> {
        Ok(self.cache_dir.join(archive_file_name(url)?))
    }

    /// Return the cached archive, downloading it first if absent
    ///
    /// # Errors
    ///
    /// Returns an error if the download or the write fails.
    pub fn maybe_download(&self, url: &str) -> Result<PathBuf, DownloadError> {
        let target = self.cached_path(url)?;
        if target.exists() {
            tracing::debug!(path = %target.display(), "Using cached archive");
            return Ok(target);
        }

        tracing::info!(url = %url, "Downloading archive");
        let bytes = self.fetcher.fetch(url)?;

        fs::create_dir_all(&self.cache_dir)?;
        let partial = target.with_extension("part");
        if let Err(e) = fs::write(&partial, &bytes).and_then(|()| fs::rename(&partial, &target)) {
            fs::remove_file(&partial).ok();
            return Err(e.into());
        }

        tracing::debug!(path = %target.display(), bytes = bytes.len(), "Archive cached");
        Ok(target)
    }
}

/// Read up to `limit` JSON records from a JSONL member of a zip archive
///
/// Blank lines are skipped and do not count towards the limit.
///
/// # Errors
///
/// Returns an error if the archive cannot be opened, the member is missing,
/// or a line is not valid JSON.
pub fn read_jsonl_member(
    archive: &Path,
    member: &str,
    limit: Option<usize>,
) -> Result<Vec<Value>, DownloadError> {
    let file = fs::File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file)?;
    let entry = match zip.by_name(member) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => {
            return Err(DownloadError::MissingMember {
                archive: archive.to_path_buf(),
                member: member.to_string(),
            })
        }
        Err(e) => return Err(e.into()),
    };

    let mut records = Vec::new();
    for (idx, line) in BufReader::new(entry).lines().enumerate() {
        if limit.is_some_and(|limit| records.len() >= limit) {
            break;
        }
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|source| DownloadError::InvalidRecord {
            member: member.to_string(),
            line: idx + 1,
            source,
        })?;
        records.push(record);
    }

    Ok(records)
}
