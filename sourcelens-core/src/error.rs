//! Error taxonomy for source acquisition.
//!
//! Fatal failures surface as [`CrawlError`]. Per-file failures never leave the
//! engine that hit them: they are logged and the file is skipped.

use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum CrawlError {
    /// Malformed repository locator. Always fatal, no fallback.
    Parse(String),
    /// An include or exclude pattern is not a valid glob.
    Pattern { pattern: String, reason: String },
    /// 401 from the contents API, or a clone refused for credentials or visibility.
    Auth(String),
    /// 404 from the contents API.
    NotFound(String),
    /// 429 / 403-with-text. Handled inside the API engine and never returned to callers.
    RateLimited { wait_secs: u64 },
    /// Any other HTTP or transport failure while listing a directory.
    Api(String),
    /// Clone, checkout or post-clone resolution failed.
    Clone(String),
    /// The local crawl root is missing or not a directory.
    InvalidDirectory(PathBuf),
    /// A required external tool or client could not be found or constructed.
    DependencyMissing(String),
    /// The crawl finished but produced no files while files were required.
    NoFilesFetched(String),
    Io(std::io::Error),
}

impl fmt::Display for CrawlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrawlError::Parse(msg) => write!(f, "could not parse repository locator: {msg}"),
            CrawlError::Pattern { pattern, reason } => {
                write!(f, "invalid glob pattern '{pattern}': {reason}")
            }
            CrawlError::Auth(msg) => write!(f, "authentication failed: {msg}"),
            CrawlError::NotFound(msg) => write!(f, "not found: {msg}"),
            CrawlError::RateLimited { wait_secs } => {
                write!(f, "rate limited, retry in {wait_secs}s")
            }
            CrawlError::Api(msg) => write!(f, "GitHub API error: {msg}"),
            CrawlError::Clone(msg) => write!(f, "git clone failed: {msg}"),
            CrawlError::InvalidDirectory(path) => {
                write!(f, "not a valid directory: '{}'", path.display())
            }
            CrawlError::DependencyMissing(what) => write!(f, "missing dependency: {what}"),
            CrawlError::NoFilesFetched(source) => {
                write!(f, "no files matched the crawl criteria for '{source}'")
            }
            CrawlError::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for CrawlError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CrawlError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CrawlError {
    fn from(e: std::io::Error) -> Self {
        CrawlError::Io(e)
    }
}

impl CrawlError {
    /// Whether the orchestrator may still try cloning after the API engine failed with this error.
    pub fn allows_clone_fallback(&self) -> bool {
        !matches!(
            self,
            CrawlError::DependencyMissing(_) | CrawlError::Parse(_) | CrawlError::Pattern { .. }
        )
    }
}

/// Why a single file was left out of a crawl. Logged, never returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SkipReason {
    Filtered,
    TooLarge { size: u64 },
    Unreadable(String),
}
