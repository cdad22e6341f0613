use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info};

pub const DEFAULT_MAX_FILE_SIZE: u64 = 150_000;
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// Include/exclude globs plus the per-file size ceiling. Exclude always wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSpec {
    /// Empty means "everything not excluded".
    #[serde(default)]
    pub include_patterns: BTreeSet<String>,
    #[serde(default)]
    pub exclude_patterns: BTreeSet<String>,
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE
}

impl Default for FilterSpec {
    fn default() -> Self {
        Self {
            include_patterns: BTreeSet::new(),
            exclude_patterns: BTreeSet::new(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl FilterSpec {
    pub fn new<I, E, S, T>(include: I, exclude: E, max_file_size: u64) -> Self
    where
        I: IntoIterator<Item = S>,
        E: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        Self {
            include_patterns: include.into_iter().map(Into::into).collect(),
            exclude_patterns: exclude.into_iter().map(Into::into).collect(),
            max_file_size,
        }
    }
}

/// How keys of the resulting file map are rooted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathStyle {
    /// Relative to the requested subpath (or to the crawl root when there is none).
    #[default]
    Relative,
    /// Relative to the repository root, keeping any subpath prefix.
    RepoRoot,
}

/// Everything a single crawl call needs besides the locator itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlOptions {
    #[serde(skip_serializing)]
    pub token: Option<String>,
    #[serde(default)]
    pub filter: FilterSpec,
    #[serde(default)]
    pub path_style: PathStyle,
    #[serde(default = "default_prefer_api")]
    pub prefer_api: bool,
}

fn default_prefer_api() -> bool {
    true
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            token: None,
            filter: FilterSpec::default(),
            path_style: PathStyle::default(),
            prefer_api: true,
        }
    }
}

impl CrawlOptions {
    pub fn trace_loaded(&self) {
        info!(
            include = ?self.filter.include_patterns,
            exclude = ?self.filter.exclude_patterns,
            max_file_size = self.filter.max_file_size,
            path_style = ?self.path_style,
            prefer_api = self.prefer_api,
            token = self.token.is_some(),
            "Loaded crawl options"
        );
        debug!(filter = ?self.filter, "Crawl options loaded (full debug)");
    }
}
