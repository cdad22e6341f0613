//! Top-level entry points: pick a strategy for a locator and run it.
//!
//! A [`Crawler`] owns one [`HttpTransport`] and one [`RepoCloner`] and exposes
//! three operations:
//!   - [`Crawler::crawl_repo`]: GitHub locator -> [`FileMap`], API first with clone fallback
//!   - [`Crawler::crawl_local`]: local directory -> [`FileMap`]
//!   - [`Crawler::fetch_source`]: either of the above plus a project name
//!
//! # Strategy
//! SSH locators, and callers with `prefer_api = false`, go straight to the
//! clone engine. Everything else tries the contents API and, on any failure
//! that [`CrawlError::allows_clone_fallback`], logs a warning and clones.
//!
//! # Navigation
//! - Production wiring: [`Crawler::github`]
//! - One-shot helper: [`crawl_github_repo`]

use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::api::{ApiCrawler, ReqwestTransport};
use crate::clone::{clone_and_walk, GitCli};
use crate::config::{CrawlOptions, DEFAULT_API_BASE};
use crate::contract::{HttpTransport, RepoCloner};
use crate::error::CrawlError;
use crate::local::crawl_local_directory;
use crate::reference::RepoReference;
use crate::FileMap;

/// What to crawl.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocator {
    /// A GitHub HTTPS or SSH locator.
    Repo(String),
    LocalDir(PathBuf),
}

/// Result of [`Crawler::fetch_source`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedSource {
    pub project_name: String,
    pub files: FileMap,
}

pub struct Crawler<T: HttpTransport, C: RepoCloner> {
    transport: T,
    cloner: C,
    api_base: String,
}

impl Crawler<ReqwestTransport, GitCli> {
    /// Real HTTP client and the `git` executable.
    pub fn github() -> Result<Self, CrawlError> {
        Ok(Self::new(ReqwestTransport::new()?, GitCli::new()))
    }
}

impl<T: HttpTransport, C: RepoCloner> Crawler<T, C> {
    pub fn new(transport: T, cloner: C) -> Self {
        Self {
            transport,
            cloner,
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }

    /// Point the API engine at another host, e.g. GitHub Enterprise.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub async fn crawl_repo(
        &self,
        locator: &str,
        options: &CrawlOptions,
    ) -> Result<FileMap, CrawlError> {
        let reference = RepoReference::parse(locator).map_err(|e| {
            error!(locator = locator, error = %e, "Failed to parse repository locator");
            e
        })?;

        if options.prefer_api && !reference.is_ssh {
            info!(repo = %reference.slug(), "Crawling via GitHub API");
            let api = ApiCrawler::new(&self.transport)
                .with_api_base(self.api_base.as_str())
                .with_token(options.token.as_deref());
            match api
                .crawl(&reference, &options.filter, options.path_style)
                .await
            {
                Ok(files) => return Ok(files),
                Err(e) if e.allows_clone_fallback() => {
                    warn!(repo = %reference.slug(), error = %e, "API crawl failed, falling back to git clone");
                }
                Err(e) => {
                    error!(repo = %reference.slug(), error = %e, "API crawl failed");
                    return Err(e);
                }
            }
        } else {
            info!(
                repo = %reference.slug(),
                ssh = reference.is_ssh,
                prefer_api = options.prefer_api,
                "Crawling via git clone"
            );
        }

        clone_and_walk(&self.cloner, &reference, &options.filter, options.path_style).map_err(|e| {
            error!(repo = %reference.slug(), error = %e, "Clone crawl failed");
            e
        })
    }

    pub async fn crawl_local(
        &self,
        directory: &Path,
        options: &CrawlOptions,
    ) -> Result<FileMap, CrawlError> {
        crawl_local_directory(directory, &options.filter)
    }

    pub async fn fetch_source(
        &self,
        source: &SourceLocator,
        options: &CrawlOptions,
        require_files: bool,
    ) -> Result<FetchedSource, CrawlError> {
        let (project_name, files, label) = match source {
            SourceLocator::Repo(locator) => {
                let name = RepoReference::parse(locator)?.repo;
                (name, self.crawl_repo(locator, options).await?, locator.clone())
            }
            SourceLocator::LocalDir(dir) => {
                let name = derive_project_name(dir)?;
                (
                    name,
                    self.crawl_local(dir, options).await?,
                    dir.display().to_string(),
                )
            }
        };

        if require_files && files.is_empty() {
            error!(source = %label, "Crawl produced no files");
            return Err(CrawlError::NoFilesFetched(label));
        }
        info!(project = %project_name, files = files.len(), "Fetched source");
        Ok(FetchedSource {
            project_name,
            files,
        })
    }
}

/// Final component of the canonicalised directory.
pub fn derive_project_name(directory: &Path) -> Result<String, CrawlError> {
    let canonical = directory
        .canonicalize()
        .map_err(|_| CrawlError::InvalidDirectory(directory.to_path_buf()))?;
    canonical
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| CrawlError::InvalidDirectory(directory.to_path_buf()))
}

/// Crawl a GitHub repository with the production transport and `git`.
pub async fn crawl_github_repo(
    locator: &str,
    options: &CrawlOptions,
) -> Result<FileMap, CrawlError> {
    Crawler::github()?.crawl_repo(locator, options).await
}
