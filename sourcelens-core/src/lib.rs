#![doc = "sourcelens-core: source acquisition for sourcelens."]

//! Turns a GitHub repository locator or a local directory into a [`FileMap`]:
//! repository-relative, forward-slash paths mapped to file contents.
//!
//! # Usage
//! Build a [`Crawler`] (usually [`Crawler::github`]) and call
//! [`Crawler::crawl_repo`], [`Crawler::crawl_local`] or [`Crawler::fetch_source`].
//! Filtering and size limits are described by [`FilterSpec`] inside [`CrawlOptions`].

pub mod api;
pub mod clone;
pub mod config;
pub mod contract;
pub mod crawl;
pub mod error;
pub mod filter;
pub mod local;
pub mod reference;

use std::collections::BTreeMap;

/// Relative path (forward slashes) to file content.
pub type FileMap = BTreeMap<String, String>;

pub use config::{CrawlOptions, FilterSpec, PathStyle, DEFAULT_MAX_FILE_SIZE};
pub use crawl::{crawl_github_repo, Crawler, FetchedSource, SourceLocator};
pub use error::CrawlError;
pub use local::crawl_local_directory;
pub use reference::RepoReference;
