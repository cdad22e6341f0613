//! Include/exclude filtering shared by the API, clone and local engines.
//!
//! Matching is case-sensitive and `*` crosses `/`, so `*.py` matches
//! `pkg/mod.py` and `build/*` matches everything below `build/`.

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::collections::BTreeSet;

use crate::config::FilterSpec;
use crate::error::CrawlError;

/// A [`FilterSpec`] with its patterns compiled.
#[derive(Debug, Clone)]
pub struct Filter {
    include: Option<GlobSet>,
    exclude: GlobSet,
    max_file_size: u64,
}

fn build_globset(patterns: &BTreeSet<String>) -> Result<GlobSet, CrawlError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .literal_separator(false)
            .case_insensitive(false)
            .build()
            .map_err(|e| CrawlError::Pattern {
                pattern: pattern.clone(),
                reason: e.kind().to_string(),
            })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| CrawlError::Pattern {
        pattern: patterns.iter().cloned().collect::<Vec<_>>().join(", "),
        reason: e.to_string(),
    })
}

/// Turns OS separators into `/`.
pub fn normalize_path(path: &str) -> String {
    if std::path::MAIN_SEPARATOR == '/' {
        path.to_string()
    } else {
        path.replace(std::path::MAIN_SEPARATOR, "/")
    }
}

impl Filter {
    pub fn new(spec: &FilterSpec) -> Result<Self, CrawlError> {
        let include = if spec.include_patterns.is_empty() {
            None
        } else {
            Some(build_globset(&spec.include_patterns)?)
        };
        Ok(Self {
            include,
            exclude: build_globset(&spec.exclude_patterns)?,
            max_file_size: spec.max_file_size,
        })
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    pub fn exceeds_size(&self, size: u64) -> bool {
        size > self.max_file_size
    }

    /// Decide whether a file is part of the crawl result.
    pub fn should_include(&self, relative_path: &str, filename: &str) -> bool {
        let path = normalize_path(relative_path);
        if self.is_excluded(&path) {
            return false;
        }
        match &self.include {
            None => true,
            Some(include) => include.is_match(filename) || include.is_match(path.as_str()),
        }
    }

    /// True when a directory (relative, no trailing slash needed) should not be descended into.
    pub fn is_dir_excluded(&self, relative_dir: &str) -> bool {
        let dir = normalize_path(relative_dir);
        let dir = dir.trim_end_matches('/');
        if dir.is_empty() {
            return false;
        }
        self.exclude.is_match(format!("{dir}/").as_str())
    }

    fn is_excluded(&self, path: &str) -> bool {
        if self.exclude.is_empty() {
            return false;
        }
        if self.exclude.is_match(path) {
            return true;
        }
        // Every ancestor as `dir/`, so subtree patterns hit files below them.
        path.match_indices('/')
            .any(|(idx, _)| self.exclude.is_match(&path[..=idx]))
    }
}
