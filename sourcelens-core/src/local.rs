//! Local directory crawling, and the tree walker the clone engine reuses.

use std::ffi::OsStr;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::config::FilterSpec;
use crate::error::{CrawlError, SkipReason};
use crate::filter::{normalize_path, Filter};
use crate::FileMap;

/// Result of walking one tree.
#[derive(Debug, Default)]
pub(crate) struct WalkOutcome {
    pub files: FileMap,
    pub skipped: usize,
}

/// How a walk keys and prunes its entries.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct WalkSettings<'a> {
    /// Prepended (with `/`) to every key, e.g. the subpath of a clone keyed from the repo root.
    pub key_prefix: Option<&'a str>,
    /// Skip a `.git` directory directly below the walk root.
    pub skip_git_dir: bool,
}

fn entry_key(root: &Path, entry: &DirEntry, prefix: Option<&str>) -> Option<String> {
    let rel = entry.path().strip_prefix(root).ok()?;
    let rel = normalize_path(&rel.to_string_lossy());
    Some(match prefix {
        Some(p) if !p.is_empty() => format!("{}/{}", p.trim_end_matches('/'), rel),
        _ => rel,
    })
}

/// Read one file under the size limit. Invalid UTF-8 is replaced, not rejected.
pub(crate) fn read_file_capped(path: &Path, filter: &Filter) -> Result<String, SkipReason> {
    let size = fs::metadata(path)
        .map_err(|e| SkipReason::Unreadable(format!("stat failed: {e}")))?
        .len();
    if filter.exceeds_size(size) {
        return Err(SkipReason::TooLarge { size });
    }
    let bytes = fs::read(path).map_err(|e| SkipReason::Unreadable(e.to_string()))?;
    let content = String::from_utf8_lossy(&bytes).into_owned();
    // Replacement characters can grow the text past the limit.
    if filter.exceeds_size(content.len() as u64) {
        return Err(SkipReason::TooLarge {
            size: content.len() as u64,
        });
    }
    Ok(content)
}

/// Walk `root` top-down, pruning excluded directories before descending.
pub(crate) fn walk_tree(root: &Path, filter: &Filter, settings: WalkSettings<'_>) -> WalkOutcome {
    let mut outcome = WalkOutcome::default();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 || !entry.file_type().is_dir() {
                return true;
            }
            if settings.skip_git_dir && entry.depth() == 1 && entry.file_name() == OsStr::new(".git") {
                return false;
            }
            match entry_key(root, entry, settings.key_prefix) {
                Some(key) if filter.is_dir_excluded(&key) => {
                    debug!(dir = %key, "Pruning excluded directory");
                    false
                }
                _ => true,
            }
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable directory entry");
                outcome.skipped += 1;
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(key) = entry_key(root, &entry, settings.key_prefix) else {
            warn!(path = %entry.path().display(), "Could not compute relative path");
            outcome.skipped += 1;
            continue;
        };
        let filename = entry.file_name().to_string_lossy();

        let result = if filter.should_include(&key, &filename) {
            read_file_capped(entry.path(), filter)
        } else {
            Err(SkipReason::Filtered)
        };
        match result {
            Ok(content) => {
                outcome.files.insert(key, content);
            }
            Err(SkipReason::Filtered) => outcome.skipped += 1,
            Err(SkipReason::TooLarge { size }) => {
                debug!(path = %key, size, limit = filter.max_file_size(), "Skipping file over size limit");
                outcome.skipped += 1;
            }
            Err(SkipReason::Unreadable(reason)) => {
                warn!(path = %key, reason = %reason, "Skipping unreadable file");
                outcome.skipped += 1;
            }
        }
    }
    outcome
}

/// Crawl a local directory. Keys are forward-slash paths relative to `directory`.
pub fn crawl_local_directory(directory: &Path, spec: &FilterSpec) -> Result<FileMap, CrawlError> {
    if !directory.is_dir() {
        return Err(CrawlError::InvalidDirectory(directory.to_path_buf()));
    }
    let root = directory
        .canonicalize()
        .map_err(|_| CrawlError::InvalidDirectory(directory.to_path_buf()))?;
    let filter = Filter::new(spec)?;

    info!(
        root = %root.display(),
        include = ?spec.include_patterns,
        exclude = ?spec.exclude_patterns,
        max_file_size = spec.max_file_size,
        "Starting local directory crawl"
    );

    let outcome = walk_tree(&root, &filter, WalkSettings::default());
    info!(
        files = outcome.files.len(),
        skipped = outcome.skipped,
        "Local directory crawl complete"
    );
    Ok(outcome.files)
}
