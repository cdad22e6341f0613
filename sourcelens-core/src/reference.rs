//! Repository locator parsing.
//!
//! Supported forms:
//!   - `git@github.com:owner/repo[.git][/path]`
//!   - `https://github.com/owner/repo[.git]`
//!   - `https://github.com/owner/repo/tree/<ref>/<path>` (or `/blob/`)
//!   - `https://github.com/owner/repo/<path>`

use regex::Regex;
use std::sync::OnceLock;
use url::Url;

use crate::error::CrawlError;

/// A parsed repository locator. Produced once per crawl.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoReference {
    pub owner: String,
    pub repo: String,
    /// Branch, tag or commit taken from a `/tree/<ref>` or `/blob/<ref>` segment.
    pub reference: Option<String>,
    /// Path inside the repository, without leading or trailing slashes. Empty for the root.
    pub subpath: String,
    /// Locator usable by `git clone` (no `/tree/...` suffix).
    pub clone_url: String,
    pub is_ssh: bool,
}

fn ssh_pattern() -> &'static Regex {
    static SSH: OnceLock<Regex> = OnceLock::new();
    SSH.get_or_init(|| {
        Regex::new(r"^git@(?P<host>[^:/]+):(?P<path>.+)$").expect("static regex is valid")
    })
}

fn is_github_host(host: &str) -> bool {
    host == "github.com" || host.ends_with(".github.com")
}

fn strip_git_suffix(segment: &str) -> &str {
    segment.strip_suffix(".git").unwrap_or(segment)
}

impl RepoReference {
    /// Parse a locator into owner, repo, optional ref and subpath.
    pub fn parse(locator: &str) -> Result<Self, CrawlError> {
        let locator = locator.trim();
        if locator.starts_with("git@") {
            Self::parse_ssh(locator)
        } else {
            Self::parse_https(locator)
        }
    }

    fn parse_ssh(locator: &str) -> Result<Self, CrawlError> {
        let caps = ssh_pattern()
            .captures(locator)
            .ok_or_else(|| CrawlError::Parse(format!("'{locator}' is not a valid SSH locator")))?;
        let host = &caps["host"];
        if !is_github_host(host) {
            return Err(CrawlError::Parse(format!("unsupported host '{host}'")));
        }

        let segments: Vec<&str> = caps["path"]
            .trim_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();
        if segments.len() < 2 {
            return Err(CrawlError::Parse(format!(
                "could not find owner/repo in '{locator}'"
            )));
        }
        let owner = segments[0];
        let repo = strip_git_suffix(segments[1]);
        if repo.is_empty() {
            return Err(CrawlError::Parse(format!("empty repository name in '{locator}'")));
        }

        Ok(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            reference: None,
            subpath: segments[2..].join("/"),
            clone_url: format!("git@{host}:{owner}/{}.git", repo),
            is_ssh: true,
        })
    }

    fn parse_https(locator: &str) -> Result<Self, CrawlError> {
        let url = Url::parse(locator)
            .map_err(|e| CrawlError::Parse(format!("'{locator}': {e}")))?;
        if !matches!(url.scheme(), "https" | "http") {
            return Err(CrawlError::Parse(format!(
                "unsupported scheme '{}' in '{locator}'",
                url.scheme()
            )));
        }
        let host = url
            .host_str()
            .ok_or_else(|| CrawlError::Parse(format!("no host in '{locator}'")))?;
        if !is_github_host(host) {
            return Err(CrawlError::Parse(format!("unsupported host '{host}'")));
        }

        let segments: Vec<&str> = url
            .path()
            .trim_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();
        if segments.len() < 2 {
            return Err(CrawlError::Parse(format!(
                "could not find owner/repo in '{locator}'"
            )));
        }
        let owner = segments[0];
        let repo = strip_git_suffix(segments[1]);
        if repo.is_empty() {
            return Err(CrawlError::Parse(format!("empty repository name in '{locator}'")));
        }

        let (reference, subpath) =
            if segments.len() > 3 && matches!(segments[2], "tree" | "blob") {
                (Some(segments[3].to_string()), segments[4..].join("/"))
            } else {
                (None, segments[2..].join("/"))
            };

        Ok(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            reference,
            subpath,
            clone_url: format!("{}://{host}/{owner}/{repo}.git", url.scheme()),
            is_ssh: false,
        })
    }

    /// `owner/repo`, handy for log fields and messages.
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}
