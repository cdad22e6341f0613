//! GitHub contents API traversal.
//!
//! Directories are walked with an explicit stack (depth-first). Each file's
//! content is retrieved through [`ContentTier`]s in a fixed order: the raw
//! download URL, inline base64 from the listing, then the blob endpoint.
//! Rate-limited listings are retried after a bounded wait by pushing the same
//! directory back onto the stack.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::header::{self, HeaderValue};
use serde::Deserialize;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{FilterSpec, PathStyle, DEFAULT_API_BASE};
use crate::contract::{Accept, HttpRequest, HttpResponse, HttpTransport, TransportError};
use crate::error::CrawlError;
use crate::filter::Filter;
use crate::reference::RepoReference;
use crate::FileMap;

const GITHUB_JSON: &str = "application/vnd.github.v3+json";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const RATE_LIMIT_RESET_HEADER: &str = "x-ratelimit-reset";
const MIN_RATE_LIMIT_WAIT_SECS: f64 = 1.0;
const MAX_RATE_LIMIT_WAIT_SECS: f64 = 60.0;
/// Decoded bytes per base64 character.
const BASE64_SIZE_RATIO: f64 = 0.75;
/// Slack on the size limit before a base64 payload is rejected undecoded.
const BASE64_SIZE_BUFFER: f64 = 1.1;

/// `reqwest`-backed [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, CrawlError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("sourcelens/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| CrawlError::DependencyMissing(format!("HTTP client unavailable: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let accept = match request.accept {
            Accept::Json => GITHUB_JSON,
            Accept::Raw => "*/*",
        };
        let mut builder = self
            .client
            .get(&request.url)
            .header(header::ACCEPT, accept);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = &request.bearer_token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| TransportError(format!("invalid token header: {e}")))?;
            value.set_sensitive(true);
            builder = builder.header(header::AUTHORIZATION, value);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError(e.to_string()))?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError(e.to_string()))?
            .to_vec();
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Dir,
    Symlink,
    Submodule,
    #[default]
    #[serde(other)]
    Unknown,
}

/// One item of a contents listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RemoteEntry {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: EntryKind,
    /// Remote-reported size; negative or missing values count as zero.
    #[serde(default)]
    pub size: i64,
    /// Blob endpoint for this item.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub encoding: Option<String>,
}

impl RemoteEntry {
    fn reported_size(&self) -> u64 {
        self.size.max(0) as u64
    }

    fn inline_base64(&self) -> Option<&str> {
        match (self.encoding.as_deref(), self.content.as_deref()) {
            (Some("base64"), Some(content)) if !content.is_empty() => Some(content),
            _ => None,
        }
    }
}

/// The contents endpoint answers with an object for a file and an array for a directory.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Listing {
    Many(Vec<RemoteEntry>),
    One(Box<RemoteEntry>),
}

impl Listing {
    fn into_entries(self) -> Vec<RemoteEntry> {
        match self {
            Listing::Many(entries) => entries,
            Listing::One(entry) => vec![*entry],
        }
    }
}

#[derive(Debug, Deserialize)]
struct BlobBody {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
}

/// A file the crawl saw but did not fetch because of its reported size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRecord {
    pub path: String,
    pub size: u64,
}

/// Where a file's content can come from, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentTier {
    DownloadUrl,
    InlineBase64,
    BlobApi,
}

const CONTENT_TIERS: [ContentTier; 3] = [
    ContentTier::DownloadUrl,
    ContentTier::InlineBase64,
    ContentTier::BlobApi,
];

#[derive(Debug, PartialEq, Eq)]
enum TierFailure {
    /// The entry offers nothing for this tier.
    Unavailable,
    /// Rejected by the pre-decode size estimate.
    TooLarge(String),
    Failed(String),
}

/// Wait before retrying a rate-limited request: reset time minus now, clamped to [1, 60]
/// seconds and rounded up to whole seconds. 60 seconds when the reset header is unusable.
pub fn rate_limit_wait(response: &HttpResponse, now: SystemTime) -> Duration {
    let reset = response
        .header(RATE_LIMIT_RESET_HEADER)
        .and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|&ts| ts > 0);
    let Some(reset) = reset else {
        return Duration::from_secs_f64(MAX_RATE_LIMIT_WAIT_SECS);
    };
    let now_secs = now
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    let wait = (reset as f64 - now_secs).clamp(MIN_RATE_LIMIT_WAIT_SECS, MAX_RATE_LIMIT_WAIT_SECS);
    Duration::from_secs(wait.ceil() as u64)
}

pub fn is_rate_limited(response: &HttpResponse) -> bool {
    match response.status {
        429 => true,
        403 => response.text_lossy().to_lowercase().contains("rate limit"),
        _ => false,
    }
}

/// Decode base64 unless the estimated decoded size already exceeds the limit.
fn decode_base64_capped(encoded: &str, max_file_size: u64) -> Result<String, TierFailure> {
    let estimated = encoded.len() as f64 * BASE64_SIZE_RATIO;
    if estimated > max_file_size as f64 * BASE64_SIZE_BUFFER {
        return Err(TierFailure::TooLarge(format!(
            "estimated size {estimated:.0} > limit {max_file_size}"
        )));
    }
    // GitHub wraps base64 payloads at 60 columns.
    let compact: Vec<u8> = encoded
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    let bytes = STANDARD
        .decode(compact)
        .map_err(|e| TierFailure::Failed(format!("invalid base64: {e}")))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Key under which an item lands in the file map.
fn display_path(item_path: &str, subpath: &str, style: PathStyle) -> String {
    if style == PathStyle::Relative && !subpath.is_empty() {
        if let Some(rest) = item_path
            .strip_prefix(subpath)
            .and_then(|r| r.strip_prefix('/'))
        {
            return rest.to_string();
        }
    }
    item_path.to_string()
}

/// Crawls a repository through the contents API.
pub struct ApiCrawler<'a, T: HttpTransport + ?Sized> {
    transport: &'a T,
    api_base: String,
    token: Option<String>,
}

impl<'a, T: HttpTransport + ?Sized> ApiCrawler<'a, T> {
    pub fn new(transport: &'a T) -> Self {
        Self {
            transport,
            api_base: DEFAULT_API_BASE.to_string(),
            token: None,
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_token(mut self, token: Option<&str>) -> Self {
        self.token = token.map(str::to_string);
        self
    }

    /// Contents endpoint for `path`, with every segment percent-encoded (`#`, `?`, `%`, spaces).
    fn contents_url(&self, reference: &RepoReference, path: &str) -> Result<String, CrawlError> {
        let mut url = Url::parse(&self.api_base)
            .map_err(|e| CrawlError::Api(format!("invalid API base '{}': {e}", self.api_base)))?;
        url.path_segments_mut()
            .map_err(|_| CrawlError::Api(format!("API base '{}' cannot hold a path", self.api_base)))?
            .pop_if_empty()
            .extend(["repos", reference.owner.as_str(), reference.repo.as_str(), "contents"])
            .extend(path.split('/'));
        Ok(url.into())
    }

    /// Walk `reference` and return every included file's content.
    pub async fn crawl(
        &self,
        reference: &RepoReference,
        spec: &FilterSpec,
        path_style: PathStyle,
    ) -> Result<FileMap, CrawlError> {
        let filter = Filter::new(spec)?;
        let initial = reference.subpath.trim_matches('/').to_string();
        let mut files = FileMap::new();
        let mut skipped: Vec<SkippedRecord> = Vec::new();
        let mut stack = vec![initial.clone()];

        info!(
            repo = %reference.slug(),
            reference = reference.reference.as_deref().unwrap_or("default"),
            path = %initial,
            "Starting GitHub API crawl"
        );

        while let Some(current) = stack.pop() {
            let entries = match self.list_directory(reference, &current).await {
                Ok(entries) => entries,
                Err(CrawlError::RateLimited { wait_secs }) => {
                    warn!(path = %current, wait_secs, "GitHub rate limit exceeded, waiting");
                    tokio::time::sleep(Duration::from_secs(wait_secs)).await;
                    stack.push(current);
                    continue;
                }
                Err(e @ (CrawlError::Auth(_) | CrawlError::NotFound(_))) if current != initial => {
                    warn!(path = %current, error = %e, "Skipping subtree");
                    continue;
                }
                Err(e) => return Err(e),
            };

            for entry in entries {
                if entry.path.is_empty() || entry.name.is_empty() {
                    debug!(?entry, "Ignoring listing item without path or name");
                    continue;
                }
                let key = display_path(&entry.path, &initial, path_style);

                match entry.kind {
                    EntryKind::Dir => {
                        if filter.is_dir_excluded(&key) {
                            debug!(dir = %key, "Pruning excluded directory");
                        } else {
                            stack.push(entry.path.clone());
                        }
                    }
                    EntryKind::File => {
                        if !filter.should_include(&key, &entry.name) {
                            continue;
                        }
                        let size = entry.reported_size();
                        if filter.exceeds_size(size) {
                            skipped.push(SkippedRecord {
                                path: key,
                                size,
                            });
                            continue;
                        }
                        if let Some(content) = self.fetch_content(&entry, &key, &filter).await {
                            files.insert(key, content);
                        }
                    }
                    EntryKind::Symlink => info!(path = %key, "Skipping symlink"),
                    EntryKind::Submodule => info!(path = %key, "Skipping submodule"),
                    EntryKind::Unknown => warn!(path = %key, "Skipping item of unknown type"),
                }
            }
        }

        if !skipped.is_empty() {
            info!(count = skipped.len(), "Skipped files due to size limits");
            for record in &skipped {
                debug!(path = %record.path, size = record.size, "Skipped oversize file");
            }
        }
        info!(files = files.len(), repo = %reference.slug(), "GitHub API crawl complete");
        Ok(files)
    }

    async fn list_directory(
        &self,
        reference: &RepoReference,
        path: &str,
    ) -> Result<Vec<RemoteEntry>, CrawlError> {
        let url = self.contents_url(reference, path)?;
        let mut request = HttpRequest::json(&url).with_bearer(self.token.as_deref());
        if let Some(git_ref) = &reference.reference {
            request = request.with_query("ref", git_ref);
        }
        debug!(url = %url, reference = ?reference.reference, "Fetching contents listing");

        let response = self
            .transport
            .get(request)
            .await
            .map_err(|e| CrawlError::Api(format!("error fetching '{path}': {e}")))?;

        if is_rate_limited(&response) {
            let wait = rate_limit_wait(&response, SystemTime::now());
            return Err(CrawlError::RateLimited {
                wait_secs: wait.as_secs(),
            });
        }
        match response.status {
            401 => {
                return Err(CrawlError::Auth(
                    "GitHub API returned 401 Unauthorized; check the token".into(),
                ))
            }
            404 => {
                let mut msg = format!("path '{path}' in '{}'", reference.slug());
                if let Some(git_ref) = &reference.reference {
                    msg.push_str(&format!(" at ref '{git_ref}'"));
                }
                return Err(CrawlError::NotFound(msg));
            }
            _ if !response.is_success() => {
                return Err(CrawlError::Api(format!(
                    "status {} fetching '{path}'",
                    response.status
                )))
            }
            _ => {}
        }

        serde_json::from_slice::<Listing>(&response.body)
            .map(Listing::into_entries)
            .map_err(|e| CrawlError::Api(format!("invalid JSON listing for '{path}': {e}")))
    }

    /// Try each content tier in order; the first one that yields text wins.
    async fn fetch_content(&self, entry: &RemoteEntry, key: &str, filter: &Filter) -> Option<String> {
        for tier in CONTENT_TIERS {
            match self.try_tier(tier, entry, filter.max_file_size()).await {
                Ok(content) => {
                    let actual = content.len() as u64;
                    if filter.exceeds_size(actual) {
                        info!(path = %key, size = actual, limit = filter.max_file_size(), "Skipping file: decoded size over limit");
                        return None;
                    }
                    debug!(path = %key, ?tier, "Fetched file content");
                    return Some(content);
                }
                Err(TierFailure::Unavailable) => {}
                Err(TierFailure::TooLarge(reason)) => {
                    info!(path = %key, ?tier, reason = %reason, "Content tier rejected by size estimate");
                }
                Err(TierFailure::Failed(reason)) => {
                    warn!(path = %key, ?tier, reason = %reason, "Content tier failed");
                }
            }
        }
        warn!(path = %key, "Could not retrieve file content through any tier");
        None
    }

    async fn try_tier(
        &self,
        tier: ContentTier,
        entry: &RemoteEntry,
        max_file_size: u64,
    ) -> Result<String, TierFailure> {
        match tier {
            ContentTier::DownloadUrl => {
                let url = entry.download_url.as_deref().ok_or(TierFailure::Unavailable)?;
                let response = self.get_ok(HttpRequest::raw(url)).await?;
                Ok(response.text_lossy())
            }
            ContentTier::InlineBase64 => {
                let encoded = entry.inline_base64().ok_or(TierFailure::Unavailable)?;
                decode_base64_capped(encoded, max_file_size)
            }
            ContentTier::BlobApi => {
                let url = entry.url.as_deref().ok_or(TierFailure::Unavailable)?;
                let response = self.get_ok(HttpRequest::json(url)).await?;
                let blob: BlobBody = serde_json::from_slice(&response.body)
                    .map_err(|e| TierFailure::Failed(format!("invalid blob JSON: {e}")))?;
                match (blob.encoding.as_deref(), blob.content.as_deref()) {
                    (Some("base64"), Some(content)) if !content.is_empty() => {
                        decode_base64_capped(content, max_file_size)
                    }
                    (encoding, _) => Err(TierFailure::Failed(format!(
                        "unexpected blob encoding {encoding:?}"
                    ))),
                }
            }
        }
    }

    async fn get_ok(&self, request: HttpRequest) -> Result<HttpResponse, TierFailure> {
        let url = request.url.clone();
        let response = self
            .transport
            .get(request.with_bearer(self.token.as_deref()))
            .await
            .map_err(|e| TierFailure::Failed(format!("request to {url} failed: {e}")))?;
        if !response.is_success() {
            return Err(TierFailure::Failed(format!(
                "request to {url} returned status {}",
                response.status
            )));
        }
        Ok(response)
    }
}
