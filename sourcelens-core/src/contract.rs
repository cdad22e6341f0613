//! # contract: seams between the crawl engines and the outside world
//!
//! The engines never talk to the network or to `git` directly. They go through
//! two traits so that production code and tests can plug in different backends:
//!
//! - [`HttpTransport`]: a single GET, awaited before the next
//!   request is issued. Implemented by [`crate::api::ReqwestTransport`].
//! - [`RepoCloner`]: shallow clone plus checkout. Implemented by
//!   [`crate::clone::GitCli`].
//!
//! ## Mocking & Testing
//! Both traits are annotated for `mockall` (`MockHttpTransport`, `MockRepoCloner`),
//! exported under the `test-export-mocks` feature for integration tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::error::CrawlError;

/// What the caller expects back; drives the `Accept` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accept {
    /// `application/vnd.github.v3+json`
    Json,
    /// Raw bytes (download URLs).
    Raw,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub query: Vec<(String, String)>,
    pub accept: Accept,
    /// Sent as `Authorization: Bearer <token>` when present.
    pub bearer_token: Option<String>,
}

impl HttpRequest {
    pub fn json(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            query: Vec::new(),
            accept: Accept::Json,
            bearer_token: None,
        }
    }

    pub fn raw(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            query: Vec::new(),
            accept: Accept::Raw,
            bearer_token: None,
        }
    }

    pub fn with_query(mut self, key: &str, value: &str) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn with_bearer(mut self, token: Option<&str>) -> Self {
        self.bearer_token = token.map(str::to_string);
        self
    }
}

/// A fully buffered response. Header names are lower-cased.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Transport-level failure: no response was received at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError(pub String);

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for TransportError {}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Issue a GET. Non-2xx statuses are returned as responses, not errors.
    async fn get(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Shallow clone and checkout, as used by the clone engine.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait RepoCloner: Send + Sync {
    /// Fail fast with [`CrawlError::DependencyMissing`] when the backend cannot run at all.
    fn ensure_available(&self) -> Result<(), CrawlError>;

    /// Clone `url` with a history depth of one into the existing, empty `dest`.
    fn clone_shallow(&self, url: &str, dest: &Path) -> Result<(), CrawlError>;

    /// Check out `reference` inside an existing clone.
    fn checkout(&self, repo_dir: &Path, reference: &str) -> Result<(), CrawlError>;
}
