use serde_json::json;
use sourcelens_core::contract::{
    HttpRequest, HttpResponse, MockHttpTransport, MockRepoCloner, TransportError,
};
use sourcelens_core::{CrawlOptions, Crawler, FilterSpec, PathStyle};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const API: &str = "https://api.example.test";

fn write_repo(dest: &Path) {
    fs::create_dir_all(dest.join(".git")).unwrap();
    fs::write(dest.join(".git/config"), "[core]").unwrap();
    fs::create_dir_all(dest.join("src/nested")).unwrap();
    fs::write(dest.join("src/lib.rs"), "pub mod nested;").unwrap();
    fs::write(dest.join("src/nested/mod.rs"), "// nested").unwrap();
    fs::write(dest.join("README.md"), "# repo").unwrap();
}

fn cloner() -> MockRepoCloner {
    let mut cloner = MockRepoCloner::new();
    cloner.expect_ensure_available().returning(|| Ok(()));
    cloner.expect_clone_shallow().returning(|_, dest| {
        write_repo(dest);
        Ok(())
    });
    cloner.expect_checkout().returning(|_, _| Ok(()));
    cloner
}

/// The same tree as `write_repo`, served through the contents API.
fn api_transport(first_listing: Option<HttpResponse>) -> MockHttpTransport {
    let pending = Arc::new(Mutex::new(first_listing));
    let mut transport = MockHttpTransport::new();
    transport.expect_get().returning(move |req: HttpRequest| {
        let listing = |items: serde_json::Value| -> Result<HttpResponse, TransportError> {
            Ok(HttpResponse::new(200, items.to_string()))
        };
        let file = |path: &str| {
            json!({
                "path": path,
                "name": path.rsplit('/').next().unwrap(),
                "type": "file",
                "size": 16,
                "download_url": format!("https://raw.example.test/{path}"),
            })
        };
        let dir = |path: &str| json!({"path": path, "name": path.rsplit('/').next().unwrap(), "type": "dir"});

        match req.url.as_str() {
            u if u == format!("{API}/repos/acme/repo/contents/") => {
                if let Some(resp) = pending.lock().unwrap().take() {
                    return Ok(resp);
                }
                listing(json!([file("README.md"), dir("src")]))
            }
            u if u == format!("{API}/repos/acme/repo/contents/src") => {
                listing(json!([file("src/lib.rs"), dir("src/nested")]))
            }
            u if u == format!("{API}/repos/acme/repo/contents/src/nested") => {
                listing(json!([file("src/nested/mod.rs")]))
            }
            "https://raw.example.test/README.md" => Ok(HttpResponse::new(200, "# repo")),
            "https://raw.example.test/src/lib.rs" => Ok(HttpResponse::new(200, "pub mod nested;")),
            "https://raw.example.test/src/nested/mod.rs" => Ok(HttpResponse::new(200, "// nested")),
            other => Err(TransportError(format!("unexpected request {other}"))),
        }
    });
    transport
}

#[tokio::test]
async fn api_and_clone_strategies_agree() {
    let options = CrawlOptions::default();

    let api_only = Crawler::new(api_transport(None), MockRepoCloner::new()).with_api_base(API);
    let from_api = api_only
        .crawl_repo("https://github.com/acme/repo", &options)
        .await
        .unwrap();

    let clone_only = Crawler::new(MockHttpTransport::new(), cloner());
    let from_clone = clone_only
        .crawl_repo(
            "https://github.com/acme/repo",
            &CrawlOptions {
                prefer_api: false,
                ..options.clone()
            },
        )
        .await
        .unwrap();

    assert_eq!(from_api, from_clone);
    assert_eq!(from_api.len(), 3);
}

#[tokio::test]
async fn fallback_result_equals_direct_clone() {
    let broken = api_transport(Some(HttpResponse::new(503, "unavailable")));
    let crawler = Crawler::new(broken, cloner()).with_api_base(API);
    let options = CrawlOptions {
        filter: FilterSpec::new(["*.rs"], Vec::<String>::new(), 1_000),
        ..CrawlOptions::default()
    };
    let via_fallback = crawler
        .crawl_repo("https://github.com/acme/repo", &options)
        .await
        .unwrap();

    let direct = Crawler::new(MockHttpTransport::new(), cloner())
        .crawl_repo(
            "https://github.com/acme/repo",
            &CrawlOptions {
                prefer_api: false,
                ..options.clone()
            },
        )
        .await
        .unwrap();

    assert_eq!(via_fallback, direct);
    assert_eq!(
        via_fallback.keys().collect::<Vec<_>>(),
        vec!["src/lib.rs", "src/nested/mod.rs"]
    );
}

#[tokio::test(start_paused = true)]
async fn rate_limited_root_listing_recovers() {
    let limited = HttpResponse::new(403, r#"{"message":"API rate limit exceeded"}"#)
        .with_header("X-RateLimit-Reset", "0");
    let crawler = Crawler::new(api_transport(Some(limited)), MockRepoCloner::new()).with_api_base(API);

    let started = tokio::time::Instant::now();
    let files = crawler
        .crawl_repo("https://github.com/acme/repo", &CrawlOptions::default())
        .await
        .unwrap();
    let waited = started.elapsed();

    assert_eq!(files.len(), 3);
    assert!(waited >= Duration::from_secs(1), "{waited:?}");
    assert!(waited <= Duration::from_secs(61), "{waited:?}");
}

#[tokio::test]
async fn path_style_controls_subpath_keys() {
    let locator = "https://github.com/acme/repo/tree/main/src";
    let relative = Crawler::new(MockHttpTransport::new(), cloner())
        .crawl_repo(
            locator,
            &CrawlOptions {
                prefer_api: false,
                ..CrawlOptions::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(relative.keys().collect::<Vec<_>>(), vec!["lib.rs", "nested/mod.rs"]);

    let rooted = Crawler::new(MockHttpTransport::new(), cloner())
        .crawl_repo(
            locator,
            &CrawlOptions {
                prefer_api: false,
                path_style: PathStyle::RepoRoot,
                ..CrawlOptions::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(rooted.keys().collect::<Vec<_>>(), vec!["src/lib.rs", "src/nested/mod.rs"]);
}

#[tokio::test]
#[ignore = "requires network access to github.com"]
async fn live_public_repository_crawl() {
    let options = CrawlOptions {
        token: std::env::var("GITHUB_TOKEN").ok(),
        filter: FilterSpec::new(["*.md"], Vec::<String>::new(), 100_000),
        ..CrawlOptions::default()
    };
    let files = sourcelens_core::crawl_github_repo("https://github.com/rust-lang/log", &options)
        .await
        .unwrap();
    assert!(files.contains_key("README.md"));
}
