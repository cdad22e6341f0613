use std::path::Path;
use std::process::Command;
use tracing::{error, info};

use crate::config::{FilterSpec, PathStyle};
use crate::contract::RepoCloner;
use crate::error::CrawlError;
use crate::filter::Filter;
use crate::local::{walk_tree, WalkSettings};
use crate::reference::RepoReference;
use crate::FileMap;

const CLONE_DEPTH: &str = "1";

/// Clones through the `git` executable on `PATH`.
#[derive(Debug, Clone, Default)]
pub struct GitCli;

impl GitCli {
    pub fn new() -> Self {
        Self
    }
}

fn auth_hint(stderr: &str) -> Option<&'static str> {
    let lower = stderr.to_lowercase();
    if lower.contains("authentication failed")
        || lower.contains("could not read")
        || lower.contains("not found")
    {
        Some("authentication failed or repository not found")
    } else {
        None
    }
}

/// Map a failed `git clone` to an error. Credential and visibility failures are `Auth`.
fn clone_failure(url: &str, stderr: &str) -> CrawlError {
    match auth_hint(stderr) {
        Some(hint) => CrawlError::Auth(format!("{hint} for '{url}': {stderr}")),
        None => CrawlError::Clone(format!("could not clone '{url}': {stderr}")),
    }
}

impl RepoCloner for GitCli {
    fn ensure_available(&self) -> Result<(), CrawlError> {
        which::which("git").map(|_| ()).map_err(|e| {
            error!(error = %e, "git executable not found on PATH");
            CrawlError::DependencyMissing(format!("git executable not found on PATH: {e}"))
        })
    }

    fn clone_shallow(&self, url: &str, dest: &Path) -> Result<(), CrawlError> {
        // `git clone --depth 1 <url> <dest>`
        let output = Command::new("git")
            .arg("clone")
            .arg("--depth")
            .arg(CLONE_DEPTH)
            .arg("--quiet")
            .arg(url)
            .arg(dest)
            .env("GIT_TERMINAL_PROMPT", "0")
            .output();

        match output {
            Ok(out) if out.status.success() => {
                info!(repo_url = url, path = %dest.display(), "Cloned git repository");
                Ok(())
            }
            Ok(out) => {
                let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
                error!(
                    repo_url = url,
                    path = %dest.display(),
                    status = ?out.status,
                    stderr = %stderr,
                    "Git clone exited with non-zero code"
                );
                Err(clone_failure(url, &stderr))
            }
            Err(e) => {
                error!(error = ?e, repo_url = url, "Failed to launch git process");
                Err(CrawlError::DependencyMissing(format!("could not run git: {e}")))
            }
        }
    }

    fn checkout(&self, repo_dir: &Path, reference: &str) -> Result<(), CrawlError> {
        let output = Command::new("git")
            .arg("-C")
            .arg(repo_dir)
            .arg("checkout")
            .arg("--quiet")
            .arg(reference)
            .output();

        match output {
            Ok(out) if out.status.success() => {
                info!(reference = reference, path = %repo_dir.display(), "Checked out git reference");
                Ok(())
            }
            Ok(out) => {
                let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
                error!(
                    reference = reference,
                    path = %repo_dir.display(),
                    stderr = %stderr,
                    "Git checkout exited with non-zero code"
                );
                Err(CrawlError::Clone(format!(
                    "failed to check out ref '{reference}': {stderr}"
                )))
            }
            Err(e) => {
                error!(error = ?e, reference = reference, "Failed to launch git checkout");
                Err(CrawlError::DependencyMissing(format!("could not run git: {e}")))
            }
        }
    }
}

/// Shallow-clone `reference` into a temporary directory and walk it.
///
/// The temporary directory is removed when this function returns, on success,
/// error or panic alike.
pub fn clone_and_walk<C: RepoCloner + ?Sized>(
    cloner: &C,
    reference: &RepoReference,
    spec: &FilterSpec,
    path_style: PathStyle,
) -> Result<FileMap, CrawlError> {
    cloner.ensure_available()?;
    let filter = Filter::new(spec)?;

    let tmp = tempfile::Builder::new()
        .prefix("sourcelens-clone-")
        .tempdir()
        .map_err(|e| {
            error!(error = ?e, "Failed to create temporary clone directory");
            CrawlError::Io(e)
        })?;
    let repo_root = tmp.path();

    info!(
        repo_url = %reference.clone_url,
        reference = reference.reference.as_deref().unwrap_or("default"),
        path = %repo_root.display(),
        "Cloning git repository"
    );
    cloner.clone_shallow(&reference.clone_url, repo_root)?;
    if let Some(git_ref) = &reference.reference {
        cloner.checkout(repo_root, git_ref)?;
    }

    let subpath = reference.subpath.trim_matches('/');
    let walk_root = if subpath.is_empty() {
        repo_root.to_path_buf()
    } else {
        repo_root.join(subpath)
    };
    if !walk_root.is_dir() {
        return Err(CrawlError::Clone(format!(
            "subdirectory '{subpath}' not found in '{}'",
            reference.slug()
        )));
    }

    let key_prefix = match path_style {
        PathStyle::RepoRoot if !subpath.is_empty() => Some(subpath),
        _ => None,
    };
    info!(path = %walk_root.display(), "Walking cloned tree");
    let outcome = walk_tree(
        &walk_root,
        &filter,
        WalkSettings {
            key_prefix,
            skip_git_dir: subpath.is_empty(),
        },
    );
    if outcome.skipped > 0 {
        info!(
            skipped = outcome.skipped,
            "Skipped files due to size limits, filters, or read errors during clone walk"
        );
    }
    info!(files = outcome.files.len(), repo = %reference.slug(), "Clone crawl complete");
    Ok(outcome.files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::MockRepoCloner;
    use std::fs;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    fn write_fixture(dest: &Path) {
        fs::create_dir_all(dest.join(".git")).unwrap();
        fs::write(dest.join(".git/HEAD"), "ref: refs/heads/main").unwrap();
        fs::create_dir_all(dest.join("src/util")).unwrap();
        fs::write(dest.join("README.md"), "# widgets").unwrap();
        fs::write(dest.join("src/lib.rs"), "pub mod util;").unwrap();
        fs::write(dest.join("src/util/mod.rs"), "pub fn help() {}").unwrap();
    }

    fn fixture_cloner(seen: Arc<Mutex<Option<PathBuf>>>) -> MockRepoCloner {
        let mut cloner = MockRepoCloner::new();
        cloner.expect_ensure_available().returning(|| Ok(()));
        cloner.expect_clone_shallow().returning(move |_, dest| {
            write_fixture(dest);
            *seen.lock().unwrap() = Some(dest.to_path_buf());
            Ok(())
        });
        cloner
    }

    #[test]
    fn walks_clone_and_removes_temp_dir() {
        let seen = Arc::new(Mutex::new(None));
        let cloner = fixture_cloner(seen.clone());
        let reference = RepoReference::parse("https://github.com/acme/widgets").unwrap();

        let files =
            clone_and_walk(&cloner, &reference, &FilterSpec::default(), PathStyle::Relative)
                .unwrap();
        assert_eq!(files.len(), 3);
        assert!(files.contains_key("README.md"));
        assert!(files.contains_key("src/util/mod.rs"));
        assert!(!files.keys().any(|k| k.starts_with(".git")));

        let dir = seen.lock().unwrap().clone().unwrap();
        assert!(!dir.exists(), "temporary clone directory should be removed");
    }

    #[test]
    fn subpath_keys_follow_path_style() {
        let reference = RepoReference::parse("https://github.com/acme/widgets/tree/main/src").unwrap();

        let mut cloner = fixture_cloner(Arc::new(Mutex::new(None)));
        cloner
            .expect_checkout()
            .withf(|_, r| r == "main")
            .times(1)
            .returning(|_, _| Ok(()));
        let relative =
            clone_and_walk(&cloner, &reference, &FilterSpec::default(), PathStyle::Relative)
                .unwrap();
        assert_eq!(
            relative.keys().cloned().collect::<Vec<_>>(),
            vec!["lib.rs".to_string(), "util/mod.rs".to_string()]
        );

        let mut cloner = fixture_cloner(Arc::new(Mutex::new(None)));
        cloner.expect_checkout().returning(|_, _| Ok(()));
        let rooted =
            clone_and_walk(&cloner, &reference, &FilterSpec::default(), PathStyle::RepoRoot)
                .unwrap();
        assert!(rooted.contains_key("src/lib.rs"));
        assert!(rooted.contains_key("src/util/mod.rs"));
    }

    #[test]
    fn checkout_failure_is_a_clone_error_and_cleans_up() {
        let seen = Arc::new(Mutex::new(None));
        let mut cloner = fixture_cloner(seen.clone());
        cloner
            .expect_checkout()
            .returning(|_, r| Err(CrawlError::Clone(format!("pathspec '{r}' did not match"))));
        let reference =
            RepoReference::parse("https://github.com/acme/widgets/tree/deadbeef/src").unwrap();

        let err = clone_and_walk(&cloner, &reference, &FilterSpec::default(), PathStyle::Relative)
            .unwrap_err();
        assert!(matches!(err, CrawlError::Clone(_)));
        let dir = seen.lock().unwrap().clone().unwrap();
        assert!(!dir.exists());
    }

    #[test]
    fn missing_subpath_is_reported() {
        let cloner = fixture_cloner(Arc::new(Mutex::new(None)));
        let reference = RepoReference::parse("https://github.com/acme/widgets/docs").unwrap();
        let err = clone_and_walk(&cloner, &reference, &FilterSpec::default(), PathStyle::Relative)
            .unwrap_err();
        assert!(err.to_string().contains("docs"));
    }

    #[test]
    fn missing_git_fails_before_cloning() {
        let mut cloner = MockRepoCloner::new();
        cloner
            .expect_ensure_available()
            .returning(|| Err(CrawlError::DependencyMissing("git".into())));
        cloner.expect_clone_shallow().never();
        let reference = RepoReference::parse("git@github.com:acme/widgets.git").unwrap();
        let err = clone_and_walk(&cloner, &reference, &FilterSpec::default(), PathStyle::Relative)
            .unwrap_err();
        assert!(matches!(err, CrawlError::DependencyMissing(_)));
    }

    #[test]
    fn clone_auth_failures_are_typed() {
        let err = clone_failure(
            "https://github.com/acme/private.git",
            "fatal: could not read Username for 'https://github.com': terminal prompts disabled",
        );
        match err {
            CrawlError::Auth(msg) => assert!(msg.contains("acme/private")),
            other => panic!("unexpected error: {other:?}"),
        }

        let err = clone_failure("https://github.com/acme/widgets.git", "fatal: early EOF");
        assert!(matches!(err, CrawlError::Clone(_)));
    }

    #[test]
    fn auth_error_from_cloner_reaches_caller() {
        let mut cloner = MockRepoCloner::new();
        cloner.expect_ensure_available().returning(|| Ok(()));
        cloner
            .expect_clone_shallow()
            .returning(|url, _| Err(clone_failure(url, "remote: Repository not found.")));
        let reference = RepoReference::parse("git@github.com:acme/private.git").unwrap();

        let err = clone_and_walk(&cloner, &reference, &FilterSpec::default(), PathStyle::Relative)
            .unwrap_err();
        assert!(matches!(err, CrawlError::Auth(_)));
    }

    #[test]
    fn auth_hint_recognises_git_messages() {
        assert!(auth_hint("fatal: Authentication failed for 'https://github.com/x/y.git/'").is_some());
        assert!(auth_hint("remote: Repository not found.").is_some());
        assert!(auth_hint("fatal: early EOF").is_none());
    }
}
