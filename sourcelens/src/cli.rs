///
/// This module implements the CLI for sourcelens: argument parsing, merging flags over the
/// optional YAML config, and writing the fetched file map.
///
/// All crawling logic lives in [`sourcelens-core`]. This module is CLI glue only.
///
/// ## How To Use
/// - From a shell: `sourcelens fetch --repo https://github.com/owner/repo --output files.json`
/// - Programmatically (integration tests): build a [`Cli`] and call [`run`].
///
/// ## Precedence
/// Flags win over the config file. `--include` replaces the configured include patterns,
/// `--exclude` adds to the configured default excludes.
///
/// [`sourcelens-core`]: ../../sourcelens_core/
use crate::load_config::{load_config, CliConfig};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use sourcelens_core::{CrawlOptions, Crawler, FetchedSource, FilterSpec, PathStyle, SourceLocator};
use std::fs;
use std::io::Write;
use std::path::PathBuf;

/// CLI for sourcelens: fetch a repository or directory as a map of paths to contents.
#[derive(Parser, Debug)]
#[clap(
    name = "sourcelens",
    version,
    about = "Fetch the source files of a GitHub repository or local directory as JSON"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch every included file of one source
    Fetch(FetchArgs),
}

#[derive(Args, Debug, Default)]
pub struct FetchArgs {
    /// GitHub locator (HTTPS or SSH), optionally with /tree/<ref>/<path>
    #[clap(long, conflicts_with = "dir", required_unless_present = "dir")]
    pub repo: Option<String>,

    /// Local directory to crawl instead of a repository
    #[clap(long)]
    pub dir: Option<PathBuf>,

    /// Path to the YAML config file
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Include glob (repeatable); replaces configured include patterns
    #[clap(long = "include")]
    pub include: Vec<String>,

    /// Exclude glob (repeatable); added to configured excludes
    #[clap(long = "exclude")]
    pub exclude: Vec<String>,

    /// Maximum file size in bytes
    #[clap(long)]
    pub max_size: Option<u64>,

    /// GitHub token for the contents API
    #[clap(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Skip the contents API and always clone
    #[clap(long)]
    pub no_api: bool,

    /// Key files from the repository root instead of the requested subdirectory
    #[clap(long)]
    pub full_paths: bool,

    /// Fail when no file matches
    #[clap(long)]
    pub require_files: bool,

    /// Write the file map as JSON here instead of stdout
    #[clap(long)]
    pub output: Option<PathBuf>,
}

impl FetchArgs {
    fn source(&self) -> Result<SourceLocator> {
        match (&self.repo, &self.dir) {
            (Some(repo), None) => Ok(SourceLocator::Repo(repo.clone())),
            (None, Some(dir)) => Ok(SourceLocator::LocalDir(dir.clone())),
            _ => Err(anyhow::anyhow!("exactly one of --repo or --dir is required")),
        }
    }

    /// Layer the flags over the config file's options.
    pub fn crawl_options(&self, config: &CliConfig) -> CrawlOptions {
        let base = config.source.to_crawl_options();

        let include = if self.include.is_empty() {
            base.filter.include_patterns
        } else {
            self.include.iter().cloned().collect()
        };
        let mut exclude = base.filter.exclude_patterns;
        exclude.extend(self.exclude.iter().cloned());

        CrawlOptions {
            token: self
                .token
                .clone()
                .filter(|t| !t.trim().is_empty())
                .or(base.token),
            filter: FilterSpec {
                include_patterns: include,
                exclude_patterns: exclude,
                max_file_size: self.max_size.unwrap_or(base.filter.max_file_size),
            },
            path_style: if self.full_paths {
                PathStyle::RepoRoot
            } else {
                base.path_style
            },
            prefer_api: base.prefer_api && !self.no_api,
        }
    }
}

fn write_output(fetched: &FetchedSource, output: Option<&PathBuf>) -> Result<()> {
    let json = serde_json::to_string_pretty(&fetched.files).context("Failed to serialise file map")?;
    match output {
        Some(path) => {
            fs::write(path, json)
                .with_context(|| format!("Failed to write output file {}", path.display()))?;
            tracing::info!(output = %path.display(), files = fetched.files.len(), "Wrote file map");
            println!(
                "Fetched {} files from {} into {}",
                fetched.files.len(),
                fetched.project_name,
                path.display()
            );
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{json}").context("Failed to write to stdout")?;
        }
    }
    Ok(())
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Fetch(args) => {
            let config = match &args.config {
                Some(path) => load_config(path)?,
                None => CliConfig::default(),
            };
            let options = args.crawl_options(&config);
            options.trace_loaded();
            let source = args.source()?;

            let mut crawler = Crawler::github().context("Failed to set up crawler")?;
            if let Some(api_base) = &config.source.api_base_url {
                crawler = crawler.with_api_base(api_base.as_str());
            }

            tracing::info!(command = "fetch", source = ?source, "Starting fetch");
            let fetched = crawler
                .fetch_source(&source, &options, args.require_files)
                .await
                .map_err(|e| {
                    tracing::error!(command = "fetch", error = %e, "Fetch failed");
                    anyhow::Error::new(e)
                })
                .context("Fetch failed")?;
            tracing::info!(
                command = "fetch",
                project = %fetched.project_name,
                files = fetched.files.len(),
                "Fetch complete"
            );
            write_output(&fetched, args.output.as_ref())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_config::SourceSection;

    #[test]
    fn flags_override_config() {
        let config = CliConfig {
            source: SourceSection {
                include_patterns: vec!["*.md".into()],
                default_exclude_patterns: vec!["target/*".into()],
                max_file_size_bytes: 10,
                github_token: Some("from-config".into()),
                ..SourceSection::default()
            },
        };
        let args = FetchArgs {
            repo: Some("https://github.com/acme/demo".into()),
            include: vec!["*.rs".into()],
            exclude: vec!["*.lock".into()],
            max_size: Some(99),
            token: Some("from-flag".into()),
            no_api: true,
            full_paths: true,
            ..FetchArgs::default()
        };

        let options = args.crawl_options(&config);
        assert_eq!(options.filter.include_patterns.len(), 1);
        assert!(options.filter.include_patterns.contains("*.rs"));
        assert!(options.filter.exclude_patterns.contains("target/*"));
        assert!(options.filter.exclude_patterns.contains("*.lock"));
        assert_eq!(options.filter.max_file_size, 99);
        assert_eq!(options.token.as_deref(), Some("from-flag"));
        assert!(!options.prefer_api);
        assert_eq!(options.path_style, PathStyle::RepoRoot);
    }

    #[test]
    fn config_applies_without_flags() {
        let config = CliConfig {
            source: SourceSection {
                include_patterns: vec!["*.md".into()],
                use_relative_paths: false,
                github_token: Some("from-config".into()),
                ..SourceSection::default()
            },
        };
        let args = FetchArgs {
            dir: Some(PathBuf::from(".")),
            ..FetchArgs::default()
        };
        let options = args.crawl_options(&config);
        assert!(options.filter.include_patterns.contains("*.md"));
        assert_eq!(options.filter.max_file_size, 150_000);
        assert_eq!(options.token.as_deref(), Some("from-config"));
        assert_eq!(options.path_style, PathStyle::RepoRoot);
        assert!(options.prefer_api);
    }

    #[test]
    fn parses_fetch_flags() {
        let cli = Cli::try_parse_from([
            "sourcelens",
            "fetch",
            "--dir",
            "/tmp/project",
            "--include",
            "*.rs",
            "--include",
            "*.toml",
            "--max-size",
            "42",
            "--require-files",
        ])
        .unwrap();
        let Commands::Fetch(args) = cli.command;
        assert_eq!(args.dir, Some(PathBuf::from("/tmp/project")));
        assert_eq!(args.include, vec!["*.rs", "*.toml"]);
        assert_eq!(args.max_size, Some(42));
        assert!(args.require_files);
    }

    #[test]
    fn repo_and_dir_are_mutually_exclusive() {
        assert!(Cli::try_parse_from(["sourcelens", "fetch", "--repo", "x", "--dir", "y"]).is_err());
        assert!(Cli::try_parse_from(["sourcelens", "fetch"]).is_err());
    }
}
