/// `load_config` module: reads the optional YAML config file and turns it into [`CrawlOptions`].
///
/// The file only ever supplies defaults. Command line flags are layered on top of it in
/// [`crate::cli`], so a run without `--config` behaves exactly like a run with an empty file.
///
/// # Accepted schema
/// ```yaml
/// source:
///   include_patterns: ["*.rs", "*.md"]
///   default_exclude_patterns: ["target/*", "*.lock"]
///   max_file_size_bytes: 150000
///   use_relative_paths: true
///   prefer_api: true
///   github_token_env_var: GITHUB_TOKEN
///   api_base_url: https://api.github.com
/// ```
///
/// # Errors
/// Read and parse failures are returned as `anyhow::Error` with the config path in the message.
use anyhow::Result;
use serde::Deserialize;
use sourcelens_core::{CrawlOptions, FilterSpec, PathStyle, DEFAULT_MAX_FILE_SIZE};
use std::fs;
use std::path::Path;
use tracing::{debug, error, info};

#[derive(Debug, Default, Deserialize)]
pub struct CliConfig {
    #[serde(default)]
    pub source: SourceSection,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SourceSection {
    pub include_patterns: Vec<String>,
    pub default_exclude_patterns: Vec<String>,
    pub max_file_size_bytes: u64,
    pub use_relative_paths: bool,
    pub prefer_api: bool,
    /// Name of the environment variable holding the token.
    pub github_token_env_var: String,
    /// Inline token. Prefer `github_token_env_var`.
    pub github_token: Option<String>,
    pub api_base_url: Option<String>,
}

impl Default for SourceSection {
    fn default() -> Self {
        Self {
            include_patterns: Vec::new(),
            default_exclude_patterns: Vec::new(),
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE,
            use_relative_paths: true,
            prefer_api: true,
            github_token_env_var: "GITHUB_TOKEN".to_string(),
            github_token: None,
            api_base_url: None,
        }
    }
}

impl SourceSection {
    /// Inline token first, then the configured environment variable. Empty values count as unset.
    pub fn resolve_token(&self) -> Option<String> {
        self.github_token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| {
                std::env::var(&self.github_token_env_var)
                    .ok()
                    .filter(|t| !t.trim().is_empty())
            })
    }

    pub fn to_crawl_options(&self) -> CrawlOptions {
        CrawlOptions {
            token: self.resolve_token(),
            filter: FilterSpec::new(
                self.include_patterns.iter().cloned(),
                self.default_exclude_patterns.iter().cloned(),
                self.max_file_size_bytes,
            ),
            path_style: if self.use_relative_paths {
                PathStyle::Relative
            } else {
                PathStyle::RepoRoot
            },
            prefer_api: self.prefer_api,
        }
    }
}

/// Load a YAML config file. An empty file yields the defaults.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            debug!(config_path = ?path_ref, bytes = content.len(), "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    if config_content.trim().is_empty() {
        info!(config_path = ?path_ref, "Config file is empty, using defaults");
        return Ok(CliConfig::default());
    }

    match serde_yaml::from_str::<CliConfig>(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            Ok(conf)
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            Err(anyhow::anyhow!("Failed to parse config YAML: {e}"))
        }
    }
}
