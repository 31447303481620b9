//! Application configuration for doccrew.
//!
//! User config lives at `~/.doccrew/doccrew.toml`.
//! CLI flags override environment variables, which override config file
//! values, which override defaults. Secrets are never stored in the file;
//! only the *names* of the env vars holding them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DoccrewError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "doccrew.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".doccrew";

/// Environment variables recognized as overrides.
pub const ENV_GITHUB_REPO_BASE: &str = "GITHUB_REPO_BASE";
pub const ENV_GITLAB_REPO_BASE: &str = "GITLAB_REPO_BASE";
pub const ENV_GITLAB_PROJECT_ID: &str = "GITLAB_PROJECT_ID";
pub const ENV_GITLAB_BRANCH: &str = "GITLAB_BRANCH";

// ---------------------------------------------------------------------------
// Config structs (matching doccrew.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Website crawl settings.
    #[serde(default)]
    pub web: WebConfig,

    /// GitHub repository settings.
    #[serde(default)]
    pub github: GithubConfig,

    /// GitLab repository settings.
    #[serde(default)]
    pub gitlab: GitlabConfig,

    /// External agent runner settings.
    #[serde(default)]
    pub agents: AgentsConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Default JSON dump path.
    #[serde(default = "default_output")]
    pub output: String,

    /// Indentation of the JSON dump (2 or 4).
    #[serde(default = "default_json_indent")]
    pub json_indent: usize,

    /// Deepest link/directory level followed from the root.
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    /// Upper bound on pages or tree nodes visited in one run.
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,

    /// HTTP request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            json_indent: default_json_indent(),
            max_depth: default_max_depth(),
            max_pages: default_max_pages(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_output() -> String {
    "documentation_content.json".into()
}
fn default_json_indent() -> usize {
    4
}
fn default_max_depth() -> u32 {
    32
}
fn default_max_pages() -> usize {
    1000
}
fn default_timeout_secs() -> u64 {
    10
}

/// How web page bodies are stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyFormat {
    /// Newline-joined text of the main container.
    #[default]
    Text,
    /// Markdown rendering of the main container.
    Markdown,
}

/// `[web]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebConfig {
    /// Default seed URL when none is given on the command line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed_url: Option<String>,

    #[serde(default)]
    pub body_format: BodyFormat,
}

/// `[github]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubConfig {
    /// API root, e.g. `https://api.github.com/repos/<owner>/<repo>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_base: Option<String>,

    /// Branch, tag or commit passed as `?ref=`; the default branch when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_ref: Option<String>,

    /// Name of the env var holding an optional API token.
    #[serde(default = "default_github_token_env")]
    pub token_env: String,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            repo_base: None,
            git_ref: None,
            token_env: default_github_token_env(),
        }
    }
}

impl GithubConfig {
    /// Token from the configured env var, if set and non-empty.
    pub fn token(&self) -> Option<String> {
        non_empty_env(&self.token_env)
    }
}

fn default_github_token_env() -> String {
    "GITHUB_TOKEN".into()
}

/// `[gitlab]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitlabConfig {
    /// API v4 root used together with `project_id`.
    #[serde(default = "default_gitlab_api_base")]
    pub api_base: String,

    /// Full project API root; takes precedence over `api_base` + `project_id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_base: Option<String>,

    /// Numeric or URL-encoded project id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,

    #[serde(default = "default_gitlab_branch")]
    pub branch: String,

    /// Name of the env var holding the private token.
    #[serde(default = "default_gitlab_token_env")]
    pub token_env: String,
}

impl Default for GitlabConfig {
    fn default() -> Self {
        Self {
            api_base: default_gitlab_api_base(),
            repo_base: None,
            project_id: None,
            branch: default_gitlab_branch(),
            token_env: default_gitlab_token_env(),
        }
    }
}

impl GitlabConfig {
    /// Token from the configured env var, if set and non-empty.
    pub fn token(&self) -> Option<String> {
        non_empty_env(&self.token_env)
    }

    /// Resolve the project API root.
    ///
    /// Fails with a config error when neither `repo_base` nor `project_id`
    /// is available.
    pub fn project_root(&self) -> Result<String> {
        if let Some(base) = &self.repo_base {
            return Ok(base.trim_end_matches('/').to_string());
        }
        let id = require(self.project_id.as_deref(), ENV_GITLAB_PROJECT_ID)?;
        Ok(format!("{}/projects/{id}", self.api_base.trim_end_matches('/')))
    }
}

fn default_gitlab_api_base() -> String {
    "https://gitlab.com/api/v4".into()
}
fn default_gitlab_branch() -> String {
    "main".into()
}
fn default_gitlab_token_env() -> String {
    "GITLAB_TOKEN".into()
}

/// `[agents]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentsConfig {
    /// Program that hosts the agent framework.
    #[serde(default = "default_runner_cmd")]
    pub runner_cmd: String,

    /// Arguments passed to `runner_cmd`.
    #[serde(default = "default_runner_args")]
    pub runner_args: Vec<String>,

    /// LLM identifier forwarded to the runner.
    #[serde(default = "default_model")]
    pub model: String,

    /// Embedding model forwarded to the runner.
    #[serde(default = "default_embedder_model")]
    pub embedder_model: String,

    /// Name of the env var holding the LLM provider key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Payload mode: "auto", "batch", or "per-page".
    #[serde(default = "default_payload")]
    pub payload: String,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            runner_cmd: default_runner_cmd(),
            runner_args: default_runner_args(),
            model: default_model(),
            embedder_model: default_embedder_model(),
            api_key_env: default_api_key_env(),
            payload: default_payload(),
        }
    }
}

fn default_runner_cmd() -> String {
    "python3".into()
}
fn default_runner_args() -> Vec<String> {
    vec!["agent_runner.py".into()]
}
fn default_model() -> String {
    "gemini/gemini-1.5-flash-latest".into()
}
fn default_embedder_model() -> String {
    "models/embedding-001".into()
}
fn default_api_key_env() -> String {
    "GEMINI_API_KEY".into()
}
fn default_payload() -> String {
    "auto".into()
}

// ---------------------------------------------------------------------------
// Traversal limits (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Guards applied to every traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkLimits {
    /// Nodes deeper than this (root = 0) are not visited.
    pub max_depth: u32,
    /// Traversal stops after this many visited nodes.
    pub max_nodes: usize,
}

impl Default for WalkLimits {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_nodes: default_max_pages(),
        }
    }
}

impl From<&AppConfig> for WalkLimits {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_depth: config.defaults.max_depth,
            max_nodes: config.defaults.max_pages,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.doccrew/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| DoccrewError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.doccrew/doccrew.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk and apply env overrides.
/// Returns defaults (plus env overrides) if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    let mut config = if path.exists() {
        load_config_from(&path)?
    } else {
        tracing::debug!(?path, "config file not found, using defaults");
        AppConfig::default()
    };

    apply_env(&mut config, non_empty_env);
    Ok(config)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| DoccrewError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| DoccrewError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Overlay recognized environment variables onto `config`.
///
/// `lookup` is injected so tests do not depend on the process environment.
pub fn apply_env(config: &mut AppConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup(ENV_GITHUB_REPO_BASE) {
        config.github.repo_base = Some(v);
    }
    if let Some(v) = lookup(ENV_GITLAB_REPO_BASE) {
        config.gitlab.repo_base = Some(v);
    }
    if let Some(v) = lookup(ENV_GITLAB_PROJECT_ID) {
        config.gitlab.project_id = Some(v);
    }
    if let Some(v) = lookup(ENV_GITLAB_BRANCH) {
        config.gitlab.branch = v;
    }
}

/// Load a `.env` file from the working directory, if one exists.
pub fn load_dotenv() {
    match dotenv::dotenv() {
        Ok(path) => tracing::debug!(?path, "loaded .env"),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!(error = %e, "failed to load .env"),
    }
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| DoccrewError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| DoccrewError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| DoccrewError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Unwrap a required setting or fail with a config error naming its env var.
pub fn require<'a>(value: Option<&'a str>, env_var: &str) -> Result<&'a str> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(DoccrewError::config(format!(
            "missing required setting: set the {env_var} environment variable"
        ))),
    }
}

/// Check that the LLM provider API key env var is set and non-empty.
pub fn validate_api_key(config: &AppConfig) -> Result<()> {
    let var_name = &config.agents.api_key_env;
    match non_empty_env(var_name) {
        Some(_) => Ok(()),
        None => Err(DoccrewError::config(format!(
            "LLM provider API key not found. Set the {var_name} environment variable."
        ))),
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("json_indent"));
        assert!(toml_str.contains("GEMINI_API_KEY"));
        assert!(toml_str.contains("https://gitlab.com/api/v4"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.defaults.max_depth, 32);
        assert_eq!(parsed.gitlab.branch, "main");
        assert_eq!(parsed.web.body_format, BodyFormat::Text);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[defaults]
json_indent = 2

[web]
body_format = "markdown"

[gitlab]
project_id = "12345"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.defaults.json_indent, 2);
        assert_eq!(config.defaults.timeout_secs, 10);
        assert_eq!(config.web.body_format, BodyFormat::Markdown);
        assert_eq!(
            config.gitlab.project_root().unwrap(),
            "https://gitlab.com/api/v4/projects/12345"
        );
    }

    #[test]
    fn env_overrides_file_values() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_GITLAB_PROJECT_ID, "777"),
            (ENV_GITLAB_BRANCH, "develop"),
            (ENV_GITHUB_REPO_BASE, "https://api.github.com/repos/o/r"),
        ]);
        let mut config = AppConfig::default();
        config.gitlab.project_id = Some("1".into());

        apply_env(&mut config, |k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.gitlab.project_id.as_deref(), Some("777"));
        assert_eq!(config.gitlab.branch, "develop");
        assert_eq!(
            config.github.repo_base.as_deref(),
            Some("https://api.github.com/repos/o/r")
        );
    }

    #[test]
    fn gitlab_repo_base_wins_over_project_id() {
        let config = GitlabConfig {
            repo_base: Some("https://git.example.com/api/v4/projects/9/".into()),
            project_id: Some("1".into()),
            ..Default::default()
        };
        assert_eq!(
            config.project_root().unwrap(),
            "https://git.example.com/api/v4/projects/9"
        );
    }

    #[test]
    fn missing_project_is_config_error() {
        let err = GitlabConfig::default().project_root().unwrap_err();
        assert!(matches!(err, DoccrewError::Config { .. }));
        assert!(err.to_string().contains(ENV_GITLAB_PROJECT_ID));
    }

    #[test]
    fn walk_limits_from_app_config() {
        let mut app = AppConfig::default();
        app.defaults.max_pages = 50;
        let limits = WalkLimits::from(&app);
        assert_eq!(limits.max_depth, 32);
        assert_eq!(limits.max_nodes, 50);
    }

    #[test]
    fn api_key_validation() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.agents.api_key_env = "DOCCREW_TEST_NONEXISTENT_KEY_12345".into();
        let result = validate_api_key(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }
}
