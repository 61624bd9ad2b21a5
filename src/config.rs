//! Configuration.
//!
//! Two sources are combined into one immutable [`Settings`] value at
//! startup:
//!
//! - [`Config`]: non-secret settings from an optional TOML file. Every
//!   field has a default, so running without a file is normal.
//! - [`Credentials`]: secrets and identifiers from the process environment.
//!   Each one is optional; a missing value disables one capability (remote
//!   generation or workspace publishing) instead of failing the run.
//!
//! # Example
//!
//! ```toml
//! [paths]
//! output = "main.tf"
//! cache_dir = "cache"
//!
//! [generator]
//! model = "gpt-4o-mini"
//! temperature = 0.1
//!
//! [workspace]
//! organization = "acme"
//! name = "sandbox"
//!
//! [tags]
//! owner = "promptinfra"
//! extra = { Environment = "development", Team = "platform" }
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Config file read when `--config` is not given, if it exists.
pub const DEFAULT_CONFIG_PATH: &str = "promptinfra.toml";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub generator: GeneratorConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub tags: TagsConfig,
    #[serde(default)]
    pub templates: TemplatesConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PathsConfig {
    /// Primary artifact, overwritten on every run.
    #[serde(default = "default_output")]
    pub output: PathBuf,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    #[serde(default = "default_tracking_dir")]
    pub tracking_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            cache_dir: default_cache_dir(),
            tracking_dir: default_tracking_dir(),
        }
    }
}

fn default_output() -> PathBuf {
    PathBuf::from("main.tf")
}
fn default_cache_dir() -> PathBuf {
    PathBuf::from("cache")
}
fn default_tracking_dir() -> PathBuf {
    PathBuf::from("finops_tracking")
}

/// Chat-completion endpoint used for remote generation.
#[derive(Debug, Deserialize, Clone)]
pub struct GeneratorConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}
fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}
fn default_temperature() -> f64 {
    0.1
}
fn default_max_tokens() -> u32 {
    2000
}

/// Terraform Cloud (or Terraform Enterprise) workspace settings.
#[derive(Debug, Deserialize, Clone)]
pub struct WorkspaceConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_app_url")]
    pub app_url: String,
    /// Workspace name, or a `ws-` id. `TF_WORKSPACE` takes precedence.
    #[serde(default = "default_workspace_name")]
    pub name: String,
    /// `TF_ORGANIZATION` takes precedence.
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default = "default_true")]
    pub auto_queue_runs: bool,
    #[serde(default)]
    pub speculative: bool,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            app_url: default_app_url(),
            name: default_workspace_name(),
            organization: None,
            auto_queue_runs: true,
            speculative: false,
        }
    }
}

fn default_api_url() -> String {
    "https://app.terraform.io/api/v2".to_string()
}
fn default_app_url() -> String {
    "https://app.terraform.io/app".to_string()
}
fn default_workspace_name() -> String {
    "promptinfra-workspace".to_string()
}
fn default_true() -> bool {
    true
}

/// Tags added to every resource block.
#[derive(Debug, Deserialize, Clone)]
pub struct TagsConfig {
    /// Value of the `ManagedBy` tag.
    #[serde(default = "default_owner")]
    pub owner: String,
    #[serde(default = "default_extra_tags")]
    pub extra: BTreeMap<String, String>,
}

impl Default for TagsConfig {
    fn default() -> Self {
        Self {
            owner: default_owner(),
            extra: default_extra_tags(),
        }
    }
}

fn default_owner() -> String {
    "promptinfra".to_string()
}
fn default_extra_tags() -> BTreeMap<String, String> {
    BTreeMap::from([("Environment".to_string(), "development".to_string())])
}

#[derive(Debug, Deserialize, Clone)]
pub struct TemplatesConfig {
    /// AWS region written into fallback templates. `AWS_REGION` overrides.
    #[serde(default = "default_region")]
    pub region: String,
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
        }
    }
}

fn default_region() -> String {
    "us-east-1".to_string()
}

/// Load configuration.
///
/// With an explicit `path` the file must exist. Without one,
/// [`DEFAULT_CONFIG_PATH`] is read if present and defaults are used
/// otherwise.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => read_config(path)?,
        None => {
            let default = Path::new(DEFAULT_CONFIG_PATH);
            if default.exists() {
                read_config(default)?
            } else {
                Config::default()
            }
        }
    };
    validate(&config)?;
    Ok(config)
}

fn read_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

pub fn parse_config(content: &str) -> Result<Config> {
    Ok(toml::from_str(content)?)
}

fn validate(config: &Config) -> Result<()> {
    if !(0.0..=2.0).contains(&config.generator.temperature) {
        anyhow::bail!("generator.temperature must be in [0.0, 2.0]");
    }
    if config.generator.max_tokens == 0 {
        anyhow::bail!("generator.max_tokens must be > 0");
    }
    if config.tags.owner.trim().is_empty() {
        anyhow::bail!("tags.owner must not be empty");
    }
    for key in config.tags.extra.keys() {
        let needs_escape = key.contains(['"', '\\'])
            || key.contains("${")
            || key.contains("%{")
            || key.chars().any(char::is_control);
        if key.trim().is_empty() || needs_escape {
            anyhow::bail!("tags.extra key {:?} is not a usable tag key", key);
        }
    }
    if config.templates.region.trim().is_empty() {
        anyhow::bail!("templates.region must not be empty");
    }
    Ok(())
}

/// Secrets and identifiers resolved from the environment.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// `OPENAI_API_KEY`
    pub openai_api_key: Option<String>,
    /// `TF_API_TOKEN`
    pub tf_api_token: Option<String>,
    /// `TF_ORGANIZATION`
    pub tf_organization: Option<String>,
    /// `TF_WORKSPACE`
    pub tf_workspace: Option<String>,
}

impl Credentials {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve credentials through `lookup`. Blank values count as absent.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            openai_api_key: get("OPENAI_API_KEY"),
            tf_api_token: get("TF_API_TOKEN"),
            tf_organization: get("TF_ORGANIZATION"),
            tf_workspace: get("TF_WORKSPACE"),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("Credentials")
            .field("openai_api_key", &redact(&self.openai_api_key))
            .field("tf_api_token", &redact(&self.tf_api_token))
            .field("tf_organization", &self.tf_organization)
            .field("tf_workspace", &self.tf_workspace)
            .finish()
    }
}

/// Everything a run needs, resolved once.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub config: Config,
    pub credentials: Credentials,
}

impl Settings {
    pub fn from_env(config: Config) -> Self {
        Self::from_lookup(config, |key| std::env::var(key).ok())
    }

    /// Build settings, applying environment overrides through `lookup`.
    pub fn from_lookup(mut config: Config, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(region) = lookup("AWS_REGION").filter(|r| !r.trim().is_empty()) {
            config.templates.region = region;
        }
        Self {
            credentials: Credentials::from_lookup(lookup),
            config,
        }
    }

    /// Workspace name or id, environment first.
    pub fn workspace_target(&self) -> &str {
        self.credentials
            .tf_workspace
            .as_deref()
            .unwrap_or(&self.config.workspace.name)
    }

    /// Organization, environment first.
    pub fn organization(&self) -> Option<&str> {
        self.credentials
            .tf_organization
            .as_deref()
            .or(self.config.workspace.organization.as_deref())
    }
}
