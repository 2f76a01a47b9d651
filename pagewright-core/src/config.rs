//! Configuration management for Pagewright
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (PAGEWRIGHT_*)
//! 3. Config file (~/.config/pagewright/config.toml)
//! 4. Default values

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Webhook service configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the HTTP service binds to
    pub bind: String,

    /// Number of pipeline workers
    pub workers: usize,

    /// Maximum number of events waiting for a worker
    pub queue_capacity: usize,

    /// Largest accepted request body, in bytes
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
            workers: 2,
            queue_capacity: 64,
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// Where local state lives
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding one working copy per repository
    pub workspace_dir: PathBuf,

    /// JSON document mapping tasks to repositories
    pub registry_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let base = default_data_dir();
        Self {
            workspace_dir: base.join("repos"),
            registry_path: base.join("task_repo_mapping.json"),
        }
    }
}

/// Which repository provider backs publication
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// GitHub repositories with GitHub Pages
    #[default]
    Github,
    /// Bare repositories in a local directory
    Local,
}

impl std::str::FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "github" => Ok(Self::Github),
            "local" => Ok(Self::Local),
            other => Err(Error::Config(format!(
                "Unknown provider '{}'. Expected 'github' or 'local'",
                other
            ))),
        }
    }
}

/// Repository provider configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Provider implementation
    pub kind: ProviderKind,

    /// Account owning the repositories (looked up from the token when unset)
    pub owner: Option<String>,

    /// Branch that is pushed and published
    pub branch: String,

    /// Root directory for the local provider's bare repositories
    pub local_root: PathBuf,

    /// Timeout for provider API calls
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::Github,
            owner: None,
            branch: "main".to_string(),
            local_root: default_data_dir().join("remotes"),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Push and pages behaviour
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PublishConfig {
    /// Push attempts before giving up
    pub push_attempts: u32,

    /// Fixed delay between push attempts
    #[serde(with = "humantime_serde")]
    pub push_delay: Duration,

    /// How many times the pages URL is polled for liveness
    pub pages_poll_attempts: u32,

    /// Spacing between liveness polls
    #[serde(with = "humantime_serde")]
    pub pages_poll_interval: Duration,

    /// Commit author name
    pub author_name: String,

    /// Commit author email
    pub author_email: String,

    /// Name written into the injected LICENSE
    pub license_holder: String,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            push_attempts: 3,
            push_delay: Duration::from_secs(2),
            pages_poll_attempts: 12,
            pages_poll_interval: Duration::from_secs(5),
            author_name: "pagewright".to_string(),
            author_email: "pagewright@users.noreply.github.com".to_string(),
            license_holder: "Pagewright contributors".to_string(),
        }
    }
}

/// Language model endpoint used to generate site content
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// OpenAI-compatible chat completions URL
    pub api_url: String,

    /// Model identifier
    pub model: String,

    /// Whole-request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Connection timeout
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Attempts before the generation stage is given up
    pub max_attempts: u32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            api_url: "https://aipipe.org/openrouter/v1/chat/completions".to_string(),
            model: "openai/gpt-4.1-mini".to_string(),
            timeout: Duration::from_secs(120),
            connect_timeout: Duration::from_secs(20),
            max_attempts: 3,
        }
    }
}

/// Evaluation callback delivery
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// Attempts before giving up
    pub max_attempts: u32,

    /// Delay after the first failure; doubles after each further failure
    #[serde(with = "humantime_serde")]
    pub initial_delay: Duration,

    /// Per-request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Return an error instead of `false` once attempts are exhausted
    pub strict: bool,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            initial_delay: Duration::from_secs(1),
            timeout: Duration::from_secs(10),
            strict: false,
        }
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// HTTP service
    pub server: ServerConfig,

    /// Local state locations
    pub storage: StorageConfig,

    /// Repository provider
    pub provider: ProviderConfig,

    /// Push and pages behaviour
    pub publish: PublishConfig,

    /// Content generator
    pub generator: GeneratorConfig,

    /// Evaluation notifier
    pub notifier: NotifierConfig,
}

/// Flags from the command line that override file and environment values
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub bind: Option<String>,
    pub workers: Option<usize>,
    pub provider: Option<ProviderKind>,
    pub workspace_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the default config file location
    ///
    /// Returns default config if file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = Self::default_config_path() {
            if path.exists() {
                return Self::load_from_file(&path);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(Error::Io)?;
        toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Get the default config file path
    ///
    /// Returns `~/.config/pagewright/config.toml` on Unix
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("pagewright").join("config.toml"))
    }

    /// Apply environment variable overrides
    ///
    /// Supported variables:
    /// - PAGEWRIGHT_BIND: Address for the HTTP service
    /// - PAGEWRIGHT_WORKSPACE_DIR: Directory for working copies
    /// - PAGEWRIGHT_REGISTRY_PATH: Task registry document
    /// - PAGEWRIGHT_PROVIDER: `github` or `local`
    /// - GITHUB_USER / PAGEWRIGHT_GITHUB_OWNER: Repository owner
    /// - PAGEWRIGHT_LLM_URL / PAGEWRIGHT_LLM_MODEL: Generator endpoint and model
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(bind) = std::env::var("PAGEWRIGHT_BIND") {
            self.server.bind = bind;
        }

        if let Ok(dir) = std::env::var("PAGEWRIGHT_WORKSPACE_DIR") {
            self.storage.workspace_dir = PathBuf::from(dir);
        }

        if let Ok(path) = std::env::var("PAGEWRIGHT_REGISTRY_PATH") {
            self.storage.registry_path = PathBuf::from(path);
        }

        if let Ok(kind) = std::env::var("PAGEWRIGHT_PROVIDER") {
            self.provider.kind = kind.parse()?;
        }

        if let Ok(owner) =
            std::env::var("PAGEWRIGHT_GITHUB_OWNER").or_else(|_| std::env::var("GITHUB_USER"))
        {
            if !owner.trim().is_empty() {
                self.provider.owner = Some(owner.trim().to_string());
            }
        }

        if let Ok(url) = std::env::var("PAGEWRIGHT_LLM_URL") {
            self.generator.api_url = url;
        }

        if let Ok(model) = std::env::var("PAGEWRIGHT_LLM_MODEL") {
            self.generator.model = model;
        }

        Ok(self)
    }

    /// Apply CLI flag overrides
    pub fn with_cli_overrides(mut self, overrides: CliOverrides) -> Self {
        if let Some(bind) = overrides.bind {
            self.server.bind = bind;
        }

        if let Some(workers) = overrides.workers {
            self.server.workers = workers;
        }

        if let Some(kind) = overrides.provider {
            self.provider.kind = kind;
        }

        if let Some(dir) = overrides.workspace_dir {
            self.storage.workspace_dir = dir;
        }

        self
    }

    /// Load configuration with all overrides applied
    ///
    /// Priority: CLI > env > config file > defaults
    pub fn load_with_overrides(config_path: Option<&Path>, overrides: CliOverrides) -> Result<Self> {
        let base = match config_path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::load()?,
        };

        Ok(base.with_env_overrides()?.with_cli_overrides(overrides))
    }
}

/// `~/.local/share/pagewright` on Linux, falling back to the working directory
fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|p| p.join("pagewright"))
        .unwrap_or_else(|| PathBuf::from(".pagewright"))
}
