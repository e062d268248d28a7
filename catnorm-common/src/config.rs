//! Bootstrap configuration loading
//!
//! Settings are resolved in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)
//!
//! The TOML file only carries bootstrap values. API keys are never read from
//! it; the file names the environment variable that holds the key instead.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable pointing at an explicit config file
pub const CONFIG_ENV_VAR: &str = "CATNORM_CONFIG";
/// Environment variable overriding the database path
pub const DATABASE_ENV_VAR: &str = "CATNORM_DATABASE";
/// Environment variable overriding the AI service base URL
pub const AI_BASE_URL_ENV_VAR: &str = "ARLIAI_BASE_URL";
/// Environment variable overriding the AI model name
pub const AI_MODEL_ENV_VAR: &str = "ARLIAI_MODEL";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Path to the SQLite session database (optional)
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub ai: AiSection,

    #[serde(default)]
    pub pipeline: PipelineSection,

    #[serde(default)]
    pub batch: BatchSection,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// AI service connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiSection {
    #[serde(default = "default_ai_base_url")]
    pub base_url: String,

    #[serde(default = "default_ai_model")]
    pub model: String,

    /// Name of the environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,

    #[serde(default = "default_burst")]
    pub burst: u32,
}

impl Default for AiSection {
    fn default() -> Self {
        Self {
            base_url: default_ai_base_url(),
            model: default_ai_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
            requests_per_second: default_requests_per_second(),
            burst: default_burst(),
        }
    }
}

impl AiSection {
    /// Read the API key from the configured environment variable
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}

/// Pipeline defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSection {
    #[serde(default = "default_strategy")]
    pub default_strategy: String,

    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    #[serde(default)]
    pub use_chat: bool,

    /// Optional JSON file with extra folding strategies
    #[serde(default)]
    pub strategies_file: Option<PathBuf>,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            default_strategy: default_strategy(),
            max_depth: default_max_depth(),
            use_chat: false,
            strategies_file: None,
        }
    }
}

/// Batch driver settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSection {
    /// Delay between consecutive AI calls in milliseconds
    #[serde(default = "default_inter_call_delay_ms")]
    pub inter_call_delay_ms: u64,
}

impl Default for BatchSection {
    fn default() -> Self {
        Self {
            inter_call_delay_ms: default_inter_call_delay_ms(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_ai_base_url() -> String {
    "https://api.arliai.com/v1".to_string()
}

fn default_ai_model() -> String {
    "GLM-4.5-Air".to_string()
}

fn default_api_key_env() -> String {
    "ARLIAI_API_KEY".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_requests_per_second() -> u32 {
    1
}

fn default_burst() -> u32 {
    5
}

fn default_strategy() -> String {
    "top_priority".to_string()
}

fn default_max_depth() -> u32 {
    2
}

fn default_inter_call_delay_ms() -> u64 {
    200
}

impl TomlConfig {
    /// Load configuration from an explicit TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: TomlConfig = toml::from_str(&content)?;
        config.validate()?;
        debug!(path = %path.display(), "Loaded TOML config");
        Ok(config)
    }

    /// Resolve configuration: CLI path, then `CATNORM_CONFIG`, then the
    /// platform config file, then built-in defaults.
    ///
    /// Environment overrides for the AI section are applied last.
    pub fn resolve(cli_path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = cli_path {
            Self::load(path)?
        } else if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            Self::load(Path::new(&path))?
        } else if let Ok(path) = default_config_file() {
            info!(path = %path.display(), "Using config file");
            Self::load(&path)?
        } else {
            debug!("No config file found, using built-in defaults");
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply `ARLIAI_BASE_URL` and `ARLIAI_MODEL` when set
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(AI_BASE_URL_ENV_VAR) {
            if !url.trim().is_empty() {
                self.ai.base_url = url;
            }
        }
        if let Ok(model) = std::env::var(AI_MODEL_ENV_VAR) {
            if !model.trim().is_empty() {
                self.ai.model = model;
            }
        }
    }

    /// Reject values that would make the pipeline misbehave
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.max_depth == 0 {
            return Err(Error::Config("pipeline.max_depth must be at least 1".to_string()));
        }
        if self.ai.requests_per_second == 0 {
            return Err(Error::Config("ai.requests_per_second must be at least 1".to_string()));
        }
        if self.ai.burst == 0 {
            return Err(Error::Config("ai.burst must be at least 1".to_string()));
        }
        if self.pipeline.default_strategy.trim().is_empty() {
            return Err(Error::Config("pipeline.default_strategy must not be empty".to_string()));
        }
        Ok(())
    }

    /// Database path following the resolution order:
    /// CLI → `CATNORM_DATABASE` → TOML → OS data directory.
    pub fn database_path(&self, cli_arg: Option<&Path>) -> PathBuf {
        if let Some(path) = cli_arg {
            return path.to_path_buf();
        }

        if let Ok(path) = std::env::var(DATABASE_ENV_VAR) {
            return PathBuf::from(path);
        }

        if let Some(path) = &self.database_path {
            return path.clone();
        }

        default_data_folder().join("catnorm.db")
    }
}

/// Locate the platform config file
fn default_config_file() -> Result<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("catnorm").join("config.toml"));

    if let Some(path) = user_config {
        if path.exists() {
            return Ok(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/catnorm/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }
    }

    Err(Error::Config("No config file found".to_string()))
}

/// OS-dependent default data folder
fn default_data_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("catnorm"))
        .unwrap_or_else(|| PathBuf::from("./catnorm_data"))
}
