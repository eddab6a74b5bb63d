//! Configuration for the sweep engine.
//!
//! Supports both environment variables and YAML config file.
//! Environment variables take precedence over config file values.

use crate::error::{Result, SweepError};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// LLM configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL for the LLM API (e.g., "https://api.openai.com")
    pub api_base: String,

    /// API key for authentication
    pub api_key: String,

    /// Model name (e.g., "gpt-4", "mistral-7b-instruct")
    pub model: String,

    /// Maximum tokens for response (optional)
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Temperature for generation (optional)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Whole-request timeout in seconds; an expired request is retried
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_max_tokens() -> u32 {
    512
}

fn default_temperature() -> f32 {
    0.0
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: String::new(),
            api_key: String::new(),
            model: "mistral-7b-instruct".to_string(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl LlmConfig {
    /// Validate that the fields needed to reach the API are present.
    pub fn validate(&self) -> Result<()> {
        if self.api_base.is_empty() {
            return Err(SweepError::Config(
                "LLM API base URL is required. Set LLM_API_BASE environment variable or add to config file.".to_string()
            ));
        }

        if self.api_key.is_empty() {
            return Err(SweepError::Config(
                "LLM API key is required. Set LLM_API_KEY environment variable or add to config file.".to_string()
            ));
        }

        if self.model.is_empty() {
            return Err(SweepError::Config(
                "LLM model is required. Set LLM_MODEL environment variable or add to config file."
                    .to_string(),
            ));
        }

        if self.timeout_secs == 0 {
            return Err(SweepError::Config(
                "LLM timeout must be at least one second".to_string(),
            ));
        }

        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Bounded retry with exponential backoff for transient API failures.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before the first retry, doubled on each further retry.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Upper bound for a single backoff delay.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryConfig {
    /// Backoff before retry number `attempt` (1-based), without jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.base_delay_ms.max(1);
        let exponent = attempt.saturating_sub(1).min(16);
        let backoff = base.saturating_mul(1u64 << exponent);
        Duration::from_millis(backoff.min(self.max_delay_ms.max(base)))
    }
}

/// Snapshot storage settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding `{experiment}_{timestamp}.json` snapshots.
    #[serde(default = "default_snapshot_dir")]
    pub snapshot_dir: PathBuf,
    /// Snapshots retained per experiment name.
    #[serde(default = "default_keep")]
    pub keep: usize,
}

fn default_snapshot_dir() -> PathBuf {
    PathBuf::from("data/snapshots")
}

fn default_keep() -> usize {
    5
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            snapshot_dir: default_snapshot_dir(),
            keep: default_keep(),
        }
    }
}

/// Full application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    /// LLM settings
    pub llm: LlmConfig,
    /// Retry settings for API-backed strategies
    pub retry: RetryConfig,
    /// Snapshot storage
    pub store: StoreConfig,
}

/// Configuration file structure (YAML format).
#[derive(Debug, Deserialize)]
struct ConfigFile {
    llm: Option<LlmFileSection>,
    retry: Option<RetryFileSection>,
    store: Option<StoreFileSection>,
}

#[derive(Debug, Deserialize)]
struct LlmFileSection {
    api_base: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RetryFileSection {
    max_retries: Option<u32>,
    base_delay_ms: Option<u64>,
    max_delay_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct StoreFileSection {
    snapshot_dir: Option<PathBuf>,
    keep: Option<usize>,
}

impl Config {
    /// Load configuration from environment variables and optional config file.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (LLM_API_BASE, LLM_API_KEY, LLM_MODEL, ...)
    /// 2. Config file (~/.config/qa-sweep/config.yaml)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        let mut config = Config::default();

        if let Some(config_path) = Self::config_file_path() {
            if config_path.exists() {
                config = Self::load_from_file(&config_path)?;
            }
        }

        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(api_base) = env::var("LLM_API_BASE") {
            self.llm.api_base = api_base;
        }

        if let Ok(api_key) = env::var("LLM_API_KEY") {
            self.llm.api_key = api_key;
        }

        if let Ok(model) = env::var("LLM_MODEL") {
            self.llm.model = model;
        }

        if let Some(tokens) = parse_env("LLM_MAX_TOKENS") {
            self.llm.max_tokens = tokens;
        }

        if let Some(temp) = parse_env("LLM_TEMPERATURE") {
            self.llm.temperature = temp;
        }

        if let Some(timeout) = parse_env("LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = timeout;
        }

        if let Some(retries) = parse_env("LLM_MAX_RETRIES") {
            self.retry.max_retries = retries;
        }

        if let Ok(dir) = env::var("SWEEP_SNAPSHOT_DIR") {
            self.store.snapshot_dir = PathBuf::from(dir);
        }

        if let Some(keep) = parse_env("SWEEP_KEEP_SNAPSHOTS") {
            self.store.keep = keep;
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| SweepError::io(path, e))?;
        Self::from_yaml(&content)
    }

    /// Parse a YAML config document, filling gaps with defaults.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let file_config: ConfigFile = serde_yaml::from_str(content)
            .map_err(|e| SweepError::Config(format!("Failed to parse config file: {}", e)))?;

        let mut config = Config::default();

        if let Some(llm) = file_config.llm {
            if let Some(api_base) = llm.api_base {
                config.llm.api_base = api_base;
            }
            if let Some(api_key) = llm.api_key {
                config.llm.api_key = api_key;
            }
            if let Some(model) = llm.model {
                config.llm.model = model;
            }
            if let Some(max_tokens) = llm.max_tokens {
                config.llm.max_tokens = max_tokens;
            }
            if let Some(temperature) = llm.temperature {
                config.llm.temperature = temperature;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                config.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(retry) = file_config.retry {
            if let Some(max_retries) = retry.max_retries {
                config.retry.max_retries = max_retries;
            }
            if let Some(base) = retry.base_delay_ms {
                config.retry.base_delay_ms = base;
            }
            if let Some(max) = retry.max_delay_ms {
                config.retry.max_delay_ms = max;
            }
        }

        if let Some(store) = file_config.store {
            if let Some(dir) = store.snapshot_dir {
                config.store.snapshot_dir = dir;
            }
            if let Some(keep) = store.keep {
                config.store.keep = keep;
            }
        }

        Ok(config)
    }

    /// Get the default config file path.
    pub fn config_file_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "qa-sweep")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Validate that required configuration is present.
    pub fn validate(&self) -> Result<()> {
        self.llm.validate()?;

        if self.store.keep == 0 {
            return Err(SweepError::Config(
                "store.keep must retain at least one snapshot".to_string(),
            ));
        }

        Ok(())
    }

    /// Create a config from explicit values (useful for testing).
    pub fn with_llm(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            llm: LlmConfig {
                api_base: api_base.into(),
                api_key: api_key.into(),
                model: model.into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|value| value.parse().ok())
}
