//! TOML configuration.
//!
//! API keys are not stored in the file by default; providers name an
//! environment variable (or rely on the `<TYPE>_API_KEY` convention) and
//! the key is resolved at startup.

use crate::retry::RetryConfig;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_HEADER: &str = "# tandem configuration\n\
# NOTE: API keys are NOT stored here.\n\
# Set them via environment variables (e.g. OPENAI_API_KEY)\n\n";

/// Top-level configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub version: String,
    pub default_provider: String,
    pub default_model: String,
    pub default_yolo: bool,
    pub providers: HashMap<String, ProviderConfig>,
    pub models: HashMap<String, ModelConfig>,
    pub loop_control: LoopControl,
}

impl Default for Config {
    fn default() -> Self {
        let mut providers = HashMap::new();
        providers.insert(
            "openai".to_string(),
            ProviderConfig {
                kind: "openai".to_string(),
                base_url: "https://api.openai.com/v1".to_string(),
                api_key: String::new(),
                env_key: "OPENAI_API_KEY".to_string(),
                timeout: 60,
                retry: None,
            },
        );
        providers.insert(
            "custom".to_string(),
            ProviderConfig {
                kind: "openai".to_string(),
                base_url: "https://your-api-endpoint.com/v1".to_string(),
                api_key: String::new(),
                env_key: "CUSTOM_API_KEY".to_string(),
                timeout: 60,
                retry: None,
            },
        );

        Self {
            version: "1.0".to_string(),
            default_provider: "openai".to_string(),
            default_model: "gpt-4o".to_string(),
            default_yolo: false,
            providers,
            models: HashMap::new(),
            loop_control: LoopControl::default(),
        }
    }
}

/// An API provider entry.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Provider type, e.g. "openai".
    #[serde(rename = "type")]
    pub kind: String,
    pub base_url: String,
    /// Inline key; prefer `env_key`.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub api_key: String,
    /// Environment variable holding the key. Empty means
    /// `<TYPE>_API_KEY`.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub env_key: String,
    /// Request timeout in seconds.
    pub timeout: u64,
    pub retry: Option<RetrySettings>,
}

impl ProviderConfig {
    /// Resolve the API key: the inline value first, then the environment.
    ///
    /// # Errors
    /// Fails when neither source yields a key.
    pub fn api_key(&self) -> Result<String> {
        if !self.api_key.is_empty() {
            return Ok(self.api_key.clone());
        }

        let env_key = if self.env_key.is_empty() {
            format!("{}_API_KEY", self.kind.to_uppercase())
        } else {
            self.env_key.clone()
        };

        match std::env::var(&env_key) {
            Ok(key) if !key.is_empty() => Ok(key),
            _ => bail!("API key not found in environment variable: {env_key}"),
        }
    }

    #[must_use]
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

/// A named model entry.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub provider: String,
    pub model: String,
    pub max_context_size: u64,
}

/// Loop execution parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopControl {
    pub max_steps_per_turn: usize,
    pub max_retries_per_step: u32,
    pub reserved_context_size: u64,
}

impl Default for LoopControl {
    fn default() -> Self {
        Self {
            max_steps_per_turn: 100,
            max_retries_per_step: 3,
            reserved_context_size: 0,
        }
    }
}

/// Retry strategy settings as written in the config file.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: i64,
    pub initial_wait_ms: i64,
    pub max_wait_ms: i64,
    pub exponential_base: f64,
    pub jitter_ms: i64,
}

impl RetrySettings {
    /// Convert to a [`RetryConfig`], substituting defaults for missing or
    /// out-of-range values.
    #[must_use]
    pub fn to_retry_config(&self) -> RetryConfig {
        let defaults = RetryConfig::default();
        RetryConfig {
            max_retries: u32::try_from(self.max_retries).unwrap_or(defaults.max_retries),
            initial_wait: positive_millis(self.initial_wait_ms)
                .unwrap_or(defaults.initial_wait),
            max_wait: positive_millis(self.max_wait_ms).unwrap_or(defaults.max_wait),
            exponential_base: if self.exponential_base > 1.0 {
                self.exponential_base
            } else {
                defaults.exponential_base
            },
            jitter: if self.jitter_ms >= 0 {
                Duration::from_millis(self.jitter_ms as u64)
            } else {
                defaults.jitter
            },
        }
    }
}

fn positive_millis(ms: i64) -> Option<Duration> {
    if ms > 0 {
        Some(Duration::from_millis(ms as u64))
    } else {
        None
    }
}

impl Config {
    /// Load from `path`, or the default location when `None`. A missing
    /// file yields the defaults.
    ///
    /// # Errors
    /// Fails on unreadable files or invalid TOML.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map_or_else(default_config_path, Path::to_path_buf);
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: Self = toml::from_str(&raw)
            .with_context(|| format!("failed to decode config {}", path.display()))?;
        Ok(config)
    }

    /// Save to `path`, or the default location when `None`.
    ///
    /// # Errors
    /// Fails when the directory cannot be created or the file written.
    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let path = path.map_or_else(default_config_path, Path::to_path_buf);
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create config directory {}", dir.display()))?;
        }

        let body = toml::to_string_pretty(self).context("failed to encode config")?;
        std::fs::write(&path, format!("{CONFIG_HEADER}{body}"))
            .with_context(|| format!("failed to write config {}", path.display()))?;
        Ok(())
    }

    #[must_use]
    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.get(name)
    }

    #[must_use]
    pub fn default_provider(&self) -> Option<&ProviderConfig> {
        self.provider(&self.default_provider)
    }

    /// The retry config of the given provider, or the defaults.
    #[must_use]
    pub fn retry_config(&self, provider: &str) -> RetryConfig {
        self.provider(provider)
            .and_then(|p| p.retry.as_ref())
            .map_or_else(RetryConfig::default, RetrySettings::to_retry_config)
    }
}

/// `~/.tandem/config.toml`, falling back to a relative path without a home
/// directory.
#[must_use]
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .map_or_else(|| PathBuf::from(".tandem"), |home| home.join(".tandem"))
        .join("config.toml")
}
