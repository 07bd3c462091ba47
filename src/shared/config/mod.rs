//! Application configuration module
//!
//! Provides the configuration types for the control core: where the Engine
//! lives, which credential to send, whether to start in mock mode and the
//! request deadlines.
//!
//! Sources, lowest to highest precedence:
//! 1. hard-coded defaults
//! 2. an optional TOML file (`[engine]` table)
//! 3. environment variables (`ENGINE_URL`, `ENGINE_API_KEY`, `ENGINE_MODE`)

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::shared::models::ConnectivityMode;

/// Default Engine URL
pub const DEFAULT_ENGINE_URL: &str = "http://localhost:8000";

pub const DEFAULT_GET_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_POST_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_MOCK_LATENCY: Duration = Duration::from_millis(300);

/// Per-method request deadlines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTimeouts {
    pub get: Duration,
    pub post: Duration,
    /// Short deadline used by the health probe
    pub health: Duration,
}

impl Default for RequestTimeouts {
    fn default() -> Self {
        Self {
            get: DEFAULT_GET_TIMEOUT,
            post: DEFAULT_POST_TIMEOUT,
            health: DEFAULT_HEALTH_TIMEOUT,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Engine base URL
    pub engine_url: String,
    /// Credential sent as `X-API-KEY` (may be empty)
    pub api_key: String,
    /// Connectivity mode used when no persisted state exists
    pub default_mode: ConnectivityMode,
    /// Artificial latency applied to mock responses
    pub mock_latency: Duration,
    pub timeouts: RequestTimeouts,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            engine_url: DEFAULT_ENGINE_URL.to_string(),
            api_key: String::new(),
            default_mode: ConnectivityMode::Mock,
            mock_latency: DEFAULT_MOCK_LATENCY,
            timeouts: RequestTimeouts::default(),
        }
    }
}

impl AppConfig {
    /// Create a new AppConfigBuilder
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_engine_url(&self.engine_url)
    }
}

fn validate_engine_url(raw: &str) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(raw).map_err(|_| ConfigError::InvalidUrl(raw.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        _ => Err(ConfigError::InvalidUrl(raw.to_string())),
    }
}

/// Builder for AppConfig
#[derive(Debug, Default)]
pub struct AppConfigBuilder {
    engine_url: Option<String>,
    api_key: Option<String>,
    default_mode: Option<ConnectivityMode>,
    mock_latency: Option<Duration>,
    timeouts: Option<RequestTimeouts>,
}

impl AppConfigBuilder {
    /// Set the Engine URL
    pub fn engine_url(mut self, url: impl Into<String>) -> Self {
        self.engine_url = Some(url.into());
        self
    }

    /// Set the API key
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn default_mode(mut self, mode: ConnectivityMode) -> Self {
        self.default_mode = Some(mode);
        self
    }

    pub fn mock_latency(mut self, latency: Duration) -> Self {
        self.mock_latency = Some(latency);
        self
    }

    pub fn timeouts(mut self, timeouts: RequestTimeouts) -> Self {
        self.timeouts = Some(timeouts);
        self
    }

    /// Overlay values from a TOML config file.
    pub fn from_toml_file(self, path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::File(format!("{}: {}", path.display(), e)))?;
        self.from_toml_str(&raw)
    }

    /// Overlay values from TOML text.
    pub fn from_toml_str(mut self, raw: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile =
            toml::from_str(raw).map_err(|e| ConfigError::File(e.to_string()))?;
        let Some(engine) = file.engine else {
            return Ok(self);
        };
        if let Some(url) = engine.url {
            self.engine_url = Some(url);
        }
        if let Some(key) = engine.api_key {
            self.api_key = Some(key);
        }
        if let Some(mode) = engine.mode {
            self.default_mode = Some(mode.parse()?);
        }
        if let Some(ms) = engine.mock_latency_ms {
            self.mock_latency = Some(Duration::from_millis(ms));
        }
        let mut timeouts = self.timeouts.unwrap_or_default();
        if let Some(ms) = engine.get_timeout_ms {
            timeouts.get = Duration::from_millis(ms);
        }
        if let Some(ms) = engine.post_timeout_ms {
            timeouts.post = Duration::from_millis(ms);
        }
        if let Some(ms) = engine.health_timeout_ms {
            timeouts.health = Duration::from_millis(ms);
        }
        self.timeouts = Some(timeouts);
        Ok(self)
    }

    /// Overlay `ENGINE_URL`, `ENGINE_API_KEY` and `ENGINE_MODE` when set.
    pub fn from_env(mut self) -> Result<Self, ConfigError> {
        if let Some(url) = non_empty_env("ENGINE_URL") {
            self.engine_url = Some(url);
        }
        if let Ok(key) = std::env::var("ENGINE_API_KEY") {
            self.api_key = Some(key);
        }
        if let Some(mode) = non_empty_env("ENGINE_MODE") {
            self.default_mode = Some(mode.parse()?);
        }
        Ok(self)
    }

    /// Build the configuration
    pub fn build(self) -> Result<AppConfig, ConfigError> {
        let defaults = AppConfig::default();
        let config = AppConfig {
            engine_url: self
                .engine_url
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.engine_url),
            api_key: self.api_key.unwrap_or(defaults.api_key),
            default_mode: self.default_mode.unwrap_or(defaults.default_mode),
            mock_latency: self.mock_latency.unwrap_or(defaults.mock_latency),
            timeouts: self.timeouts.unwrap_or(defaults.timeouts),
        };
        config.validate()?;
        Ok(config)
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    engine: Option<EngineSection>,
}

#[derive(Debug, Deserialize)]
struct EngineSection {
    url: Option<String>,
    api_key: Option<String>,
    mode: Option<String>,
    mock_latency_ms: Option<u64>,
    get_timeout_ms: Option<u64>,
    post_timeout_ms: Option<u64>,
    health_timeout_ms: Option<u64>,
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("invalid connectivity mode: {0} (expected \"mock\" or \"real\")")]
    InvalidMode(String),
    #[error("config file error: {0}")]
    File(String),
}
