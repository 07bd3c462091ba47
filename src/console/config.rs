use std::time::Duration;

use crate::shared::config::{AppConfig, AppConfigBuilder, ConfigError, RequestTimeouts};
use crate::shared::models::ConnectivityMode;

/// Environment variable naming an optional TOML config file
pub const CONFIG_PATH_ENV: &str = "LPF_CONFIG";

/// Runtime configuration wrapper.
///
/// Seeds the initial application state and the sync client's deadlines.
/// Values live in the store once it exists; this only supplies defaults.
#[derive(Debug, Clone, Default)]
pub struct Config {
    app: AppConfig,
}

impl Config {
    /// Create a configuration with hard-coded defaults only
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults, then the `LPF_CONFIG` file if set, then `ENGINE_*` variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut builder = AppConfig::builder();
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            if !path.trim().is_empty() {
                builder = builder.from_toml_file(path)?;
            }
        }
        Self::with_builder(builder.from_env()?)
    }

    pub fn with_builder(builder: AppConfigBuilder) -> Result<Self, ConfigError> {
        let app = builder.build()?;
        Ok(Self { app })
    }

    pub fn app(&self) -> &AppConfig {
        &self.app
    }

    pub fn engine_url(&self) -> &str {
        &self.app.engine_url
    }

    pub fn api_key(&self) -> &str {
        &self.app.api_key
    }

    pub fn default_mode(&self) -> ConnectivityMode {
        self.app.default_mode
    }

    pub fn mock_latency(&self) -> Duration {
        self.app.mock_latency
    }

    pub fn timeouts(&self) -> RequestTimeouts {
        self.app.timeouts
    }
}
