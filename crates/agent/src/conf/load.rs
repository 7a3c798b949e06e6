//! Load — config loading from file and environment variables.

use std::path::Path;

use thiserror::Error;
use url::Url;

use super::model::AgentConfig;

pub const DEFAULT_CONFIG_FILE: &str = "/etc/nodeagent/agent.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl AgentConfig {
    /// Load configuration from file or environment variables
    /// Priority: Environment Variables > Config File > Defaults
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = std::env::var("AGENT_CONFIG_FILE")
            .unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());

        let mut config = if Path::new(&config_path).exists() {
            tracing::info!("Loading configuration from: {}", config_path);
            Self::from_file(&config_path)?
        } else {
            tracing::info!("Config file not found at {}, using defaults", config_path);
            Self::default()
        };

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Environment variables override whatever the file said.
    pub fn apply_env(&mut self) {
        if let Ok(root) = std::env::var("AGENT_CACHE_ROOT") {
            self.cache_root = root.into();
        }
        if let Ok(root) = std::env::var("AGENT_CONTAINER_ROOT") {
            self.container_root = root.into();
        }
        if let Ok(helper) = std::env::var("AGENT_MOUNT_HELPER") {
            self.mount_helper = helper;
        }
        if let Ok(url) = std::env::var("AGENT_STORAGE_URL") {
            self.storage_url = url;
        }
        if let Ok(pattern) = std::env::var("AGENT_READY_PATTERN") {
            self.ready_pattern = pattern;
        }
        if let Some(secs) = std::env::var("AGENT_READY_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            self.ready_timeout_secs = Some(secs);
        }
    }

    /// Validate that configuration values are sane
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.cache_root.as_os_str().is_empty() {
            return invalid("cache_root must not be empty");
        }
        if self.container_root.as_os_str().is_empty() {
            return invalid("container_root must not be empty");
        }
        if self.mount_helper.is_empty() {
            return invalid("mount_helper must not be empty");
        }
        if self.ready_pattern.is_empty() {
            return invalid("ready_pattern must not be empty");
        }
        if self.ready_timeout_secs == Some(0) {
            return invalid("ready_timeout_secs must be > 0 when set");
        }

        if let Some(db) = &self.logging.db {
            if db.path.as_os_str().is_empty() {
                return invalid("logging.db.path must not be empty");
            }
        }

        if let Some(controller) = &self.logging.controller {
            if controller.bufsize == 0 {
                return invalid("logging.controller.bufsize must be > 0");
            }
            if controller.flush_interval_ms == 0 {
                return invalid("logging.controller.flush_interval_ms must be > 0");
            }
            for endpoint in &controller.endpoints {
                Url::parse(endpoint).map_err(|e| {
                    ConfigError::Invalid(format!("bad controller endpoint '{}': {}", endpoint, e))
                })?;
            }
        }
        Ok(())
    }
}
