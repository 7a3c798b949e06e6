//! Model — AgentConfig and related structs.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Root of the per-container backend and metadata caches.
    pub cache_root: PathBuf,
    /// Where container root filesystems are mounted.
    pub container_root: PathBuf,
    /// Mount-helper executable.
    pub mount_helper: String,
    /// Storage backend for containers that do not name their own.
    pub storage_url: String,
    /// Output the mount helper prints once the mount is live.
    pub ready_pattern: String,
    /// Give up on a mount helper that neither becomes ready nor exits.
    pub ready_timeout_secs: Option<u64>,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Levels printed to the console. Empty prints every level.
    pub console_levels: Vec<i32>,
    pub controller: Option<ControllerConfig>,
    pub db: Option<DbConfig>,
}

/// Per-job persistence of process output in a local SQLite file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    pub path: PathBuf,
    pub levels: Vec<i32>,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/lib/nodeagent/logs.db"),
            levels: Vec::new(),
        }
    }
}

/// Batched forwarding of process output to the controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub endpoints: Vec<String>,
    pub bufsize: usize,
    pub flush_interval_ms: u64,
    pub levels: Vec<i32>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            cache_root: PathBuf::from("/tmp"),
            container_root: PathBuf::from("/mnt"),
            mount_helper: "g8ufs".to_string(),
            storage_url: "ardb://localhost:26379".to_string(),
            ready_pattern: "mount starts".to_string(),
            ready_timeout_secs: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            bufsize: 1000,
            flush_interval_ms: 30_000,
            levels: Vec::new(),
        }
    }
}

impl AgentConfig {
    pub fn ready_timeout(&self) -> Option<Duration> {
        self.ready_timeout_secs.map(Duration::from_secs)
    }
}

impl ControllerConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── AgentConfig Defaults ─────────────────────────────────────

    #[test]
    fn test_agent_config_default_paths() {
        let cfg = AgentConfig::default();
        assert_eq!(cfg.cache_root, PathBuf::from("/tmp"));
        assert_eq!(cfg.container_root, PathBuf::from("/mnt"));
    }

    #[test]
    fn test_agent_config_default_helper() {
        let cfg = AgentConfig::default();
        assert_eq!(cfg.mount_helper, "g8ufs");
        assert_eq!(cfg.ready_pattern, "mount starts");
        assert_eq!(cfg.storage_url, "ardb://localhost:26379");
    }

    #[test]
    fn test_agent_config_default_no_timeout() {
        let cfg = AgentConfig::default();
        assert!(cfg.ready_timeout().is_none());
    }

    #[test]
    fn test_agent_config_default_logging() {
        let cfg = AgentConfig::default();
        assert!(cfg.logging.console_levels.is_empty());
        assert!(cfg.logging.controller.is_none());
        assert!(cfg.logging.db.is_none());
    }

    #[test]
    fn test_db_config_section() {
        let cfg: AgentConfig = toml::from_str("[logging.db]\nlevels = [1, 2]\n").expect("Should parse db section");
        let db = cfg.logging.db.expect("db section should exist");
        assert_eq!(db.path, PathBuf::from("/var/lib/nodeagent/logs.db")); // default
        assert_eq!(db.levels, vec![1, 2]);
    }

    // ── ControllerConfig Defaults ────────────────────────────────

    #[test]
    fn test_controller_config_defaults() {
        let cc = ControllerConfig::default();
        assert_eq!(cc.bufsize, 1000);
        assert_eq!(cc.flush_interval(), Duration::from_secs(30));
        assert!(cc.endpoints.is_empty());
    }

    // ── Serialization Round-trip ─────────────────────────────────

    #[test]
    fn test_agent_config_toml_round_trip() {
        let mut cfg = AgentConfig::default();
        cfg.ready_timeout_secs = Some(20);
        let toml_str = toml::to_string(&cfg).expect("Should serialize to TOML");
        let deserialized: AgentConfig = toml::from_str(&toml_str).expect("Should deserialize from TOML");
        assert_eq!(deserialized.cache_root, cfg.cache_root);
        assert_eq!(deserialized.ready_timeout(), Some(Duration::from_secs(20)));
    }

    #[test]
    fn test_agent_config_deserialize_partial_toml() {
        let toml_str = r#"
            mount_helper = "/usr/local/bin/g8ufs"

            [logging.controller]
            endpoints = ["http://controller:8966/logs"]
            levels = [1, 2]
        "#;
        let cfg: AgentConfig = toml::from_str(toml_str).expect("Should accept partial TOML");
        assert_eq!(cfg.mount_helper, "/usr/local/bin/g8ufs");
        assert_eq!(cfg.container_root, PathBuf::from("/mnt")); // default
        let controller = cfg.logging.controller.expect("controller section should exist");
        assert_eq!(controller.endpoints.len(), 1);
        assert_eq!(controller.bufsize, 1000); // default
        assert_eq!(controller.levels, vec![1, 2]);
    }
}
