//! Configuration System
//!
//! Handles loading node configuration from files and environment variables.
//! Supports TOML config files and `CHRONICLE_*` environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub coordinator: CoordinatorConfig,

    #[serde(default)]
    pub memdb: MemDbConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Job coordination configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CoordinatorConfig {
    /// Indicator of this node, prefix of its task IDs
    #[serde(default = "default_node_id")]
    pub node_id: String,

    /// Cancel already dispatched sub-tasks when a later dispatch fails
    #[serde(default = "default_rollback")]
    pub rollback_on_dispatch_failure: bool,

    /// Capacity of the per-job result channel
    #[serde(default = "default_result_channel_capacity")]
    pub result_channel_capacity: usize,
}

fn default_node_id() -> String {
    "broker-1".to_string()
}

fn default_rollback() -> bool {
    true
}

fn default_result_channel_capacity() -> usize {
    16
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            rollback_on_dispatch_failure: default_rollback(),
            result_channel_capacity: default_result_channel_capacity(),
        }
    }
}

/// In-memory write buffer configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MemDbConfig {
    /// Slot duration (ms)
    #[serde(default = "default_interval")]
    pub interval_ms: i64,

    /// Length of one family window (ms)
    #[serde(default = "default_family_duration")]
    pub family_duration_ms: i64,
}

fn default_interval() -> i64 {
    10_000 // 10 seconds
}

fn default_family_duration() -> i64 {
    3_600_000 // 1 hour
}

impl Default for MemDbConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval(),
            family_duration_ms: default_family_duration(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("chronicle").join("cluster.toml")),
            Some(PathBuf::from("/etc/chronicle/cluster.toml")),
            Some(PathBuf::from("./cluster.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                match Self::load_with_env(path) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply overrides from a variable lookup
    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        // Coordinator overrides
        if let Some(node_id) = var("CHRONICLE_NODE_ID") {
            self.coordinator.node_id = node_id;
        }
        if let Some(rollback) = var("CHRONICLE_ROLLBACK_ON_DISPATCH_FAILURE") {
            if let Ok(b) = rollback.parse() {
                self.coordinator.rollback_on_dispatch_failure = b;
            }
        }
        if let Some(capacity) = var("CHRONICLE_RESULT_CHANNEL_CAPACITY") {
            if let Ok(c) = capacity.parse() {
                self.coordinator.result_channel_capacity = c;
            }
        }

        // MemDB overrides
        if let Some(interval) = var("CHRONICLE_MEMDB_INTERVAL_MS") {
            if let Ok(i) = interval.parse() {
                self.memdb.interval_ms = i;
            }
        }
        if let Some(duration) = var("CHRONICLE_MEMDB_FAMILY_DURATION_MS") {
            if let Ok(d) = duration.parse() {
                self.memdb.family_duration_ms = d;
            }
        }

        // Logging overrides
        if let Some(level) = var("CHRONICLE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("CHRONICLE_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Chronicle Cluster Node Configuration
#
# Environment variables override these settings:
# - CHRONICLE_NODE_ID
# - CHRONICLE_ROLLBACK_ON_DISPATCH_FAILURE
# - CHRONICLE_RESULT_CHANNEL_CAPACITY
# - CHRONICLE_MEMDB_INTERVAL_MS
# - CHRONICLE_MEMDB_FAMILY_DURATION_MS
# - CHRONICLE_LOG_LEVEL
# - CHRONICLE_LOG_FORMAT

[coordinator]
# Indicator of this node, prefix of its task IDs
node_id = "broker-1"

# Cancel already dispatched sub-tasks when a later dispatch fails
rollback_on_dispatch_failure = true

# Capacity of the per-job result channel
result_channel_capacity = 16

[memdb]
# Slot duration (ms)
interval_ms = 10000

# Length of one family window (ms)
family_duration_ms = 3600000

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_default_config_parses() {
        let config: Config = toml::from_str(&generate_default_config()).unwrap();
        assert_eq!(config.coordinator.node_id, "broker-1");
        assert!(config.coordinator.rollback_on_dispatch_failure);
        assert_eq!(config.memdb.interval_ms, 10_000);
        assert_eq!(config.memdb.family_duration_ms, 3_600_000);
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[coordinator]\nnode_id = \"broker-7\"\n\n[memdb]\ninterval_ms = 1000").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.coordinator.node_id, "broker-7");
        assert_eq!(config.coordinator.result_channel_capacity, 16);
        assert_eq!(config.memdb.interval_ms, 1000);
        assert_eq!(config.memdb.family_duration_ms, 3_600_000);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        assert!(matches!(Config::load(&missing), Err(ConfigError::Io { .. })));

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "[coordinator\nnode_id = 1").unwrap();
        assert!(matches!(Config::load(&bad), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("CHRONICLE_NODE_ID", "broker-9"),
            ("CHRONICLE_ROLLBACK_ON_DISPATCH_FAILURE", "false"),
            ("CHRONICLE_MEMDB_INTERVAL_MS", "not-a-number"),
            ("CHRONICLE_LOG_FORMAT", "json"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.coordinator.node_id, "broker-9");
        assert!(!config.coordinator.rollback_on_dispatch_failure);
        assert_eq!(config.memdb.interval_ms, 10_000);
        assert_eq!(config.logging.format, "json");
    }
}
