//! Configuration System
//!
//! Loads configuration from a TOML file with environment variable
//! overrides:
//!
//! - `STREAKBOOK_DATA_DIR`
//! - `STREAKBOOK_DURABLE`
//! - `STREAKBOOK_LOG_LEVEL`
//! - `STREAKBOOK_LOG_FORMAT`

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageSection,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where and how streak data is stored
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSection {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    #[serde(default = "default_database_file")]
    pub database_file: String,

    #[serde(default = "default_legacy_file")]
    pub legacy_file: String,

    /// Ask SQLite for full fsync on every commit
    #[serde(default)]
    pub durable: bool,
}

fn default_data_dir() -> String {
    dirs::data_local_dir()
        .map(|p| p.join("streakbook").to_string_lossy().to_string())
        .unwrap_or_else(|| "./streakbook_data".to_string())
}

fn default_database_file() -> String {
    "streakbook.db".to_string()
}

fn default_legacy_file() -> String {
    "legacy.json".to_string()
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            database_file: default_database_file(),
            legacy_file: default_legacy_file(),
            durable: false,
        }
    }
}

impl StorageSection {
    /// Data directory with a leading `~/` expanded
    pub fn data_dir(&self) -> PathBuf {
        match (self.data_dir.strip_prefix("~/"), dirs::home_dir()) {
            (Some(rest), Some(home)) => home.join(rest),
            _ => PathBuf::from(&self.data_dir),
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir().join(&self.database_file)
    }

    pub fn legacy_path(&self) -> PathBuf {
        self.data_dir().join(&self.legacy_file)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,

    pub file: Option<String>,
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
        }
    }
}

impl LoggingConfig {
    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content).map_err(|e| match e {
            ConfigError::Parse { error, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                error,
            },
            other => other,
        })
    }

    /// Parse configuration text
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: PathBuf::new(),
            error: e.to_string(),
        })
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file locations, in search order
    pub fn search_paths() -> Vec<PathBuf> {
        [
            dirs::config_dir().map(|p| p.join("streakbook").join("config.toml")),
            Some(PathBuf::from("./streakbook.toml")),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        for path in Self::search_paths() {
            if path.exists() {
                match Self::load_with_env(&path) {
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

        tracing::debug!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any variable source
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(data_dir) = lookup("STREAKBOOK_DATA_DIR") {
            self.storage.data_dir = data_dir;
        }
        if let Some(durable) = lookup("STREAKBOOK_DURABLE") {
            match durable.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.storage.durable = true,
                "0" | "false" | "no" | "off" => self.storage.durable = false,
                other => tracing::warn!(value = %other, "Ignoring invalid STREAKBOOK_DURABLE"),
            }
        }

        if let Some(level) = lookup("STREAKBOOK_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("STREAKBOOK_LOG_FORMAT") {
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
    r#"# Streakbook Configuration
#
# Environment variables override these settings:
# - STREAKBOOK_DATA_DIR
# - STREAKBOOK_DURABLE
# - STREAKBOOK_LOG_LEVEL
# - STREAKBOOK_LOG_FORMAT

[storage]
# Directory holding the database and the legacy file
data_dir = "~/.local/share/streakbook"

# SQLite database file name (inside data_dir)
database_file = "streakbook.db"

# Legacy flat store migrated on every start (inside data_dir)
legacy_file = "legacy.json"

# Full fsync on every commit
durable = false

[logging]
# Log level: trace, debug, info, warn, error
level = "warn"

# Log format: pretty (for terminals) or json (for log collectors)
format = "pretty"

# Optional log file path
# file = "/var/log/streakbook/streakbook.log"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.storage.database_file, "streakbook.db");
        assert_eq!(config.storage.legacy_file, "legacy.json");
        assert!(!config.storage.durable);
        assert_eq!(config.logging.level, "warn");
        assert!(!config.logging.is_json());
    }

    #[test]
    fn test_generated_config_parses() {
        let config = Config::parse(&generate_default_config()).unwrap();
        assert_eq!(config.storage.data_dir, "~/.local/share/streakbook");
        assert_eq!(config.logging.format, "pretty");
        assert!(config.logging.file.is_none());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("streakbook.toml");
        std::fs::write(&path, "[storage]\ndata_dir = \"/tmp/sb\"\ndurable = true\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.storage.database_path(), PathBuf::from("/tmp/sb/streakbook.db"));
        assert_eq!(config.storage.legacy_path(), PathBuf::from("/tmp/sb/legacy.json"));
        assert!(config.storage.durable);
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_load_errors_name_the_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[storage\n").unwrap();

        match Config::load(&path) {
            Err(ConfigError::Parse { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected parse error, got {:?}", other),
        }
        assert!(matches!(
            Config::load(&dir.path().join("missing.toml")),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("STREAKBOOK_DATA_DIR", "/data"),
            ("STREAKBOOK_DURABLE", "yes"),
            ("STREAKBOOK_LOG_FORMAT", "JSON"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.storage.data_dir, "/data");
        assert!(config.storage.durable);
        assert!(config.logging.is_json());
        assert_eq!(config.logging.level, "warn");

        config.apply_overrides(|k| (k == "STREAKBOOK_DURABLE").then(|| "maybe".to_string()));
        assert!(config.storage.durable);
    }
}
