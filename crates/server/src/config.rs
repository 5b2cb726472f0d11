//! Server configuration
//!
//! Loaded from a TOML file when one is given, otherwise defaults.
//! Every field has a default so a partial file is fine.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

/// Configuration loaded from TOML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Path to the SQLite database; defaults to the platform data dir
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    /// Default log filter, overridden by RUST_LOG
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_port() -> u16 {
    murmur_net::DEFAULT_PORT
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            database_path: None,
            log_filter: default_log_filter(),
        }
    }
}

impl Config {
    /// Parse a config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
        toml::from_str(&raw).map_err(|e| format!("Failed to parse {}: {e}", path.display()))
    }

    /// Resolve the database path, creating the data directory if needed.
    pub fn resolve_database_path(&self) -> Result<PathBuf, String> {
        if let Some(path) = &self.database_path {
            return Ok(path.clone());
        }
        let dirs = ProjectDirs::from("", "", "murmur")
            .ok_or_else(|| "Could not determine data directory".to_string())?;
        let data_dir = dirs.data_dir();
        std::fs::create_dir_all(data_dir)
            .map_err(|e| format!("Failed to create {}: {e}", data_dir.display()))?;
        Ok(data_dir.join("murmur.db"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = Config::load(Path::new("/nonexistent/murmur.toml")).unwrap();
        assert_eq!(config.port, murmur_net::DEFAULT_PORT);
        assert!(config.database_path.is_none());
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("murmur.toml");
        std::fs::write(&path, "port = 9000\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn test_explicit_database_path_wins() {
        let config = Config {
            database_path: Some(PathBuf::from("/tmp/custom.db")),
            ..Config::default()
        };
        assert_eq!(
            config.resolve_database_path().unwrap(),
            PathBuf::from("/tmp/custom.db")
        );
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("murmur.toml");
        std::fs::write(&path, "port = \"not a number\"\n").unwrap();
        assert!(Config::load(&path).is_err());
    }
}
