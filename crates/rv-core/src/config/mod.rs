//! Configuration management for revsocks

mod server;
pub mod serde_utils;

pub use server::{ConfigFile, ServerConfig, Transport};

use crate::error::ConfigError;
use std::path::{Path, PathBuf};

/// Get the default configuration directory
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("revsocks")
}

/// Get the default configuration file path
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.toml")
}

/// Load configuration from a file
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read config: {}", e)))?;

    let config: T = toml::from_str(&content)?;
    Ok(config)
}

/// Load the server section from `path`, or defaults when the file is absent
pub fn load_server_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    match load_config::<ConfigFile>(path) {
        Ok(file) => Ok(file.server),
        Err(ConfigError::NotFound(_)) => Ok(ServerConfig::default()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = load_server_config(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.port, 1080);
    }

    #[test]
    fn test_load_partial_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[server]\nport = 2080\ntransport = \"tls\"\nhealth_interval = 2\n",
        )
        .unwrap();

        let config = load_server_config(&path).unwrap();
        assert_eq!(config.port, 2080);
        assert_eq!(config.transport, Transport::Tls);
        assert_eq!(config.health_interval, std::time::Duration::from_secs(2));
        assert_eq!(config.bridge_host, "127.0.0.1");
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server\nport = ").unwrap();
        assert!(matches!(
            load_server_config(&path),
            Err(ConfigError::Parse(_))
        ));
    }
}
