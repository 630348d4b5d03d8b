//! TOML-based configuration for the server.
//!
//! Example `wirenet-server.toml`:
//!
//! ```toml
//! bind_address = "0.0.0.0"
//! port = 5050
//! reactor_threads = 4
//! first_connection_id = 10
//! ```
//!
//! Every field is optional; missing fields take the defaults below, so an
//! empty file (or no file at all) is a valid configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use wirenet_core::runtime::default_pool_size;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Listener and threading settings for a server instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    /// IP address to bind the listener to. `0.0.0.0` binds all interfaces.
    pub bind_address: IpAddr,
    /// TCP port to listen on. `0` asks the OS for a free port.
    pub port: u16,
    /// Number of pool reactors; `None` sizes the pool from the CPU count.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reactor_threads: Option<usize>,
    /// ID given to the first accepted connection; later ones count up.
    pub first_connection_id: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 5050,
            reactor_threads: None,
            first_connection_id: 10,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    /// Effective pool size, at least one.
    pub fn pool_size(&self) -> usize {
        self.reactor_threads.unwrap_or_else(default_pool_size).max(1)
    }

    /// Loads a config from `path`, returning the defaults if the file does
    /// not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] for file-system errors other than "not
    /// found", and [`ConfigError::Parse`] if the TOML is malformed.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(toml::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Writes the config to `path`, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] for file-system failures or
    /// [`ConfigError::Serialize`] if serialization fails.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_default_values() {
        // Arrange / Act
        let cfg = ServerConfig::default();

        // Assert
        assert_eq!(cfg.port, 5050);
        assert_eq!(cfg.first_connection_id, 10);
        assert_eq!(cfg.bind_address, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        assert!(cfg.reactor_threads.is_none());
    }

    #[test]
    fn test_pool_size_is_never_zero() {
        let cfg = ServerConfig {
            reactor_threads: Some(0),
            ..Default::default()
        };
        assert_eq!(cfg.pool_size(), 1);
        assert!(ServerConfig::default().pool_size() >= 1);
    }

    #[test]
    fn test_deserialize_empty_toml_uses_defaults() {
        let cfg: ServerConfig = toml::from_str("").expect("deserialize empty");
        assert_eq!(cfg, ServerConfig::default());
    }

    #[test]
    fn test_deserialize_partial_toml_overrides_only_given_fields() {
        let cfg: ServerConfig = toml::from_str("port = 6000\nreactor_threads = 2\n").unwrap();

        assert_eq!(cfg.port, 6000);
        assert_eq!(cfg.reactor_threads, Some(2));
        assert_eq!(cfg.first_connection_id, 10);
    }

    #[test]
    fn test_deserialize_invalid_toml_returns_parse_error() {
        let result: Result<ServerConfig, toml::de::Error> = toml::from_str("[[[ not valid toml");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_missing_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();

        let cfg = ServerConfig::load_from(&dir.path().join("absent.toml")).unwrap();

        assert_eq!(cfg, ServerConfig::default());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("server.toml");
        let cfg = ServerConfig {
            bind_address: "127.0.0.1".parse().unwrap(),
            port: 12345,
            reactor_threads: Some(3),
            first_connection_id: 100,
        };

        // Act
        cfg.save_to(&path).unwrap();
        let loaded = ServerConfig::load_from(&path).unwrap();

        // Assert
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn test_load_from_malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "port = \"not a number\"").unwrap();

        let result = ServerConfig::load_from(&path);

        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
