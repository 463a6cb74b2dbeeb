//! Runtime configuration for the server and the client.
//!
//! The server reads an optional TOML file; command-line flags take
//! precedence over it.

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::server::pool::MAX_WORKERS;
use crate::server::HandlerConfig;

/// Seconds a connection may stay idle between commands.
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub bind: IpAddr,
    pub port: u16,
    pub workers: usize,
    pub idle_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 0,
            workers: 1,
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
        }
    }
}

impl ServerConfig {
    /// Load from a TOML file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// `~/.config/ackget/server.toml` (platform equivalent), if it exists.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("ackget").join("server.toml"))
            .filter(|path| path.is_file())
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 || self.workers > MAX_WORKERS {
            return Err(Error::Config(format!(
                "worker count must be between 1 and {} (got {})",
                MAX_WORKERS, self.workers
            )));
        }
        if self.idle_timeout_secs == 0 {
            return Err(Error::Config("idle timeout must be positive".into()));
        }
        Ok(())
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn handler(&self) -> HandlerConfig {
        HandlerConfig {
            idle_timeout: self.idle_timeout(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub host: String,
    /// Numeric port. Service names are rejected when connecting.
    pub service: String,
    /// Where received files are written.
    pub download_dir: PathBuf,
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            service: service.into(),
            download_dir: PathBuf::from("."),
        }
    }

    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = dir.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.idle_timeout(), Duration::from_secs(60));
        assert!(config.bind.is_unspecified());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_partial() {
        let config = ServerConfig::from_toml("workers = 4\nidle_timeout_secs = 5\n").unwrap();
        assert_eq!(config.workers, 4);
        assert_eq!(config.idle_timeout(), Duration::from_secs(5));
        assert_eq!(config.port, 0);
    }

    #[test]
    fn test_from_toml_rejects_unknown_keys() {
        let err = ServerConfig::from_toml("threads = 4\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_worker_bounds() {
        let mut config = ServerConfig::default();
        config.workers = 0;
        assert!(config.validate().is_err());
        config.workers = MAX_WORKERS;
        assert!(config.validate().is_ok());
        config.workers = MAX_WORKERS + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("server.toml");
        std::fs::write(&path, "bind = \"127.0.0.1\"\nport = 7070\n").unwrap();

        let config = ServerConfig::load(&path).unwrap();
        assert_eq!(config.bind, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(config.port, 7070);

        assert!(ServerConfig::load(&tmp.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_client_config() {
        let config = ClientConfig::new("localhost", "7070").with_download_dir("/tmp");
        assert_eq!(config.download_dir, PathBuf::from("/tmp"));
        assert_eq!(config.service, "7070");
    }
}
