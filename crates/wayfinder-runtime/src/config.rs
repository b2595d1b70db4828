use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing_subscriber::filter::LevelFilter;
use wayfinder_core::{DirectoryAddress, ServiceError};

pub const DEFAULT_PORT: u16 = 8443;
pub const DEFAULT_SUBJECT_NAME: &str = "localhost";

/// Node-wide settings, fixed for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NodeConfig {
    /// Directory holding one subdirectory per service.
    pub services_root: PathBuf,
    pub bind_address: IpAddr,
    /// 0 lets the OS pick.
    pub port: u16,
    /// Default directory, `directory://host[:port]` or `https://host[:port]`.
    pub directory: String,
    /// Common name of the node certificate.
    pub subject_name: String,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub enabled: bool,
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            services_root: PathBuf::from("services"),
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            directory: format!("directory://localhost:{DEFAULT_PORT}"),
            subject_name: DEFAULT_SUBJECT_NAME.to_string(),
            logging: LoggingConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Read a JSON config file. Missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ServiceError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ServiceError::Configuration(format!("cannot read {}: {e}", path.display())))?;
        serde_json::from_str(&raw)
            .map_err(|e| ServiceError::Configuration(format!("invalid config {}: {e}", path.display())))
    }

    pub fn validate(&self) -> Result<(), ServiceError> {
        if !self.services_root.is_dir() {
            return Err(ServiceError::Configuration(format!(
                "services root {} is not a directory",
                self.services_root.display()
            )));
        }
        if self.subject_name.trim().is_empty() {
            return Err(ServiceError::Configuration("subject name must not be empty".to_string()));
        }
        self.directory_address()?;
        self.logging.level_filter()?;
        Ok(())
    }

    pub fn directory_address(&self) -> Result<DirectoryAddress, ServiceError> {
        DirectoryAddress::parse(&self.directory)
    }

    pub fn listen_address(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }
}

impl LoggingConfig {
    pub fn level_filter(&self) -> Result<LevelFilter, ServiceError> {
        if !self.enabled {
            return Ok(LevelFilter::OFF);
        }
        self.level
            .parse()
            .map_err(|_| ServiceError::Configuration(format!("unknown log level '{}'", self.level)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.json");
        std::fs::write(&path, r#"{"port": 9443, "logging": {"level": "debug"}}"#).unwrap();

        let config = NodeConfig::from_file(&path).unwrap();
        assert_eq!(config.port, 9443);
        assert_eq!(config.subject_name, DEFAULT_SUBJECT_NAME);
        assert!(config.logging.enabled);
        assert_eq!(config.logging.level_filter().unwrap(), LevelFilter::DEBUG);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.json");
        std::fs::write(&path, r#"{"prot": 9443}"#).unwrap();
        assert_eq!(NodeConfig::from_file(&path).unwrap_err().code(), "CONFIGURATION_ERROR");
    }

    #[test]
    fn validation() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = NodeConfig {
            services_root: dir.path().to_path_buf(),
            ..NodeConfig::default()
        };
        config.validate().unwrap();
        assert_eq!(config.directory_address().unwrap(), DirectoryAddress::new("localhost", DEFAULT_PORT));

        config.logging.level = "chatty".into();
        assert!(config.validate().is_err());

        config.logging.enabled = false;
        assert_eq!(config.logging.level_filter().unwrap(), LevelFilter::OFF);

        config.services_root = dir.path().join("nope");
        assert!(config.validate().is_err());
    }
}
