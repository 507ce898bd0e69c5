//! Configuration management for remora
//!
//! This crate defines the configuration record consumed by the transfer
//! clients and the synchronization engine, plus a loader supporting TOML and
//! YAML files with `REMORA_`-prefixed environment variable overrides.
//!
//! # Examples
//!
//! ```rust,no_run
//! use remora_config::ConfigLoader;
//!
//! let site = ConfigLoader::load_from_file("remora.toml")
//!     .expect("failed to load configuration");
//! println!("Syncing {} against {}", site.local_root.display(), site.host);
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use remora_types::Protocol;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub mod error;
pub mod loader;

pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;

/// Authentication method for the remote server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "kebab-case")]
pub enum AuthMethod {
    /// Password authentication
    Password {
        /// The password
        password: String,
    },
    /// Private key file authentication (SFTP only)
    KeyFile {
        /// Path to the private key file
        path: PathBuf,
        /// Optional key passphrase
        passphrase: Option<String>,
    },
    /// SSH agent authentication (SFTP only)
    Agent,
}

/// Connection and liveness timeouts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds
    pub connect_secs: u64,
    /// Per-operation session timeout in seconds
    pub operation_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 10,
            operation_secs: 60,
        }
    }
}

impl TimeoutConfig {
    /// Connection establishment timeout
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    /// Per-operation session timeout
    pub fn operation(&self) -> Duration {
        Duration::from_secs(self.operation_secs)
    }
}

/// Configuration record for one remote target
///
/// One record maps a local root onto a remote root reachable over one
/// protocol. The metadata store attributes sidecar records to `name`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Profile name, recorded into metadata sidecars
    pub name: Option<String>,
    /// Wire protocol
    pub protocol: Protocol,
    /// Server host name or address
    pub host: String,
    /// Server port, defaulting per protocol when absent
    pub port: Option<u16>,
    /// User name on the server
    pub username: String,
    /// Authentication method
    pub auth: AuthMethod,
    /// Base directory on the remote server
    pub remote_root: String,
    /// Local directory mirroring the remote root
    pub local_root: PathBuf,
    /// Ignore patterns: a path is excluded when a pattern is a substring of
    /// its root-relative form or matches one of its segments exactly
    pub ignore: Vec<String>,
    /// Directory locally pruned files are moved into instead of being removed
    pub backup_dir: Option<PathBuf>,
    /// Connection and operation timeouts
    pub timeouts: TimeoutConfig,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            name: None,
            protocol: Protocol::Sftp,
            host: String::new(),
            port: None,
            username: String::new(),
            auth: AuthMethod::Agent,
            remote_root: "/".to_string(),
            local_root: PathBuf::from("."),
            ignore: vec![
                ".git".to_string(),
                ".remora".to_string(),
                ".DS_Store".to_string(),
            ],
            backup_dir: None,
            timeouts: TimeoutConfig::default(),
        }
    }
}

impl SiteConfig {
    /// Server port, falling back to the protocol default
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.protocol.default_port())
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.host.is_empty() {
            return Err(ConfigError::missing_required("host"));
        }
        if self.username.is_empty() {
            return Err(ConfigError::missing_required("username"));
        }
        if !self.remote_root.starts_with('/') {
            return Err(ConfigError::invalid_value(
                "remote_root",
                "must be an absolute remote path",
            ));
        }
        if self.protocol == Protocol::Ftp
            && !matches!(self.auth, AuthMethod::Password { .. })
        {
            return Err(ConfigError::invalid_value(
                "auth",
                "ftp supports password authentication only",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> SiteConfig {
        SiteConfig {
            host: "example.com".to_string(),
            username: "deploy".to_string(),
            auth: AuthMethod::Password {
                password: "secret".to_string(),
            },
            ..SiteConfig::default()
        }
    }

    #[test]
    fn test_effective_port_defaults_per_protocol() {
        let mut config = valid_config();
        assert_eq!(config.effective_port(), 22);

        config.protocol = Protocol::Ftp;
        assert_eq!(config.effective_port(), 21);

        config.port = Some(2222);
        assert_eq!(config.effective_port(), 2222);
    }

    #[test]
    fn test_validation_requires_host_and_username() {
        let mut config = valid_config();
        config.host = String::new();
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.username = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_requires_absolute_remote_root() {
        let mut config = valid_config();
        config.remote_root = "site/www".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ftp_rejects_key_auth() {
        let mut config = valid_config();
        config.protocol = Protocol::Ftp;
        config.auth = AuthMethod::Agent;
        assert!(config.validate().is_err());

        config.auth = AuthMethod::Password {
            password: "secret".to_string(),
        };
        assert!(config.validate().is_ok());
    }
}
