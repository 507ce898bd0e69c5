//! Configuration loader utilities

use crate::{ConfigError, ConfigResult, SiteConfig};
use config::{Environment, File};
use std::path::{Path, PathBuf};

/// Environment variable prefix for overrides, e.g. `REMORA_HOST`
const ENV_PREFIX: &str = "REMORA";

/// Configuration loader with common loading patterns
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from the first default location that exists
    pub fn load_default() -> ConfigResult<SiteConfig> {
        let path = Self::default_config_paths().into_iter().find(|p| p.exists());
        Self::build(path.as_deref())
    }

    /// Load configuration from a specific file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> ConfigResult<SiteConfig> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "Configuration file not found",
                ),
            });
        }

        Self::build(Some(path))
    }

    /// Default configuration file locations, in search order
    pub fn default_config_paths() -> Vec<PathBuf> {
        vec![
            PathBuf::from("remora.toml"),
            PathBuf::from("remora.yaml"),
            PathBuf::from(".remora/config.toml"),
            PathBuf::from(".remora/config.yaml"),
        ]
    }

    /// Layer defaults, an optional file, and environment overrides
    fn build(path: Option<&Path>) -> ConfigResult<SiteConfig> {
        // Defaults go in first so file and environment values override them
        let defaults = serde_yaml::to_value(SiteConfig::default())
            .map_err(|e| ConfigError::other(format!("Failed to serialize defaults: {}", e)))?;
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&defaults)?);

        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

        let site: SiteConfig = builder.build()?.try_deserialize()?;
        site.validate()?;
        Ok(site)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AuthMethod;
    use remora_types::Protocol;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_load_toml_config() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            "remora.toml",
            r#"
name = "staging"
protocol = "sftp"
host = "files.example.com"
username = "deploy"
remote_root = "/srv/www"
local_root = "site"
ignore = [".git", "node_modules"]

[auth]
method = "password"
password = "hunter2"

[timeouts]
connect_secs = 5
operation_secs = 120
"#,
        );

        let site = ConfigLoader::load_from_file(&path).unwrap();
        assert_eq!(site.name.as_deref(), Some("staging"));
        assert_eq!(site.protocol, Protocol::Sftp);
        assert_eq!(site.host, "files.example.com");
        assert_eq!(site.effective_port(), 22);
        assert_eq!(site.remote_root, "/srv/www");
        assert!(matches!(site.auth, AuthMethod::Password { .. }));
        assert_eq!(site.timeouts.connect().as_secs(), 5);
        assert_eq!(site.ignore, vec![".git", "node_modules"]);
    }

    #[test]
    fn test_load_yaml_config() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            "remora.yaml",
            r#"
protocol: ftp
host: ftp.example.com
port: 2121
username: anonymous
remote_root: /pub
auth:
  method: password
  password: guest
"#,
        );

        let site = ConfigLoader::load_from_file(&path).unwrap();
        assert_eq!(site.protocol, Protocol::Ftp);
        assert_eq!(site.effective_port(), 2121);
        assert_eq!(site.username, "anonymous");
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = ConfigLoader::load_from_file("/nonexistent/remora.toml");
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_invalid_config_fails_validation() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            "remora.toml",
            r#"
protocol = "sftp"
host = ""
username = "deploy"

[auth]
method = "agent"
"#,
        );

        assert!(ConfigLoader::load_from_file(&path).is_err());
    }
}
