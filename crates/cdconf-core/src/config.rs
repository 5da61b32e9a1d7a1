//! Engine configuration
//!
//! Read from TOML; every key is optional.
//!
//! ```toml
//! config_file = "cruise-config.yaml"
//! history_dir = "config.history"
//! server_version = "24.1.0"
//! max_config_bytes = 10485760
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use cdconf_artifact::DEFAULT_MAX_CONFIG_BYTES;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Live configuration file
    pub config_file: PathBuf,
    /// Directory holding the revision history
    pub history_dir: PathBuf,
    /// Recorded on every revision
    pub server_version: String,
    /// Texts larger than this are rejected by the parser
    pub max_config_bytes: usize,
}

impl EngineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With live file path
    #[inline]
    #[must_use]
    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = path.into();
        self
    }

    /// With history directory
    #[inline]
    #[must_use]
    pub fn with_history_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.history_dir = path.into();
        self
    }

    /// With server version
    #[inline]
    #[must_use]
    pub fn with_server_version(mut self, version: impl Into<String>) -> Self {
        self.server_version = version.into();
        self
    }

    /// With parser size limit
    #[inline]
    #[must_use]
    pub fn with_max_config_bytes(mut self, max: usize) -> Self {
        self.max_config_bytes = max;
        self
    }

    /// Parse TOML; missing keys keep their defaults
    ///
    /// # Errors
    /// Returns error on malformed TOML or mistyped keys
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load a TOML file
    ///
    /// Relative paths inside the file are resolved against the file's
    /// directory.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        Ok(match path.parent() {
            Some(dir) => config.relative_to(dir),
            None => config,
        })
    }

    /// Resolve relative paths against `dir`
    #[must_use]
    pub fn relative_to(mut self, dir: &Path) -> Self {
        if self.config_file.is_relative() {
            self.config_file = dir.join(&self.config_file);
        }
        if self.history_dir.is_relative() {
            self.history_dir = dir.join(&self.history_dir);
        }
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            config_file: PathBuf::from("cruise-config.yaml"),
            history_dir: PathBuf::from("config.history"),
            server_version: crate::VERSION.to_owned(),
            max_config_bytes: DEFAULT_MAX_CONFIG_BYTES,
        }
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// IO error reading the file
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed TOML
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.config_file, PathBuf::from("cruise-config.yaml"));
        assert_eq!(config.history_dir, PathBuf::from("config.history"));
        assert_eq!(config.server_version, crate::VERSION);
        assert_eq!(config.max_config_bytes, DEFAULT_MAX_CONFIG_BYTES);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str("server_version = \"24.1.0\"\n").unwrap();
        assert_eq!(config.server_version, "24.1.0");
        assert_eq!(config.history_dir, PathBuf::from("config.history"));
    }

    #[test]
    fn mistyped_key_is_error() {
        assert!(matches!(
            EngineConfig::from_toml_str("max_config_bytes = \"lots\"\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn load_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cdconf.toml");
        std::fs::write(&path, "config_file = \"live.yaml\"\nhistory_dir = \"/var/lib/history\"\n").unwrap();
        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.config_file, dir.path().join("live.yaml"));
        assert_eq!(config.history_dir, PathBuf::from("/var/lib/history"));
    }

    #[test]
    fn builders_chain() {
        let config = EngineConfig::new().with_config_file("a.yaml").with_max_config_bytes(10);
        assert_eq!(config.config_file, PathBuf::from("a.yaml"));
        assert_eq!(config.max_config_bytes, 10);
    }
}
