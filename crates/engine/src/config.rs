//! Kernel configuration via `folio.toml`
//!
//! One file configures id allocation, update dispatch and resolver URIs.
//! Every section and key is optional; missing values take the defaults
//! written by [`FolioConfig::default_toml`].

use folio_core::{FolioError, FolioResult};
use folio_ids::AllocatorConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Config file name
pub const CONFIG_FILE_NAME: &str = "folio.toml";

/// Update dispatch settings, `[notifier]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// Dispatch worker threads
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Pending dispatches before `after()` reports back-pressure
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Grace period for pending dispatches at shutdown, in milliseconds
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

fn default_workers() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    4096
}

fn default_shutdown_grace_ms() -> u64 {
    5000
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

impl NotifierConfig {
    /// Shutdown grace period
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// Resolver settings, `[resolver]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Prefix of canonical entry URIs
    #[serde(default = "default_base_uri")]
    pub base_uri: String,
}

fn default_base_uri() -> String {
    "https://archive.example.org/entries".to_string()
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            base_uri: default_base_uri(),
        }
    }
}

/// Kernel configuration loaded from `folio.toml`
///
/// # Example
///
/// ```toml
/// [ids]
/// grant_size = 50
///
/// [notifier]
/// workers = 8
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolioConfig {
    /// Id allocation
    #[serde(default)]
    pub ids: AllocatorConfig,
    /// Update dispatch
    #[serde(default)]
    pub notifier: NotifierConfig,
    /// Entry resolution
    #[serde(default)]
    pub resolver: ResolverConfig,
}

impl FolioConfig {
    /// Reject values the kernel cannot run with
    pub fn validate(&self) -> FolioResult<()> {
        self.ids.validate()?;
        if self.notifier.workers == 0 {
            return Err(FolioError::configuration("notifier.workers must be at least 1"));
        }
        if self.notifier.queue_capacity == 0 {
            return Err(FolioError::configuration(
                "notifier.queue_capacity must be at least 1",
            ));
        }
        if self.resolver.base_uri.trim().is_empty() {
            return Err(FolioError::configuration("resolver.base_uri must not be empty"));
        }
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Folio kernel configuration

[ids]
# Ids reserved from the counter store per round trip
grant_size = 20
# Compare-and-set attempts before an allocation fails
max_attempts = 8
# Uncomment to hand out obfuscated ids instead of plain integers.
# Changing the key changes every rendered id.
# obfuscation_key = 1234567

[notifier]
# Threads running update listeners
workers = 4
# Pending listener calls before publishing reports back-pressure
queue_capacity = 4096
# How long shutdown waits for pending listener calls
shutdown_grace_ms = 5000

[resolver]
# Prefix of canonical entry URIs: <base_uri>/<type>/<id>
base_uri = "https://archive.example.org/entries"
"#
    }

    /// Read, parse and validate config from a file path.
    pub fn from_file(path: &Path) -> FolioResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            FolioError::configuration(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: FolioConfig = toml::from_str(&content).map_err(|e| {
            FolioError::configuration(format!(
                "failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> FolioResult<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                FolioError::configuration(format!(
                    "failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> FolioResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| FolioError::configuration(format!("failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            FolioError::configuration(format!(
                "failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_toml_matches_default() {
        let config: FolioConfig = toml::from_str(FolioConfig::default_toml()).unwrap();
        assert_eq!(config, FolioConfig::default());
        config.validate().unwrap();
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config: FolioConfig = toml::from_str("").unwrap();
        assert_eq!(config.ids.grant_size, 20);
        assert_eq!(config.notifier.workers, 4);
        assert_eq!(config.notifier.shutdown_grace(), Duration::from_secs(5));
    }

    #[test]
    fn partial_sections() {
        let config: FolioConfig =
            toml::from_str("[ids]\ngrant_size = 50\nobfuscation_key = 99\n").unwrap();
        assert_eq!(config.ids.grant_size, 50);
        assert_eq!(config.ids.max_attempts, 8);
        assert_eq!(config.ids.obfuscation_key, Some(99));
        assert_eq!(config.resolver, ResolverConfig::default());
    }

    #[test]
    fn invalid_values_rejected() {
        let mut config = FolioConfig::default();
        config.notifier.workers = 0;
        assert!(matches!(config.validate(), Err(FolioError::Configuration(_))));

        let mut config = FolioConfig::default();
        config.ids.grant_size = 0;
        assert!(config.validate().is_err());

        let mut config = FolioConfig::default();
        config.resolver.base_uri = "  ".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn write_default_creates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        assert!(!path.exists());

        FolioConfig::write_default_if_missing(&path).unwrap();
        assert!(path.exists());
        assert_eq!(FolioConfig::from_file(&path).unwrap(), FolioConfig::default());
    }

    #[test]
    fn write_default_does_not_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[ids]\ngrant_size = 3\n").unwrap();

        FolioConfig::write_default_if_missing(&path).unwrap();
        assert_eq!(FolioConfig::from_file(&path).unwrap().ids.grant_size, 3);
    }

    #[test]
    fn write_to_file_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let mut config = FolioConfig::default();
        config.ids = config.ids.with_grant_size(7).with_obfuscation_key(11);
        config.notifier.workers = 2;

        config.write_to_file(&path).unwrap();
        assert_eq!(FolioConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn invalid_file_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[notifier]\nworkers = 0\n").unwrap();
        assert!(FolioConfig::from_file(&path).is_err());

        std::fs::write(&path, "not = [valid").unwrap();
        assert!(matches!(
            FolioConfig::from_file(&path),
            Err(FolioError::Configuration(_))
        ));

        assert!(FolioConfig::from_file(&dir.path().join("missing.toml")).is_err());
    }
}
