use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::db::DATABASE_NAME;

const IN_MEMORY: &str = ":memory:";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// How long SQLite waits on a locked database before failing a write.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Directory for file-based logs when journald is unavailable.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("dmap")
        .join(format!("{DATABASE_NAME}.db"))
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            log_dir: None,
        }
    }
}

impl StoreConfig {
    /// A config whose database lives only as long as the store handle.
    pub fn in_memory() -> Self {
        Self {
            db_path: PathBuf::from(IN_MEMORY),
            ..Self::default()
        }
    }

    pub fn at(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            ..Self::default()
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.db_path.as_os_str() == IN_MEMORY
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Read the config at `path`, writing the defaults there first if the
    /// file does not exist yet.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from(path)
        } else {
            let config = StoreConfig::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: StoreConfig = toml::from_str(&content)
            .with_context(|| format!("Invalid config: {}", path.display()))?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;

        Ok(())
    }

    /// `$XDG_CONFIG_HOME/dmap/store.toml` or the platform equivalent.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("dmap")
            .join("store.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: StoreConfig = toml::from_str(r#"db_path = "/tmp/survey.db""#).unwrap();
        assert_eq!(config.db_path, PathBuf::from("/tmp/survey.db"));
        assert_eq!(config.busy_timeout_ms, 5000);
        assert_eq!(config.log_dir, None);
    }

    #[test]
    fn test_save_and_load_from() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf").join("store.toml");

        let mut config = StoreConfig::at(dir.path().join("survey.db"));
        config.busy_timeout_ms = 250;
        config.save_to(&path).unwrap();

        let loaded = StoreConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.busy_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_load_or_create_writes_defaults_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dmap").join("store.toml");

        let created = StoreConfig::load_or_create(&path).unwrap();
        assert_eq!(created, StoreConfig::default());
        assert!(path.exists());

        let mut edited = created.clone();
        edited.busy_timeout_ms = 42;
        edited.save_to(&path).unwrap();

        assert_eq!(StoreConfig::load_or_create(&path).unwrap(), edited);
    }

    #[test]
    fn test_default_config_path() {
        assert!(StoreConfig::default_config_path().ends_with("dmap/store.toml"));
    }

    #[test]
    fn test_in_memory() {
        assert!(StoreConfig::in_memory().is_in_memory());
        assert!(!StoreConfig::default().is_in_memory());
        assert!(StoreConfig::default()
            .db_path
            .ends_with("dmap/dmap-local-storage.db"));
    }
}
