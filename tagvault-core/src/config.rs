//! Application configuration loaded from TOML

use crate::{
    filter::DEFAULT_RESULT_LIMIT,
    platform,
    repository::{FileStore, KvRepository, Repository, SqliteRepository},
    PasswordManagerError, Result,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Which repository backend holds the data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Normalized tables in one SQLite file
    Sqlite,
    /// One JSON file per entity type in a directory
    Files,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Database file for `sqlite`, directory for `files`.
    /// Defaults to the platform data directory.
    pub path: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            path: None,
        }
    }
}

impl StorageConfig {
    pub fn resolved_path(&self) -> PathBuf {
        match (&self.path, self.backend) {
            (Some(path), _) => path.clone(),
            (None, StorageBackend::Sqlite) => platform::get_default_database_path(),
            (None, StorageBackend::Files) => platform::get_default_store_dir(),
        }
    }

    /// Open the configured backend
    pub fn open(&self) -> Result<Arc<dyn Repository>> {
        let path = self.resolved_path();
        info!("Opening {:?} storage at {:?}", self.backend, path);

        let repo: Arc<dyn Repository> = match self.backend {
            StorageBackend::Sqlite => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        PasswordManagerError::Config(format!(
                            "Cannot create data directory {:?}: {}",
                            parent, e
                        ))
                    })?;
                }
                Arc::new(SqliteRepository::open(&path)?)
            }
            StorageBackend::Files => Arc::new(KvRepository::new(FileStore::open(&path)?)),
        };
        Ok(repo)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub idle_timeout_secs: u64,
    /// Period of [`crate::session::spawn_idle_watch`]. Only long-running
    /// hosts start that task; the one-shot CLI checks idleness on each access.
    pub check_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 30 * 60,
            check_interval_secs: 60,
        }
    }
}

impl SessionConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    pub enabled: bool,
    /// Period of [`crate::backup::spawn_backup_task`] in long-running hosts.
    /// The one-shot CLI snapshots after each change instead.
    pub interval_secs: u64,
    /// Directory of the file-backed backup store
    pub path: Option<PathBuf>,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
            path: None,
        }
    }
}

impl BackupConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn resolved_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(platform::get_default_backup_dir)
    }

    /// Open the backup store
    pub fn open(&self) -> Result<Arc<dyn Repository>> {
        Ok(Arc::new(KvRepository::new(FileStore::open(
            self.resolved_path(),
        )?)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub result_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            result_limit: DEFAULT_RESULT_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub session: SessionConfig,
    pub backup: BackupConfig,
    pub search: SearchConfig,
}

impl Config {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| PasswordManagerError::Config(format!("Invalid configuration: {}", e)))
    }

    /// Load from `path`, or return the defaults when the file does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            PasswordManagerError::Config(format!("Cannot read {:?}: {}", path, e))
        })?;
        Self::from_toml(&content)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| PasswordManagerError::Config(format!("Cannot serialize config: {}", e)))
    }

    /// Write the configuration, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                PasswordManagerError::Config(format!("Cannot create {:?}: {}", parent, e))
            })?;
        }
        std::fs::write(path, self.to_toml()?)
            .map_err(|e| PasswordManagerError::Config(format!("Cannot write {:?}: {}", path, e)))
    }
}
