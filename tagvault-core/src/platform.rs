//! Platform-specific directories

use std::path::PathBuf;

const APP_DIR: &str = "TagVault";

/// Directory for application data
///
/// - Windows: %LOCALAPPDATA%\TagVault
/// - macOS: ~/Library/Application Support/TagVault
/// - Linux: ~/.local/share/TagVault
pub fn get_data_dir() -> PathBuf {
    let base = dirs::data_local_dir()
        .or_else(dirs::data_dir)
        .or_else(|| dirs::home_dir().map(|h| h.join(".data")))
        .unwrap_or_else(|| PathBuf::from("."));

    base.join(APP_DIR)
}

/// Directory for the configuration file
pub fn get_config_dir() -> PathBuf {
    let base = dirs::config_dir()
        .or_else(dirs::data_dir)
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .unwrap_or_else(|| PathBuf::from("."));

    base.join(APP_DIR)
}

pub fn get_default_config_path() -> PathBuf {
    get_config_dir().join("config.toml")
}

/// Default SQLite database path
pub fn get_default_database_path() -> PathBuf {
    get_data_dir().join("tagvault.db")
}

/// Default directory for the file-backed key-value store
pub fn get_default_store_dir() -> PathBuf {
    get_data_dir().join("store")
}

/// Default directory for backup snapshots
pub fn get_default_backup_dir() -> PathBuf {
    get_data_dir().join("backup")
}
