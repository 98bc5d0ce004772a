//! TagVault Core Library
//!
//! This library provides the core functionality for the password manager:
//! credential records and tags scoped to a user, reversible field
//! obfuscation, tag-aware search, CSV import/export and the repository
//! backends they persist through.

pub mod accounts;
pub mod backup;
pub mod config;
pub mod context;
pub mod crypto;
pub mod database;
pub mod filter;
pub mod import_export;
pub mod keys;
pub mod platform;
pub mod records;
pub mod repository;
pub mod session;
pub mod tags;

pub use config::Config;
pub use context::AppContext;
pub use crypto::obfuscation::{obscure, reveal};
pub use database::{CredentialRecord, StoredRecord, Tag, User};
pub use filter::{filter_records, SearchQuery, DEFAULT_RESULT_LIMIT};
pub use import_export::{ExportRow, ImportRow, ImportSummary};
pub use keys::ensure_user_key;
pub use platform::{get_config_dir, get_data_dir, get_default_config_path};
pub use records::{RecordInput, RecordStore};
pub use repository::{KvRepository, Repository, SqliteRepository};
pub use session::{Session, SharedSession};
pub use tags::{TagInput, TagStore};

use thiserror::Error;

/// Result type for password manager operations
pub type Result<T> = std::result::Result<T, PasswordManagerError>;

/// General error type for password manager operations
#[derive(Error, Debug)]
pub enum PasswordManagerError {
    #[error("Crypto error: {0}")]
    Crypto(#[from] crypto::CryptoError),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Duplicate: {0}")]
    Duplicate(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Persistence failed: {0}")]
    Persistence(#[from] DatabaseError),

    #[error("Malformed stored data: {0}")]
    Decode(String),

    #[error("No valid entries to import")]
    NoValidEntries,

    #[error("Not logged in")]
    NotAuthenticated,

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Failures of the backing store, surfaced as `PasswordManagerError::Persistence`.
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("File I/O error: {0}")]
    FileIo(String),

    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("{0}")]
    Other(String),
}
