//! Typed entities persisted through the repository.
//!
//! Every backend decodes its raw rows or blobs into these types before they
//! reach the stores, so malformed shapes stop at the storage boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An account that owns records and tags
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub username: String,
    /// Argon2id PHC string
    pub password_hash: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_login: Option<DateTime<Utc>>,
    /// Per-user obfuscation key, created lazily
    #[serde(default)]
    pub encryption_key: Option<String>,
}

/// A named, colored label attached to records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub color: String,
    pub created_at: DateTime<Utc>,
}

/// A credential as persisted: password and notes obscured when `salt` is set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub site: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub tag_ids: Vec<Uuid>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub salt: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A credential held in memory with plaintext password and notes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub site: String,
    pub username: String,
    pub password: String,
    pub tag_ids: Vec<Uuid>,
    pub notes: String,
    pub salt: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredRecord {
    /// Whether this record is for the same site and account, ignoring case
    pub fn same_account(&self, site: &str, username: &str) -> bool {
        self.site.to_lowercase() == site.to_lowercase()
            && self.username.to_lowercase() == username.to_lowercase()
    }
}
