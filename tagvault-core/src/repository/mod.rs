//! Persistence boundary shared by every storage backend.
//!
//! The stores only talk to [`Repository`]; whether data lands in JSON blobs
//! on a key-value store or in normalized SQLite tables is invisible to them.

pub mod kv;
pub mod sqlite;

pub use kv::{FileStore, KeyValueStore, KvRepository, MemoryStore};
pub use sqlite::SqliteRepository;

use crate::database::{StoredRecord, Tag, User};
use crate::{PasswordManagerError, Result};
use uuid::Uuid;

/// Storage operations consumed by the stores.
///
/// `put_*` calls replace the whole set for their scope: all users, or one
/// user's records or tags.
pub trait Repository: Send + Sync {
    fn get_users(&self) -> Result<Vec<User>>;
    fn put_users(&self, users: &[User]) -> Result<()>;

    fn get_records(&self, user_id: Uuid) -> Result<Vec<StoredRecord>>;
    fn put_records(&self, user_id: Uuid, records: &[StoredRecord]) -> Result<()>;

    fn get_tags(&self, user_id: Uuid) -> Result<Vec<Tag>>;
    fn put_tags(&self, user_id: Uuid, tags: &[Tag]) -> Result<()>;

    fn get_user_key(&self, user_id: Uuid) -> Result<Option<String>>;
    fn put_user_key(&self, user_id: Uuid, key: &str) -> Result<()>;

    /// Look up a single user by id
    fn get_user(&self, user_id: Uuid) -> Result<Option<User>> {
        Ok(self.get_users()?.into_iter().find(|u| u.id == user_id))
    }
}

/// Reject a put whose items belong to a different user than its scope
pub(crate) fn check_owner<'a>(
    user_id: Uuid,
    owners: impl IntoIterator<Item = &'a Uuid>,
    kind: &str,
) -> Result<()> {
    if owners.into_iter().any(|owner| *owner != user_id) {
        return Err(PasswordManagerError::Validation(format!(
            "{} belongs to a different user than {}",
            kind, user_id
        )));
    }
    Ok(())
}
