//! Per-user obfuscation key provisioning.
//!
//! A key is generated the first time a user needs one and never changes
//! afterwards. Rotation is not supported: records obscured under an old key
//! would no longer reveal.

use crate::crypto::generate_user_key;
use crate::repository::Repository;
use crate::Result;
use tracing::info;
use uuid::Uuid;

/// Return the user's obfuscation key, creating and storing one if absent.
///
/// Calls for a user that already has a key perform no writes.
pub fn ensure_user_key(repo: &dyn Repository, user_id: Uuid) -> Result<String> {
    if let Some(key) = repo.get_user_key(user_id)? {
        if !key.is_empty() {
            return Ok(key);
        }
    }

    let key = generate_user_key();
    repo.put_user_key(user_id, &key)?;
    info!("Provisioned obfuscation key for user {}", user_id);
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::User;
    use crate::repository::kv::USERS_KEY;
    use crate::repository::{KeyValueStore, KvRepository, MemoryStore, SqliteRepository};
    use crate::PasswordManagerError;
    use chrono::Utc;

    fn seeded<R: Repository>(repo: &R) -> Uuid {
        let user = User {
            id: Uuid::new_v4(),
            username: "alice".to_string(),
            password_hash: "$argon2id$test".to_string(),
            is_admin: false,
            created_at: Utc::now(),
            last_login: None,
            encryption_key: None,
        };
        repo.put_users(&[user.clone()]).unwrap();
        user.id
    }

    #[test]
    fn test_key_is_generated_once() {
        let repo = KvRepository::new(MemoryStore::new());
        let user_id = seeded(&repo);

        let first = ensure_user_key(&repo, user_id).unwrap();
        let second = ensure_user_key(&repo, user_id).unwrap();
        assert_eq!(first, second);
        assert_eq!(repo.get_user_key(user_id).unwrap(), Some(first));
    }

    #[test]
    fn test_existing_key_causes_no_write() {
        let repo = KvRepository::new(MemoryStore::new());
        let user_id = seeded(&repo);
        repo.put_user_key(user_id, "preset").unwrap();

        let before = repo.store().get(USERS_KEY).unwrap();
        assert_eq!(ensure_user_key(&repo, user_id).unwrap(), "preset");
        let after = repo.store().get(USERS_KEY).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_sqlite_backend() {
        let repo = SqliteRepository::in_memory().unwrap();
        let user_id = seeded(&repo);
        let key = ensure_user_key(&repo, user_id).unwrap();
        assert_eq!(ensure_user_key(&repo, user_id).unwrap(), key);
    }

    #[test]
    fn test_unknown_user() {
        let repo = KvRepository::new(MemoryStore::new());
        assert!(matches!(
            ensure_user_key(&repo, Uuid::new_v4()),
            Err(PasswordManagerError::NotFound(_))
        ));
    }
}
