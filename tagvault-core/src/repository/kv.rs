//! Key-value backend: one JSON blob per entity type.
//!
//! Records and tags of every user share a single blob and are filtered by
//! owner on read. User keys live on the user rows. Blobs are decoded through
//! the serde models, so a malformed blob is reported as
//! [`PasswordManagerError::Decode`] instead of leaking loose shapes.

use crate::database::{StoredRecord, Tag, User};
use crate::repository::{check_owner, Repository};
use crate::{DatabaseError, PasswordManagerError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

pub const USERS_KEY: &str = "pm_users";
pub const RECORDS_KEY: &str = "pm_passwords";
pub const TAGS_KEY: &str = "pm_tags";

/// A flat string-to-string store
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// Process-local store, mostly for tests and scratch sessions
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn values(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.values
            .lock()
            .map_err(|_| DatabaseError::LockPoisoned("Failed to lock memory store".to_string()).into())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.values()?.remove(key);
        Ok(())
    }
}

/// Directory-backed store: each key is a `<key>.json` file
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open a store rooted at `dir`, creating the directory if needed
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| {
            DatabaseError::FileIo(format!("Failed to create store directory {:?}: {}", dir, e))
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(DatabaseError::Other(format!("Invalid store key: {:?}", key)).into());
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DatabaseError::FileIo(format!("Failed to read {:?}: {}", path, e)).into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;
        // Write-then-rename so a crash never leaves a half-written blob
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)
            .map_err(|e| DatabaseError::FileIo(format!("Failed to write {:?}: {}", tmp, e)))?;
        fs::rename(&tmp, &path)
            .map_err(|e| DatabaseError::FileIo(format!("Failed to replace {:?}: {}", path, e)))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DatabaseError::FileIo(format!("Failed to remove {:?}: {}", path, e)).into()),
        }
    }
}

/// [`Repository`] over any [`KeyValueStore`]
pub struct KvRepository<S: KeyValueStore> {
    store: S,
}

impl<S: KeyValueStore> KvRepository<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>> {
        match self.store.get(key)? {
            None => Ok(Vec::new()),
            Some(raw) if raw.trim().is_empty() => Ok(Vec::new()),
            Some(raw) => serde_json::from_str(&raw)
                .map_err(|e| PasswordManagerError::Decode(format!("{}: {}", key, e))),
        }
    }

    fn save<T: Serialize>(&self, key: &str, items: &[T]) -> Result<()> {
        let raw = serde_json::to_string(items)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        self.store.set(key, &raw)?;
        debug!("Saved {} item(s) under {}", items.len(), key);
        Ok(())
    }
}

impl<S: KeyValueStore> Repository for KvRepository<S> {
    fn get_users(&self) -> Result<Vec<User>> {
        self.load(USERS_KEY)
    }

    fn put_users(&self, users: &[User]) -> Result<()> {
        self.save(USERS_KEY, users)
    }

    fn get_records(&self, user_id: Uuid) -> Result<Vec<StoredRecord>> {
        let all: Vec<StoredRecord> = self.load(RECORDS_KEY)?;
        Ok(all.into_iter().filter(|r| r.user_id == user_id).collect())
    }

    fn put_records(&self, user_id: Uuid, records: &[StoredRecord]) -> Result<()> {
        check_owner(user_id, records.iter().map(|r| &r.user_id), "Record")?;

        let mut all: Vec<StoredRecord> = self.load(RECORDS_KEY)?;
        all.retain(|r| r.user_id != user_id);
        all.extend_from_slice(records);
        self.save(RECORDS_KEY, &all)
    }

    fn get_tags(&self, user_id: Uuid) -> Result<Vec<Tag>> {
        let all: Vec<Tag> = self.load(TAGS_KEY)?;
        Ok(all.into_iter().filter(|t| t.user_id == user_id).collect())
    }

    fn put_tags(&self, user_id: Uuid, tags: &[Tag]) -> Result<()> {
        check_owner(user_id, tags.iter().map(|t| &t.user_id), "Tag")?;

        let mut all: Vec<Tag> = self.load(TAGS_KEY)?;
        all.retain(|t| t.user_id != user_id);
        all.extend_from_slice(tags);
        self.save(TAGS_KEY, &all)
    }

    fn get_user_key(&self, user_id: Uuid) -> Result<Option<String>> {
        self.get_users()?
            .into_iter()
            .find(|u| u.id == user_id)
            .map(|u| u.encryption_key)
            .ok_or_else(|| PasswordManagerError::NotFound(format!("User {}", user_id)))
    }

    fn put_user_key(&self, user_id: Uuid, key: &str) -> Result<()> {
        let mut users = self.get_users()?;
        let user = users
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or_else(|| PasswordManagerError::NotFound(format!("User {}", user_id)))?;
        user.encryption_key = Some(key.to_string());
        self.put_users(&users)
    }
}
