//! Relational backend: normalized SQLite tables with a record/tag join table.

use crate::database::{Database, StoredRecord, Tag, User};
use crate::repository::{check_owner, Repository};
use crate::{DatabaseError, PasswordManagerError, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

fn parse_uuid(value: &str, field: &str) -> Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| PasswordManagerError::Decode(format!("Invalid {} {:?}: {}", field, value, e)))
}

fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| PasswordManagerError::Decode(format!("Invalid {} {:?}: {}", field, value, e)))
}

fn parse_optional_datetime(value: Option<String>, field: &str) -> Result<Option<DateTime<Utc>>> {
    value.map(|v| parse_datetime(&v, field)).transpose()
}

/// [`Repository`] backed by a SQLite database
#[derive(Clone)]
pub struct SqliteRepository {
    db: Arc<Mutex<Database>>,
}

impl SqliteRepository {
    /// Open (or create) the database file at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = Database::open(path)?;
        Self::from_database(db)
    }

    /// Create a repository over a fresh in-memory database
    pub fn in_memory() -> Result<Self> {
        Self::from_database(Database::in_memory()?)
    }

    fn from_database(db: Database) -> Result<Self> {
        db.initialize_schema()?;
        db.validate_schema_version()?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Database>> {
        self.db
            .lock()
            .map_err(|_| DatabaseError::LockPoisoned("Failed to lock database".to_string()).into())
    }
}

impl Repository for SqliteRepository {
    fn get_users(&self) -> Result<Vec<User>> {
        let db = self.lock()?;
        let mut stmt = db
            .conn()
            .prepare(
                "SELECT user_id, username, password_hash, is_admin, created_at, last_login, encryption_key
                 FROM users ORDER BY rowid",
            )
            .map_err(DatabaseError::Sqlite)?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, bool>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, Option<String>>(6)?,
                ))
            })
            .map_err(DatabaseError::Sqlite)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(DatabaseError::Sqlite)?;

        rows.into_iter()
            .map(
                |(id, username, password_hash, is_admin, created_at, last_login, encryption_key)| {
                    Ok(User {
                        id: parse_uuid(&id, "user_id")?,
                        username,
                        password_hash,
                        is_admin,
                        created_at: parse_datetime(&created_at, "created_at")?,
                        last_login: parse_optional_datetime(last_login, "last_login")?,
                        encryption_key,
                    })
                },
            )
            .collect()
    }

    fn put_users(&self, users: &[User]) -> Result<()> {
        let db = self.lock()?;
        let tx = db
            .conn()
            .unchecked_transaction()
            .map_err(DatabaseError::Sqlite)?;

        // Users are upserted rather than recreated so their tags and records
        // survive; only users missing from the list are removed (cascading).
        let existing: Vec<String> = {
            let mut stmt = tx
                .prepare("SELECT user_id FROM users")
                .map_err(DatabaseError::Sqlite)?;
            let ids = stmt
                .query_map([], |row| row.get(0))
                .map_err(DatabaseError::Sqlite)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(DatabaseError::Sqlite)?;
            ids
        };
        for id in existing {
            if !users.iter().any(|u| u.id.to_string() == id) {
                tx.execute("DELETE FROM users WHERE user_id = ?1", [&id])
                    .map_err(DatabaseError::Sqlite)?;
            }
        }

        for user in users {
            tx.execute(
                "INSERT INTO users (user_id, username, password_hash, is_admin, created_at, last_login, encryption_key)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(user_id) DO UPDATE SET
                    username = excluded.username,
                    password_hash = excluded.password_hash,
                    is_admin = excluded.is_admin,
                    created_at = excluded.created_at,
                    last_login = excluded.last_login,
                    encryption_key = excluded.encryption_key",
                rusqlite::params![
                    user.id.to_string(),
                    user.username,
                    user.password_hash,
                    user.is_admin,
                    user.created_at.to_rfc3339(),
                    user.last_login.map(|t| t.to_rfc3339()),
                    user.encryption_key,
                ],
            )
            .map_err(DatabaseError::Sqlite)?;
        }

        tx.commit().map_err(DatabaseError::Sqlite)?;
        Ok(())
    }

    fn get_records(&self, user_id: Uuid) -> Result<Vec<StoredRecord>> {
        let db = self.lock()?;
        let uid = user_id.to_string();

        let mut tag_stmt = db
            .conn()
            .prepare(
                "SELECT rt.record_id, rt.tag_id FROM record_tags rt
                 JOIN records r ON r.record_id = rt.record_id
                 WHERE r.user_id = ?1
                 ORDER BY rt.position",
            )
            .map_err(DatabaseError::Sqlite)?;
        let links = tag_stmt
            .query_map([&uid], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
            .map_err(DatabaseError::Sqlite)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(DatabaseError::Sqlite)?;

        let mut tags_by_record: HashMap<String, Vec<Uuid>> = HashMap::new();
        for (record_id, tag_id) in links {
            let tag_id = parse_uuid(&tag_id, "tag_id")?;
            tags_by_record.entry(record_id).or_default().push(tag_id);
        }

        let mut stmt = db
            .conn()
            .prepare(
                "SELECT record_id, site, username, password, notes, salt, created_at, updated_at
                 FROM records WHERE user_id = ?1 ORDER BY position",
            )
            .map_err(DatabaseError::Sqlite)?;
        let rows = stmt
            .query_map([&uid], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, String>(7)?,
                ))
            })
            .map_err(DatabaseError::Sqlite)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(DatabaseError::Sqlite)?;

        rows.into_iter()
            .map(
                |(id, site, username, password, notes, salt, created_at, updated_at)| {
                    let tag_ids = tags_by_record.remove(&id).unwrap_or_default();
                    Ok(StoredRecord {
                        id: parse_uuid(&id, "record_id")?,
                        user_id,
                        site,
                        username,
                        password,
                        tag_ids,
                        notes,
                        salt,
                        created_at: parse_datetime(&created_at, "created_at")?,
                        updated_at: parse_datetime(&updated_at, "updated_at")?,
                    })
                },
            )
            .collect()
    }

    fn put_records(&self, user_id: Uuid, records: &[StoredRecord]) -> Result<()> {
        check_owner(user_id, records.iter().map(|r| &r.user_id), "Record")?;

        let db = self.lock()?;
        let tx = db
            .conn()
            .unchecked_transaction()
            .map_err(DatabaseError::Sqlite)?;

        // Join rows go with their records through ON DELETE CASCADE
        tx.execute("DELETE FROM records WHERE user_id = ?1", [user_id.to_string()])
            .map_err(DatabaseError::Sqlite)?;

        for (position, record) in records.iter().enumerate() {
            let record_id = record.id.to_string();
            tx.execute(
                "INSERT INTO records (record_id, user_id, site, username, password, notes, salt,
                                      position, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                rusqlite::params![
                    record_id,
                    user_id.to_string(),
                    record.site,
                    record.username,
                    record.password,
                    record.notes,
                    record.salt,
                    position as i64,
                    record.created_at.to_rfc3339(),
                    record.updated_at.to_rfc3339(),
                ],
            )
            .map_err(DatabaseError::Sqlite)?;

            for (tag_position, tag_id) in record.tag_ids.iter().enumerate() {
                tx.execute(
                    "INSERT OR IGNORE INTO record_tags (record_id, tag_id, position) VALUES (?1, ?2, ?3)",
                    rusqlite::params![record_id, tag_id.to_string(), tag_position as i64],
                )
                .map_err(DatabaseError::Sqlite)?;
            }
        }

        tx.commit().map_err(DatabaseError::Sqlite)?;
        debug!("Stored {} record(s) for user {}", records.len(), user_id);
        Ok(())
    }

    fn get_tags(&self, user_id: Uuid) -> Result<Vec<Tag>> {
        let db = self.lock()?;
        let mut stmt = db
            .conn()
            .prepare(
                "SELECT tag_id, name, description, color, created_at
                 FROM tags WHERE user_id = ?1 ORDER BY position",
            )
            .map_err(DatabaseError::Sqlite)?;

        let rows = stmt
            .query_map([user_id.to_string()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })
            .map_err(DatabaseError::Sqlite)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(DatabaseError::Sqlite)?;

        rows.into_iter()
            .map(|(id, name, description, color, created_at)| {
                Ok(Tag {
                    id: parse_uuid(&id, "tag_id")?,
                    user_id,
                    name,
                    description,
                    color,
                    created_at: parse_datetime(&created_at, "created_at")?,
                })
            })
            .collect()
    }

    fn put_tags(&self, user_id: Uuid, tags: &[Tag]) -> Result<()> {
        check_owner(user_id, tags.iter().map(|t| &t.user_id), "Tag")?;

        let db = self.lock()?;
        let tx = db
            .conn()
            .unchecked_transaction()
            .map_err(DatabaseError::Sqlite)?;

        tx.execute("DELETE FROM tags WHERE user_id = ?1", [user_id.to_string()])
            .map_err(DatabaseError::Sqlite)?;

        for (position, tag) in tags.iter().enumerate() {
            tx.execute(
                "INSERT INTO tags (tag_id, user_id, name, description, color, position, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    tag.id.to_string(),
                    user_id.to_string(),
                    tag.name,
                    tag.description,
                    tag.color,
                    position as i64,
                    tag.created_at.to_rfc3339(),
                ],
            )
            .map_err(DatabaseError::Sqlite)?;
        }

        tx.commit().map_err(DatabaseError::Sqlite)?;
        Ok(())
    }

    fn get_user_key(&self, user_id: Uuid) -> Result<Option<String>> {
        let db = self.lock()?;
        let result = db.conn().query_row(
            "SELECT encryption_key FROM users WHERE user_id = ?1",
            [user_id.to_string()],
            |row| row.get::<_, Option<String>>(0),
        );

        match result {
            Ok(key) => Ok(key),
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                Err(PasswordManagerError::NotFound(format!("User {}", user_id)))
            }
            Err(e) => Err(DatabaseError::Sqlite(e).into()),
        }
    }

    fn put_user_key(&self, user_id: Uuid, key: &str) -> Result<()> {
        let db = self.lock()?;
        let rows_affected = db
            .conn()
            .execute(
                "UPDATE users SET encryption_key = ?1 WHERE user_id = ?2",
                [key.to_string(), user_id.to_string()],
            )
            .map_err(DatabaseError::Sqlite)?;

        if rows_affected == 0 {
            return Err(PasswordManagerError::NotFound(format!("User {}", user_id)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(name: &str) -> User {
        User {
            id: Uuid::new_v4(),
            username: name.to_string(),
            password_hash: "$argon2id$test".to_string(),
            is_admin: false,
            created_at: Utc::now(),
            last_login: None,
            encryption_key: None,
        }
    }

    fn record(user_id: Uuid, site: &str, tag_ids: Vec<Uuid>) -> StoredRecord {
        StoredRecord {
            id: Uuid::new_v4(),
            user_id,
            site: site.to_string(),
            username: "me".to_string(),
            password: "c2VjcmV0".to_string(),
            tag_ids,
            notes: String::new(),
            salt: Some("salt".to_string()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_users_roundtrip() {
        let repo = SqliteRepository::in_memory().unwrap();
        let mut alice = user("alice");
        alice.last_login = Some(Utc::now());
        let bob = user("bob");

        repo.put_users(&[alice.clone(), bob.clone()]).unwrap();
        assert_eq!(repo.get_users().unwrap(), vec![alice.clone(), bob]);

        repo.put_users(&[alice.clone()]).unwrap();
        assert_eq!(repo.get_users().unwrap(), vec![alice]);
    }

    #[test]
    fn test_records_keep_order_and_tags() {
        let repo = SqliteRepository::in_memory().unwrap();
        let alice = user("alice");
        repo.put_users(&[alice.clone()]).unwrap();

        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let records = vec![
            record(alice.id, "zeta.com", vec![b, a]),
            record(alice.id, "alpha.com", vec![]),
        ];
        repo.put_records(alice.id, &records).unwrap();

        let loaded = repo.get_records(alice.id).unwrap();
        assert_eq!(loaded, records);
    }

    #[test]
    fn test_updating_users_keeps_their_records() {
        let repo = SqliteRepository::in_memory().unwrap();
        let mut alice = user("alice");
        repo.put_users(&[alice.clone()]).unwrap();
        repo.put_records(alice.id, &[record(alice.id, "a.com", vec![])])
            .unwrap();

        alice.last_login = Some(Utc::now());
        repo.put_users(&[alice.clone()]).unwrap();

        assert_eq!(repo.get_records(alice.id).unwrap().len(), 1);
    }

    #[test]
    fn test_removing_user_cascades() {
        let repo = SqliteRepository::in_memory().unwrap();
        let alice = user("alice");
        repo.put_users(&[alice.clone()]).unwrap();
        repo.put_records(alice.id, &[record(alice.id, "a.com", vec![])])
            .unwrap();

        repo.put_users(&[]).unwrap();
        assert!(repo.get_records(alice.id).unwrap().is_empty());
    }

    #[test]
    fn test_records_for_unknown_user_fail() {
        let repo = SqliteRepository::in_memory().unwrap();
        let ghost = Uuid::new_v4();
        let result = repo.put_records(ghost, &[record(ghost, "a.com", vec![])]);
        assert!(matches!(result, Err(PasswordManagerError::Persistence(_))));
    }

    #[test]
    fn test_user_key() {
        let repo = SqliteRepository::in_memory().unwrap();
        let alice = user("alice");
        repo.put_users(&[alice.clone()]).unwrap();

        assert_eq!(repo.get_user_key(alice.id).unwrap(), None);
        repo.put_user_key(alice.id, "k").unwrap();
        assert_eq!(repo.get_user_key(alice.id).unwrap(), Some("k".to_string()));
        assert!(matches!(
            repo.put_user_key(Uuid::new_v4(), "k"),
            Err(PasswordManagerError::NotFound(_))
        ));
    }
}
