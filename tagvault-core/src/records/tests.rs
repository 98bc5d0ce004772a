use super::*;
use crate::database::{Tag, User};
use crate::repository::{KvRepository, MemoryStore, SqliteRepository};
use crate::DatabaseError;

/// Repository whose record writes always fail
struct ReadOnlyRecords {
    inner: KvRepository<MemoryStore>,
}

impl Repository for ReadOnlyRecords {
    fn get_users(&self) -> Result<Vec<User>> {
        self.inner.get_users()
    }
    fn put_users(&self, users: &[User]) -> Result<()> {
        self.inner.put_users(users)
    }
    fn get_records(&self, user_id: Uuid) -> Result<Vec<StoredRecord>> {
        self.inner.get_records(user_id)
    }
    fn put_records(&self, _user_id: Uuid, _records: &[StoredRecord]) -> Result<()> {
        Err(DatabaseError::FileIo("disk full".to_string()).into())
    }
    fn get_tags(&self, user_id: Uuid) -> Result<Vec<Tag>> {
        self.inner.get_tags(user_id)
    }
    fn put_tags(&self, user_id: Uuid, tags: &[Tag]) -> Result<()> {
        self.inner.put_tags(user_id, tags)
    }
    fn get_user_key(&self, user_id: Uuid) -> Result<Option<String>> {
        self.inner.get_user_key(user_id)
    }
    fn put_user_key(&self, user_id: Uuid, key: &str) -> Result<()> {
        self.inner.put_user_key(user_id, key)
    }
}

fn seed_user(repo: &dyn Repository) -> Uuid {
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

fn backends() -> Vec<Box<dyn Repository>> {
    vec![
        Box::new(KvRepository::new(MemoryStore::new())),
        Box::new(SqliteRepository::in_memory().unwrap()),
    ]
}

fn input(site: &str, username: &str, password: &str) -> RecordInput {
    RecordInput {
        site: site.to_string(),
        username: username.to_string(),
        password: password.to_string(),
        ..Default::default()
    }
}

fn import_row(site: &str, username: &str, password: &str) -> ImportRow {
    ImportRow {
        site: site.to_string(),
        username: username.to_string(),
        password: password.to_string(),
        ..Default::default()
    }
}

#[test]
fn test_create_and_list_sorted() {
    for repo in backends() {
        let user_id = seed_user(repo.as_ref());
        let store = RecordStore::new(repo.as_ref(), user_id);

        store.create(input("zeta.io", "me", "pw1")).unwrap();
        store.create(input("  Alpha.com ", " me ", "pw2")).unwrap();

        let records = store.list().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].site, "Alpha.com");
        assert_eq!(records[0].username, "me");
        assert_eq!(records[0].password, "pw2");
        assert_eq!(records[1].site, "zeta.io");
    }
}

#[test]
fn test_required_fields() {
    let repo = KvRepository::new(MemoryStore::new());
    let user_id = seed_user(&repo);
    let store = RecordStore::new(&repo, user_id);

    for bad in [input(" ", "me", "pw"), input("a.com", "", "pw"), input("a.com", "me", "   ")] {
        assert!(matches!(
            store.create(bad),
            Err(PasswordManagerError::Validation(_))
        ));
    }
    assert!(store.list().unwrap().is_empty());
}

#[test]
fn test_password_kept_verbatim() {
    let repo = KvRepository::new(MemoryStore::new());
    let user_id = seed_user(&repo);
    let store = RecordStore::new(&repo, user_id);

    let record = store.create(input("a.com", "me", " spaced ")).unwrap();
    assert_eq!(store.get(record.id).unwrap().password, " spaced ");
}

#[test]
fn test_duplicate_is_case_insensitive() {
    for repo in backends() {
        let user_id = seed_user(repo.as_ref());
        let store = RecordStore::new(repo.as_ref(), user_id);

        store.create(input("Gmail.com", "Me", "pw")).unwrap();
        assert!(matches!(
            store.create(input("gmail.com", "me", "other")),
            Err(PasswordManagerError::Duplicate(_))
        ));
        store.create(input("gmail.com", "work", "pw")).unwrap();
    }
}

#[test]
fn test_update_rules() {
    for repo in backends() {
        let user_id = seed_user(repo.as_ref());
        let store = RecordStore::new(repo.as_ref(), user_id);

        let first = store.create(input("a.com", "me", "pw")).unwrap();
        let second = store.create(input("b.com", "me", "pw")).unwrap();

        assert!(matches!(
            store.update(second.id, input("A.COM", "ME", "pw")),
            Err(PasswordManagerError::Duplicate(_))
        ));

        let updated = store.update(first.id, input("a.com", "me", "new")).unwrap();
        assert_eq!(updated.id, first.id);
        assert_eq!(updated.created_at, first.created_at);
        assert_eq!(store.get(first.id).unwrap().password, "new");

        assert!(matches!(
            store.update(Uuid::new_v4(), input("c.com", "me", "pw")),
            Err(PasswordManagerError::NotFound(_))
        ));
    }
}

#[test]
fn test_update_rotates_salt() {
    let repo = KvRepository::new(MemoryStore::new());
    let user_id = seed_user(&repo);
    let store = RecordStore::new(&repo, user_id);

    let record = store.create(input("a.com", "me", "same")).unwrap();
    let before = repo.get_records(user_id).unwrap().remove(0);

    store.update(record.id, input("a.com", "me", "same")).unwrap();
    let after = repo.get_records(user_id).unwrap().remove(0);

    assert_ne!(before.salt, after.salt);
    assert_ne!(before.password, after.password);
    assert_eq!(store.get(record.id).unwrap().password, "same");
}

#[test]
fn test_delete_is_idempotent() {
    for repo in backends() {
        let user_id = seed_user(repo.as_ref());
        let store = RecordStore::new(repo.as_ref(), user_id);

        let record = store.create(input("a.com", "me", "pw")).unwrap();
        store.delete(record.id).unwrap();
        store.delete(record.id).unwrap();
        store.delete(Uuid::new_v4()).unwrap();

        assert!(store.list().unwrap().is_empty());
        assert!(matches!(
            store.get(record.id),
            Err(PasswordManagerError::NotFound(_))
        ));
    }
}

#[test]
fn test_secrets_obscured_at_rest() {
    let repo = KvRepository::new(MemoryStore::new());
    let user_id = seed_user(&repo);
    let store = RecordStore::new(&repo, user_id);

    let mut with_notes = input("a.com", "me", "hunter2");
    with_notes.notes = "  recovery codes  ".to_string();
    store.create(with_notes).unwrap();

    let stored = repo.get_records(user_id).unwrap().remove(0);
    assert_ne!(stored.password, "hunter2");
    assert_ne!(stored.notes, "recovery codes");
    assert!(stored.salt.is_some());

    let record = store.list().unwrap().remove(0);
    assert_eq!(record.password, "hunter2");
    assert_eq!(record.notes, "recovery codes");
}

#[test]
fn test_legacy_unsalted_record_reads_as_plaintext() {
    let repo = KvRepository::new(MemoryStore::new());
    let user_id = seed_user(&repo);
    let now = Utc::now();

    let legacy = StoredRecord {
        id: Uuid::new_v4(),
        user_id,
        site: "old.com".to_string(),
        username: "me".to_string(),
        password: "plain".to_string(),
        tag_ids: Vec::new(),
        notes: "plain notes".to_string(),
        salt: None,
        created_at: now,
        updated_at: now,
    };
    repo.put_records(user_id, &[legacy.clone()]).unwrap();

    let store = RecordStore::new(&repo, user_id);
    let record = store.get(legacy.id).unwrap();
    assert_eq!(record.password, "plain");
    assert_eq!(record.notes, "plain notes");

    // listing plaintext-only records does not provision a key
    assert_eq!(repo.get_user_key(user_id).unwrap(), None);
}

#[test]
fn test_list_without_key_keeps_salted_records_as_stored() {
    let repo = KvRepository::new(MemoryStore::new());
    let user_id = seed_user(&repo);
    let store = RecordStore::new(&repo, user_id);
    store.create(input("a.com", "me", "hunter2")).unwrap();
    let stored = repo.get_records(user_id).unwrap().remove(0);

    // key lost, e.g. a user row restored without it
    let mut users = repo.get_users().unwrap();
    users[0].encryption_key = None;
    repo.put_users(&users).unwrap();

    let record = store.list().unwrap().remove(0);
    assert_eq!(record.password, stored.password);
    assert_eq!(repo.get_user_key(user_id).unwrap(), None);
}

#[test]
fn test_tag_ids_deduplicated() {
    let repo = KvRepository::new(MemoryStore::new());
    let user_id = seed_user(&repo);
    let store = RecordStore::new(&repo, user_id);

    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    let mut tagged = input("a.com", "me", "pw");
    tagged.tag_ids = vec![a, b, a, b];

    let record = store.create(tagged).unwrap();
    assert_eq!(record.tag_ids, vec![a, b]);
}

#[test]
fn test_import_skips_incomplete_rows() {
    for repo in backends() {
        let user_id = seed_user(repo.as_ref());
        let store = RecordStore::new(repo.as_ref(), user_id);

        let mut tagged = import_row("a.com", "me", "one");
        tagged.tags = "Work;Travel".to_string();
        let rows = vec![tagged, import_row("b.com", "me", ""), import_row("c.com", "me", "three")];

        let summary = store.import(&rows).unwrap();
        assert_eq!(
            summary,
            ImportSummary {
                imported: 2,
                skipped: 1,
                created_tags: 2
            }
        );

        let records = store.list().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].password, "one");
        assert_eq!(records[0].tag_ids.len(), 2);
        assert_eq!(repo.get_tags(user_id).unwrap().len(), 2);
    }
}

#[test]
fn test_import_without_valid_rows_writes_nothing() {
    let repo = KvRepository::new(MemoryStore::new());
    let user_id = seed_user(&repo);
    let store = RecordStore::new(&repo, user_id);

    let mut row = import_row("", "me", "pw");
    row.tags = "Orphan".to_string();

    assert!(matches!(
        store.import(&[row, import_row("a.com", "", "pw")]),
        Err(PasswordManagerError::NoValidEntries)
    ));
    assert!(store.list().unwrap().is_empty());
    assert!(repo.get_tags(user_id).unwrap().is_empty());
}

#[test]
fn test_failed_import_leaves_tags_untouched() {
    let repo = ReadOnlyRecords {
        inner: KvRepository::new(MemoryStore::new()),
    };
    let user_id = seed_user(&repo);
    let store = RecordStore::new(&repo, user_id);

    let mut row = import_row("a.com", "me", "pw");
    row.tags = "Work;Travel".to_string();

    assert!(matches!(
        store.import(&[row]),
        Err(PasswordManagerError::Persistence(_))
    ));
    assert!(repo.get_tags(user_id).unwrap().is_empty());
    assert!(repo.get_records(user_id).unwrap().is_empty());
}
