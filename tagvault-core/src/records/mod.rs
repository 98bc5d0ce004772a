//! Credential record store - coordinates the codec and the repository

#[cfg(test)]
mod tests;

use crate::{
    crypto::{generate_salt, obscure, reveal},
    database::{CredentialRecord, StoredRecord},
    import_export::{prepare_import, ImportRow, ImportSummary},
    keys::ensure_user_key,
    repository::Repository,
    PasswordManagerError, Result,
};
use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Fields supplied when creating or editing a record
#[derive(Debug, Clone, Default)]
pub struct RecordInput {
    pub site: String,
    pub username: String,
    pub password: String,
    pub tag_ids: Vec<Uuid>,
    pub notes: String,
}

/// A validated [`RecordInput`]: text trimmed, tag ids de-duplicated
pub(crate) struct CleanInput {
    pub site: String,
    pub username: String,
    pub password: String,
    pub tag_ids: Vec<Uuid>,
    pub notes: String,
}

impl RecordInput {
    /// Trim and check required fields.
    ///
    /// The password must not be blank but is kept verbatim, since leading or
    /// trailing spaces can be part of a real secret.
    pub(crate) fn clean(self) -> Result<CleanInput> {
        let site = self.site.trim().to_string();
        let username = self.username.trim().to_string();

        if site.is_empty() {
            return Err(PasswordManagerError::Validation("Site is required".to_string()));
        }
        if username.is_empty() {
            return Err(PasswordManagerError::Validation(
                "Username is required".to_string(),
            ));
        }
        if self.password.trim().is_empty() {
            return Err(PasswordManagerError::Validation(
                "Password is required".to_string(),
            ));
        }

        Ok(CleanInput {
            site,
            username,
            password: self.password,
            tag_ids: dedup_tag_ids(self.tag_ids),
            notes: self.notes.trim().to_string(),
        })
    }
}

/// Drop repeated tag ids, keeping the first occurrence
pub(crate) fn dedup_tag_ids(tag_ids: Vec<Uuid>) -> Vec<Uuid> {
    let mut unique = Vec::with_capacity(tag_ids.len());
    for id in tag_ids {
        if !unique.contains(&id) {
            unique.push(id);
        }
    }
    unique
}

/// Obscure password and notes under a fresh salt
pub(crate) fn conceal(
    id: Uuid,
    user_id: Uuid,
    input: CleanInput,
    key: &str,
    created_at: chrono::DateTime<Utc>,
) -> StoredRecord {
    let salt = generate_salt();
    let notes = if input.notes.is_empty() {
        String::new()
    } else {
        obscure(&input.notes, key, &salt)
    };

    StoredRecord {
        id,
        user_id,
        site: input.site,
        username: input.username,
        password: obscure(&input.password, key, &salt),
        tag_ids: input.tag_ids,
        notes,
        salt: Some(salt),
        created_at,
        updated_at: Utc::now(),
    }
}

/// Turn a stored record back into plaintext. Records without a salt are
/// legacy plaintext and are returned as stored.
pub(crate) fn reveal_record(stored: StoredRecord, key: &str) -> CredentialRecord {
    let mut record = stored_as_is(stored);
    if let Some(salt) = record.salt.as_deref() {
        record.password = reveal(&record.password, key, salt);
        record.notes = reveal(&record.notes, key, salt);
    }
    record
}

fn stored_as_is(stored: StoredRecord) -> CredentialRecord {
    CredentialRecord {
        id: stored.id,
        user_id: stored.user_id,
        site: stored.site,
        username: stored.username,
        password: stored.password,
        tag_ids: stored.tag_ids,
        notes: stored.notes,
        salt: stored.salt,
        created_at: stored.created_at,
        updated_at: stored.updated_at,
    }
}

fn check_unique(
    records: &[StoredRecord],
    site: &str,
    username: &str,
    exclude: Option<Uuid>,
) -> Result<()> {
    let collides = records
        .iter()
        .any(|r| Some(r.id) != exclude && r.same_account(site, username));

    if collides {
        return Err(PasswordManagerError::Duplicate(format!(
            "An entry for {} with username {} already exists",
            site, username
        )));
    }
    Ok(())
}

/// Credential records owned by one user
pub struct RecordStore<'a> {
    repo: &'a dyn Repository,
    user_id: Uuid,
}

impl<'a> RecordStore<'a> {
    pub fn new(repo: &'a dyn Repository, user_id: Uuid) -> Self {
        Self { repo, user_id }
    }

    /// Owner of every record this store touches
    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    /// All of the user's records in plaintext, sorted by site (case-insensitive)
    pub fn list(&self) -> Result<Vec<CredentialRecord>> {
        let stored = self.repo.get_records(self.user_id)?;

        // Reads never provision a key.
        let key = self
            .repo
            .get_user_key(self.user_id)?
            .filter(|k| !k.is_empty());
        if key.is_none() && stored.iter().any(|r| r.salt.is_some()) {
            warn!(
                "User {} has salted records but no key; returning them as stored",
                self.user_id
            );
        }

        let mut records: Vec<CredentialRecord> = stored
            .into_iter()
            .map(|r| match key.as_deref() {
                Some(key) => reveal_record(r, key),
                None => stored_as_is(r),
            })
            .collect();
        records.sort_by(|a, b| a.site.to_lowercase().cmp(&b.site.to_lowercase()));

        debug!("Listed {} record(s) for user {}", records.len(), self.user_id);
        Ok(records)
    }

    /// Get a single record in plaintext
    pub fn get(&self, record_id: Uuid) -> Result<CredentialRecord> {
        self.list()?
            .into_iter()
            .find(|r| r.id == record_id)
            .ok_or_else(|| PasswordManagerError::NotFound(format!("Entry {}", record_id)))
    }

    /// Add a new record
    pub fn create(&self, input: RecordInput) -> Result<CredentialRecord> {
        let input = input.clean()?;
        let mut stored = self.repo.get_records(self.user_id)?;
        check_unique(&stored, &input.site, &input.username, None)?;

        let key = ensure_user_key(self.repo, self.user_id)?;
        let record = conceal(Uuid::new_v4(), self.user_id, input, &key, Utc::now());

        stored.push(record.clone());
        self.repo.put_records(self.user_id, &stored)?;

        info!("Created credential {} for {}", record.id, record.site);
        Ok(reveal_record(record, &key))
    }

    /// Replace the fields of an existing record.
    ///
    /// Every update draws a new salt, even when the plaintext is unchanged.
    pub fn update(&self, record_id: Uuid, input: RecordInput) -> Result<CredentialRecord> {
        let input = input.clean()?;
        let mut stored = self.repo.get_records(self.user_id)?;

        let index = stored
            .iter()
            .position(|r| r.id == record_id)
            .ok_or_else(|| PasswordManagerError::NotFound(format!("Entry {}", record_id)))?;
        check_unique(&stored, &input.site, &input.username, Some(record_id))?;

        let key = ensure_user_key(self.repo, self.user_id)?;
        let record = conceal(record_id, self.user_id, input, &key, stored[index].created_at);

        stored[index] = record.clone();
        self.repo.put_records(self.user_id, &stored)?;

        info!("Modified credential {}", record_id);
        Ok(reveal_record(record, &key))
    }

    /// Remove a record. Unknown ids are ignored.
    pub fn delete(&self, record_id: Uuid) -> Result<()> {
        let mut stored = self.repo.get_records(self.user_id)?;
        let before = stored.len();
        stored.retain(|r| r.id != record_id);

        if stored.len() == before {
            debug!("Delete of unknown credential {} ignored", record_id);
            return Ok(());
        }

        self.repo.put_records(self.user_id, &stored)?;
        info!("Deleted credential {}", record_id);
        Ok(())
    }

    /// Import parsed CSV rows, creating any tags they name.
    ///
    /// Fails with [`PasswordManagerError::NoValidEntries`] and writes nothing
    /// when no row is usable. Tags created for the import are removed again
    /// if the records cannot be written.
    pub fn import(&self, rows: &[ImportRow]) -> Result<ImportSummary> {
        let mut stored = self.repo.get_records(self.user_id)?;
        let mut tags = self.repo.get_tags(self.user_id)?;
        let key = ensure_user_key(self.repo, self.user_id)?;

        let prepared = prepare_import(rows, &tags, &stored, self.user_id, &key);
        if prepared.records.is_empty() {
            return Err(PasswordManagerError::NoValidEntries);
        }

        let summary = ImportSummary {
            imported: prepared.records.len(),
            skipped: prepared.skipped,
            created_tags: prepared.new_tags.len(),
        };

        let previous_tags = tags.clone();
        if !prepared.new_tags.is_empty() {
            tags.extend(prepared.new_tags);
            self.repo.put_tags(self.user_id, &tags)?;
        }
        stored.extend(prepared.records);
        if let Err(e) = self.repo.put_records(self.user_id, &stored) {
            if summary.created_tags > 0 {
                if let Err(rollback) = self.repo.put_tags(self.user_id, &previous_tags) {
                    warn!("Could not remove tags from failed import: {}", rollback);
                }
            }
            return Err(e);
        }

        info!(
            "Imported {} credential(s), skipped {}, created {} tag(s)",
            summary.imported, summary.skipped, summary.created_tags
        );
        Ok(summary)
    }
}
