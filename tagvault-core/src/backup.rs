//! Periodic backup of a user's data to a secondary repository, and restore
//! of whatever the primary is missing

use crate::{repository::Repository, session::SharedSession, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Counts from one snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SnapshotSummary {
    pub users: usize,
    pub records: usize,
    pub tags: usize,
}

/// What [`restore_missing`] put back
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RestoreSummary {
    pub users: usize,
    pub records: usize,
    pub tags: usize,
    pub key_restored: bool,
}

impl RestoreSummary {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Copy the user table and `user_id`'s records, tags and key to `secondary`
pub fn snapshot_user(
    primary: &dyn Repository,
    secondary: &dyn Repository,
    user_id: Uuid,
) -> Result<SnapshotSummary> {
    let users = primary.get_users()?;
    let records = primary.get_records(user_id)?;
    let tags = primary.get_tags(user_id)?;
    let key = primary.get_user_key(user_id)?;

    secondary.put_users(&users)?;
    secondary.put_tags(user_id, &tags)?;
    secondary.put_records(user_id, &records)?;
    if let Some(key) = key.filter(|k| !k.is_empty()) {
        secondary.put_user_key(user_id, &key)?;
    }

    debug!(
        "Backed up {} record(s) and {} tag(s) for user {}",
        records.len(),
        tags.len(),
        user_id
    );
    Ok(SnapshotSummary {
        users: users.len(),
        records: records.len(),
        tags: tags.len(),
    })
}

/// Fill gaps in `primary` from `backup`.
///
/// Only empty sets are restored: the user table when it has no rows,
/// `user_id`'s records or tags when the user has none, and the key when
/// the user has none. Existing data is never overwritten.
pub fn restore_missing(
    primary: &dyn Repository,
    backup: &dyn Repository,
    user_id: Uuid,
) -> Result<RestoreSummary> {
    let mut summary = RestoreSummary::default();

    if primary.get_users()?.is_empty() {
        let users = backup.get_users()?;
        if !users.is_empty() {
            primary.put_users(&users)?;
            summary.users = users.len();
        }
    }

    let Some(backup_user) = backup.get_user(user_id)? else {
        return Ok(summary);
    };
    if primary.get_user(user_id)?.is_none() {
        return Ok(summary);
    }

    if primary.get_tags(user_id)?.is_empty() {
        let tags = backup.get_tags(user_id)?;
        if !tags.is_empty() {
            primary.put_tags(user_id, &tags)?;
            summary.tags = tags.len();
        }
    }

    if primary.get_records(user_id)?.is_empty() {
        let records = backup.get_records(user_id)?;
        if !records.is_empty() {
            primary.put_records(user_id, &records)?;
            summary.records = records.len();
        }
    }

    let has_key = primary
        .get_user_key(user_id)?
        .is_some_and(|k| !k.is_empty());
    if let Some(key) = backup_user.encryption_key.filter(|k| !k.is_empty()) {
        if !has_key {
            primary.put_user_key(user_id, &key)?;
            summary.key_restored = true;
        }
    }

    if !summary.is_empty() {
        info!("Restored missing data from backup: {:?}", summary);
    }
    Ok(summary)
}

/// Snapshot the logged-in user's data every `period`.
///
/// Ticks without a session are skipped; failures are logged and retried on
/// the next tick.
pub fn spawn_backup_task(
    primary: Arc<dyn Repository>,
    secondary: Arc<dyn Repository>,
    session: SharedSession,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = interval(period);
        timer.tick().await;

        loop {
            timer.tick().await;

            let user_id = match session.lock() {
                Ok(guard) => guard.as_ref().map(|s| s.user_id()),
                Err(poisoned) => poisoned.into_inner().as_ref().map(|s| s.user_id()),
            };
            let Some(user_id) = user_id else {
                continue;
            };

            let primary = Arc::clone(&primary);
            let secondary = Arc::clone(&secondary);
            let outcome = tokio::task::spawn_blocking(move || {
                snapshot_user(primary.as_ref(), secondary.as_ref(), user_id)
            })
            .await;

            match outcome {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => error!("Backup failed: {}", e),
                Err(e) => error!("Backup task panicked: {}", e),
            }
        }
    })
}
