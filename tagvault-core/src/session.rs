//! Login session and idle timeout

use crate::database::User;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, warn};
use uuid::Uuid;

/// The logged-in user and when they were last active
#[derive(Debug)]
pub struct Session {
    user: User,
    last_activity: Instant,
    idle_timeout: Duration,
}

impl Session {
    pub fn new(user: User, idle_timeout: Duration) -> Self {
        Self {
            user,
            last_activity: Instant::now(),
            idle_timeout,
        }
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn user_id(&self) -> Uuid {
        self.user.id
    }

    pub(crate) fn set_user(&mut self, user: User) {
        self.user = user;
    }

    pub fn record_activity(&mut self) {
        self.last_activity = Instant::now();
    }

    /// True once more than the idle timeout has passed since the last activity
    pub fn is_idle(&self) -> bool {
        self.last_activity.elapsed() > self.idle_timeout
    }
}

/// Session slot shared between the context and the idle watch
pub type SharedSession = Arc<Mutex<Option<Session>>>;

/// End the session in `slot` if it has been idle too long.
/// Returns true when a session was ended.
pub fn expire_if_idle(slot: &SharedSession) -> bool {
    let mut guard = match slot.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };

    match guard.as_ref() {
        Some(session) if session.is_idle() => {
            warn!(
                "Logging out {} due to inactivity",
                session.user().username
            );
            *guard = None;
            true
        }
        _ => false,
    }
}

/// Periodically log out an idle session.
///
/// The first tick is skipped so a fresh session is never checked at time zero.
pub fn spawn_idle_watch(slot: SharedSession, check_interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = interval(check_interval);
        timer.tick().await;

        loop {
            timer.tick().await;
            if !expire_if_idle(&slot) {
                debug!("Idle check passed");
            }
        }
    })
}
