//! Application context: repository, configuration and the current session

use crate::{
    accounts,
    config::Config,
    database::User,
    records::RecordStore,
    repository::Repository,
    session::{expire_if_idle, Session, SharedSession},
    tags::TagStore,
    PasswordManagerError, Result,
};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;
use uuid::Uuid;

pub struct AppContext {
    repo: Arc<dyn Repository>,
    config: Config,
    session: SharedSession,
}

impl AppContext {
    pub fn new(repo: Arc<dyn Repository>, config: Config) -> Self {
        Self {
            repo,
            config,
            session: Arc::new(Mutex::new(None)),
        }
    }

    /// Open the configured storage backend
    pub fn open(config: Config) -> Result<Self> {
        let repo = config.storage.open()?;
        Ok(Self::new(repo, config))
    }

    pub fn repository(&self) -> &dyn Repository {
        self.repo.as_ref()
    }

    pub fn repository_handle(&self) -> Arc<dyn Repository> {
        Arc::clone(&self.repo)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Session slot shared with background tasks
    pub fn session_handle(&self) -> SharedSession {
        Arc::clone(&self.session)
    }

    fn lock_session(&self) -> MutexGuard<'_, Option<Session>> {
        match self.session.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Verify credentials and start a session, replacing any current one
    pub fn login(&self, username: &str, password: &str) -> Result<User> {
        let user = accounts::authenticate(self.repository(), username, password)?;
        *self.lock_session() = Some(Session::new(
            user.clone(),
            self.config.session.idle_timeout(),
        ));
        info!("User {} logged in", user.username);
        Ok(user)
    }

    pub fn logout(&self) {
        if let Some(session) = self.lock_session().take() {
            info!("User {} logged out", session.user().username);
        }
    }

    pub fn is_logged_in(&self) -> bool {
        self.lock_session().is_some()
    }

    /// End the session if it has been idle past the timeout.
    /// Returns true when this call logged the user out.
    pub fn check_idle(&self) -> bool {
        expire_if_idle(&self.session)
    }

    pub fn record_activity(&self) {
        if let Some(session) = self.lock_session().as_mut() {
            session.record_activity();
        }
    }

    fn session_user_id(&self) -> Result<Uuid> {
        self.check_idle();
        self.lock_session()
            .as_ref()
            .map(Session::user_id)
            .ok_or(PasswordManagerError::NotAuthenticated)
    }

    /// The logged-in user as currently stored.
    ///
    /// A session whose user has since been deleted is ended.
    pub fn current_user(&self) -> Result<User> {
        let user_id = self.session_user_id()?;
        match self.repo.get_user(user_id)? {
            Some(user) => {
                if let Some(session) = self.lock_session().as_mut() {
                    session.set_user(user.clone());
                }
                Ok(user)
            }
            None => {
                self.logout();
                Err(PasswordManagerError::NotAuthenticated)
            }
        }
    }

    /// Record store for the logged-in user. Counts as activity.
    pub fn records(&self) -> Result<RecordStore<'_>> {
        let user_id = self.session_user_id()?;
        self.record_activity();
        Ok(RecordStore::new(self.repository(), user_id))
    }

    /// Tag store for the logged-in user. Counts as activity.
    pub fn tags(&self) -> Result<TagStore<'_>> {
        let user_id = self.session_user_id()?;
        self.record_activity();
        Ok(TagStore::new(self.repository(), user_id))
    }
}
