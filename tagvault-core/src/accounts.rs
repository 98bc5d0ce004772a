//! User accounts: first-run administrator, login, password changes and
//! administrator-only user management

use crate::{
    context::AppContext,
    crypto::{hash_secret, verify_secret},
    database::User,
    repository::Repository,
    PasswordManagerError, Result,
};
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

pub const DEFAULT_ADMIN_USERNAME: &str = "super";
pub const DEFAULT_ADMIN_PASSWORD: &str = "abcd1234";
pub const MIN_PASSWORD_CHARS: usize = 6;

fn check_new_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(PasswordManagerError::Validation(format!(
            "New password must be at least {} characters long",
            MIN_PASSWORD_CHARS
        )));
    }
    Ok(())
}

/// Create the first administrator when no users exist yet.
///
/// Returns the new user, or `None` when accounts already exist.
pub fn seed_default_admin(
    repo: &dyn Repository,
    username: &str,
    password: &str,
) -> Result<Option<User>> {
    let users = repo.get_users()?;
    if !users.is_empty() {
        return Ok(None);
    }

    let admin = User {
        id: Uuid::new_v4(),
        username: username.trim().to_string(),
        password_hash: hash_secret(password)?,
        is_admin: true,
        created_at: Utc::now(),
        last_login: None,
        encryption_key: None,
    };
    repo.put_users(&[admin.clone()])?;

    warn!(
        "Created default administrator '{}'; change its password",
        admin.username
    );
    Ok(Some(admin))
}

/// Check a username and password, stamping the login time on success
pub fn authenticate(repo: &dyn Repository, username: &str, password: &str) -> Result<User> {
    let mut users = repo.get_users()?;
    let Some(index) = users.iter().position(|u| u.username == username.trim()) else {
        warn!("Login attempt for unknown user");
        return Err(PasswordManagerError::InvalidCredentials);
    };

    if !verify_secret(password, &users[index].password_hash)? {
        warn!("Failed login for {}", users[index].username);
        return Err(PasswordManagerError::InvalidCredentials);
    }

    users[index].last_login = Some(Utc::now());
    let user = users[index].clone();
    repo.put_users(&users)?;
    Ok(user)
}

/// Change the logged-in user's password
pub fn change_password(ctx: &AppContext, current: &str, new: &str) -> Result<()> {
    let user = ctx.current_user()?;
    if current.is_empty() {
        return Err(PasswordManagerError::Validation(
            "Current password is required".to_string(),
        ));
    }
    check_new_password(new)?;
    if !verify_secret(current, &user.password_hash)? {
        return Err(PasswordManagerError::InvalidCredentials);
    }

    set_password_hash(ctx.repository(), user.id, hash_secret(new)?)?;
    info!("Password changed for {}", user.username);
    Ok(())
}

fn set_password_hash(repo: &dyn Repository, user_id: Uuid, hash: String) -> Result<()> {
    let mut users = repo.get_users()?;
    let user = users
        .iter_mut()
        .find(|u| u.id == user_id)
        .ok_or_else(|| PasswordManagerError::NotFound(format!("User {}", user_id)))?;
    user.password_hash = hash;
    repo.put_users(&users)
}

fn require_admin(ctx: &AppContext) -> Result<User> {
    let user = ctx.current_user()?;
    if !user.is_admin {
        return Err(PasswordManagerError::PermissionDenied(
            "Only administrators can manage users".to_string(),
        ));
    }
    Ok(user)
}

/// All users sorted by username. Administrators only.
pub fn list_users(ctx: &AppContext) -> Result<Vec<User>> {
    require_admin(ctx)?;
    let mut users = ctx.repository().get_users()?;
    users.sort_by(|a, b| a.username.cmp(&b.username));
    Ok(users)
}

/// Look up a user by exact username. Administrators only.
pub fn find_user(ctx: &AppContext, username: &str) -> Result<User> {
    require_admin(ctx)?;
    ctx.repository()
        .get_users()?
        .into_iter()
        .find(|u| u.username == username.trim())
        .ok_or_else(|| PasswordManagerError::NotFound(format!("User {}", username.trim())))
}

/// Add a user. Administrators only.
pub fn create_user(ctx: &AppContext, username: &str, password: &str, is_admin: bool) -> Result<User> {
    require_admin(ctx)?;

    let username = username.trim();
    if username.is_empty() || password.trim().is_empty() {
        return Err(PasswordManagerError::Validation(
            "Username and password are required".to_string(),
        ));
    }

    let repo = ctx.repository();
    let mut users = repo.get_users()?;
    if users.iter().any(|u| u.username == username) {
        return Err(PasswordManagerError::Duplicate(format!(
            "Username {} already exists",
            username
        )));
    }

    let user = User {
        id: Uuid::new_v4(),
        username: username.to_string(),
        password_hash: hash_secret(password)?,
        is_admin,
        created_at: Utc::now(),
        last_login: None,
        encryption_key: None,
    };
    users.push(user.clone());
    repo.put_users(&users)?;

    info!("Created user {}", user.username);
    Ok(user)
}

/// Remove a user together with their records and tags.
/// Administrators only; nobody can delete their own account.
pub fn delete_user(ctx: &AppContext, user_id: Uuid) -> Result<()> {
    let admin = require_admin(ctx)?;
    if admin.id == user_id {
        return Err(PasswordManagerError::PermissionDenied(
            "You cannot delete your own account".to_string(),
        ));
    }

    let repo = ctx.repository();
    let mut users = repo.get_users()?;
    let before = users.len();
    users.retain(|u| u.id != user_id);
    if users.len() == before {
        return Ok(());
    }

    repo.put_records(user_id, &[])?;
    repo.put_tags(user_id, &[])?;
    repo.put_users(&users)?;

    info!("Deleted user {}", user_id);
    Ok(())
}

/// Grant or revoke administrator rights. Administrators only; nobody can
/// change their own role.
pub fn set_admin(ctx: &AppContext, user_id: Uuid, is_admin: bool) -> Result<User> {
    let admin = require_admin(ctx)?;
    if admin.id == user_id {
        return Err(PasswordManagerError::PermissionDenied(
            "You cannot change your own role".to_string(),
        ));
    }

    let repo = ctx.repository();
    let mut users = repo.get_users()?;
    let user = users
        .iter_mut()
        .find(|u| u.id == user_id)
        .ok_or_else(|| PasswordManagerError::NotFound(format!("User {}", user_id)))?;
    user.is_admin = is_admin;
    let updated = user.clone();
    repo.put_users(&users)?;

    info!("User {} admin={}", updated.username, is_admin);
    Ok(updated)
}

/// Set another user's password without knowing the old one. Administrators only.
pub fn reset_password(ctx: &AppContext, user_id: Uuid, new: &str) -> Result<()> {
    require_admin(ctx)?;
    check_new_password(new)?;
    set_password_hash(ctx.repository(), user_id, hash_secret(new)?)?;
    info!("Password reset for user {}", user_id);
    Ok(())
}
