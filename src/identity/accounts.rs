//! Administrative account helpers. Plaintext passwords stop here: they are
//! hashed before anything is handed to the user store.

use thiserror::Error;
use tracing::info;

use super::role::UserRole;
use crate::crypto::{CryptoError, CryptoService};
use crate::storage::{NewUser, StoreError, User, UserService};

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub fn create_account(
    users: &dyn UserService,
    crypto: &CryptoService,
    username: &str,
    password: &str,
    role: UserRole,
) -> Result<User, AccountError> {
    if username.trim().is_empty() {
        return Err(AccountError::Validation("username is required".into()));
    }
    if password.is_empty() {
        return Err(AccountError::Validation("password is required".into()));
    }
    let password_hash = crypto.hash(password)?;
    let user = users.create_user(NewUser { username: username.to_string(), password_hash, role })?;
    Ok(user)
}

/// First-run bootstrap: create `username` as an admin unless some admin
/// already exists. Returns the created user, if any.
pub fn ensure_default_admin(
    users: &dyn UserService,
    crypto: &CryptoService,
    username: &str,
    password: &str,
) -> Result<Option<User>, AccountError> {
    if !users.users_by_role(UserRole::Admin)?.is_empty() {
        return Ok(None);
    }
    let user = create_account(users, crypto, username, password, UserRole::Admin)?;
    info!(target: "startup", user_id = %user.id, username = %user.username, "created bootstrap admin");
    Ok(Some(user))
}
