//!
//! kubegate user storage
//! ---------------------
//! The `DataStore` trait is the boundary to whatever persists user accounts.
//! It exposes a scoped lifecycle (`open` / `init` / `close`) and hands out a
//! `UserService` for record-level operations. Only password digests cross this
//! boundary; `NewUser` has no field that could carry a plaintext password.
//!
//! `LocalDataStore` is the bundled implementation: an in-process table that can
//! optionally be persisted to a JSON document on disk.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identity::UserRole;

mod local;
pub use local::LocalDataStore;

/// Stable user identifier. Ids are assigned by the store and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub password_hash: String,
    pub role: UserRole,
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("password_hash", &"<redacted>")
            .field("role", &self.role)
            .finish()
    }
}

/// Record contents supplied on create and on full replace.
#[derive(Clone, PartialEq, Eq)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub role: UserRole,
}

impl fmt::Debug for NewUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewUser")
            .field("username", &self.username)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("user {0} not found")]
    NotFound(String),
    #[error("username `{0}` already exists")]
    DuplicateUsername(String),
    #[error("invalid user record: {0}")]
    Validation(String),
    #[error("data store is not open")]
    Closed,
    #[error("data store is corrupt: {0}")]
    Corrupt(String),
    #[error("storage i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Record-level access to user accounts. Any call may block on storage I/O.
///
/// `users` and `users_by_role` return records in no particular order.
pub trait UserService: Send + Sync {
    fn user(&self, id: UserId) -> StoreResult<User>;
    fn user_by_username(&self, username: &str) -> StoreResult<User>;
    fn users(&self) -> StoreResult<Vec<User>>;
    fn users_by_role(&self, role: UserRole) -> StoreResult<Vec<User>>;
    fn create_user(&self, user: NewUser) -> StoreResult<User>;
    fn update_user(&self, id: UserId, user: NewUser) -> StoreResult<User>;
    fn delete_user(&self, id: UserId) -> StoreResult<()>;
}

/// Connection and schema lifecycle of a user store.
///
/// `open` establishes the live connection; `init` bootstraps the schema and is
/// safe to call on every start. Pair every successful `open` with `close`.
pub trait DataStore: Send + Sync {
    fn open(&self) -> StoreResult<()>;
    fn init(&self) -> StoreResult<()>;
    fn close(&self) -> StoreResult<()>;
    fn user_service(&self) -> Arc<dyn UserService>;
}

/// Shared checks applied to every record before it is written.
pub(crate) fn validate_new_user(user: &NewUser) -> StoreResult<()> {
    if user.username.trim().is_empty() {
        return Err(StoreError::Validation("username must not be empty".into()));
    }
    if user.username.trim() != user.username {
        return Err(StoreError::Validation("username must not have surrounding whitespace".into()));
    }
    crate::crypto::CryptoService::check_digest(&user.password_hash)
        .map_err(|_| StoreError::Validation("password_hash is not a PHC digest".into()))?;
    Ok(())
}
