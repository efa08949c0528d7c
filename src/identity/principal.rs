use serde::{Deserialize, Serialize};

use super::role::UserRole;
use crate::storage::{User, UserId};

/// Authenticated claims carried inside a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenData {
    pub id: UserId,
    pub username: String,
    pub role: UserRole,
}

impl From<&User> for TokenData {
    fn from(user: &User) -> Self {
        Self { id: user.id, username: user.username.clone(), role: user.role }
    }
}
