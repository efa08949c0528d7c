use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Role carried by a user record and by every session token.
///
/// Privilege forms a total order: `Admin > NormalUser`. On the wire and on
/// disk a role is an integer (`1` admin, `2` normal user). `0` is reserved as
/// the "unset" value and is refused by every decoder, so no code path can
/// hold an unset role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum UserRole {
    Admin,
    NormalUser,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoleError {
    #[error("role is unset")]
    Unset,
    #[error("unknown role `{0}`")]
    Unknown(String),
}

impl UserRole {
    pub const UNSET: u8 = 0;

    pub fn code(self) -> u8 {
        match self {
            UserRole::Admin => 1,
            UserRole::NormalUser => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::NormalUser => "normaluser",
        }
    }

    fn rank(self) -> u8 {
        match self {
            UserRole::Admin => 2,
            UserRole::NormalUser => 1,
        }
    }

    /// True when this role is at least as privileged as `required`.
    pub fn satisfies(self, required: UserRole) -> bool {
        self >= required
    }
}

impl PartialOrd for UserRole {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for UserRole {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl TryFrom<u8> for UserRole {
    type Error = RoleError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            UserRole::UNSET => Err(RoleError::Unset),
            1 => Ok(UserRole::Admin),
            2 => Ok(UserRole::NormalUser),
            other => Err(RoleError::Unknown(other.to_string())),
        }
    }
}

impl From<UserRole> for u8 {
    fn from(role: UserRole) -> u8 {
        role.code()
    }
}

impl FromStr for UserRole {
    type Err = RoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" | "adminrole" => Ok(UserRole::Admin),
            "normaluser" | "normaluserrole" | "user" => Ok(UserRole::NormalUser),
            "" | "unset" => Err(RoleError::Unset),
            _ => Err(RoleError::Unknown(s.to_string())),
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
