use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::role::{RoleError, UserRole};

/// Verb requested against a resource kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Get,
    List,
    Watch,
    Create,
    Update,
    Patch,
    Delete,
}

impl Operation {
    pub const ALL: [Operation; 7] = [
        Operation::Get,
        Operation::List,
        Operation::Watch,
        Operation::Create,
        Operation::Update,
        Operation::Patch,
        Operation::Delete,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Get => "get",
            Operation::List => "list",
            Operation::Watch => "watch",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Patch => "patch",
            Operation::Delete => "delete",
        }
    }

    pub fn is_read(self) -> bool {
        matches!(self, Operation::Get | Operation::List | Operation::Watch)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        Operation::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or(PolicyError::UnknownOperation(s))
    }
}

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("unknown operation `{0}`")]
    UnknownOperation(String),
    #[error("operation `{0}` is listed more than once")]
    DuplicateOperation(Operation),
    #[error("invalid role for `{operation}`: {source}")]
    Role { operation: String, source: RoleError },
    #[error("cannot read policy file: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse policy file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Returned when a role does not meet an operation's minimum.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("role `{role}` may not {operation}; requires `{required}`")]
pub struct Denied {
    pub role: UserRole,
    pub operation: Operation,
    pub required: UserRole,
}

/// Minimum role per operation.
///
/// The built-in table lets normal users read and reserves writes for admins.
/// A deployment can override individual rows from a JSON object such as
/// `{"create": "normaluser"}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPolicy {
    minimum: HashMap<Operation, UserRole>,
}

impl Default for AccessPolicy {
    fn default() -> Self {
        let minimum = Operation::ALL
            .into_iter()
            .map(|op| (op, if op.is_read() { UserRole::NormalUser } else { UserRole::Admin }))
            .collect();
        Self { minimum }
    }
}

impl AccessPolicy {
    pub fn required_role(&self, operation: Operation) -> UserRole {
        // Every operation is seeded in `default`, so a missing row would be a bug; fail closed.
        self.minimum.get(&operation).copied().unwrap_or(UserRole::Admin)
    }

    pub fn check(&self, role: UserRole, operation: Operation) -> Result<(), Denied> {
        let required = self.required_role(operation);
        if role.satisfies(required) {
            Ok(())
        } else {
            Err(Denied { role, operation, required })
        }
    }

    /// Apply overrides from a JSON object of `operation -> role name`.
    /// Operation names are case-insensitive, so `get` and `GET` collide.
    pub fn from_json(text: &str) -> Result<Self, PolicyError> {
        let raw: HashMap<String, String> = serde_json::from_str(text)?;
        let mut policy = Self::default();
        let mut seen = HashSet::new();
        for (op, role) in raw {
            let operation: Operation = op.parse()?;
            if !seen.insert(operation) {
                return Err(PolicyError::DuplicateOperation(operation));
            }
            let role = role
                .parse::<UserRole>()
                .map_err(|source| PolicyError::Role { operation: op.clone(), source })?;
            policy.minimum.insert(operation, role);
        }
        Ok(policy)
    }

    pub fn from_file(path: &Path) -> Result<Self, PolicyError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_reads_for_everyone_writes_for_admin() {
        let p = AccessPolicy::default();
        for op in Operation::ALL {
            assert!(p.check(UserRole::Admin, op).is_ok());
            assert_eq!(p.check(UserRole::NormalUser, op).is_ok(), op.is_read(), "{op}");
        }
        let denied = p.check(UserRole::NormalUser, Operation::Delete).unwrap_err();
        assert_eq!(denied.required, UserRole::Admin);
    }

    #[test]
    fn json_overrides_apply() {
        let p = AccessPolicy::from_json(r#"{"create": "normaluser", "watch": "Admin"}"#).unwrap();
        assert!(p.check(UserRole::NormalUser, Operation::Create).is_ok());
        assert!(p.check(UserRole::NormalUser, Operation::Watch).is_err());
        assert!(p.check(UserRole::NormalUser, Operation::Delete).is_err());
    }

    #[test]
    fn json_rejects_bad_rows() {
        assert!(matches!(AccessPolicy::from_json(r#"{"explode": "admin"}"#), Err(PolicyError::UnknownOperation(_))));
        assert!(matches!(AccessPolicy::from_json(r#"{"get": "root"}"#), Err(PolicyError::Role { .. })));
        assert!(matches!(
            AccessPolicy::from_json(r#"{"get": "unset"}"#),
            Err(PolicyError::Role { source: RoleError::Unset, .. })
        ));
        assert!(matches!(AccessPolicy::from_json("[]"), Err(PolicyError::Parse(_))));
    }

    #[test]
    fn same_operation_twice_is_rejected() {
        for _ in 0..20 {
            assert!(matches!(
                AccessPolicy::from_json(r#"{"get": "admin", "GET": "normaluser"}"#),
                Err(PolicyError::DuplicateOperation(Operation::Get))
            ));
        }
    }

    #[test]
    fn operation_parse() {
        assert_eq!("LIST".parse::<Operation>().unwrap(), Operation::List);
        assert!("scale".parse::<Operation>().is_err());
    }
}
