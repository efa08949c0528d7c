use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use super::principal::TokenData;
use super::session::{JwtService, TokenError};
use crate::crypto::{CryptoError, CryptoService};
use crate::storage::{StoreError, UserService};

/// Login request body. Both fields are required; a missing field reads as
/// empty so that it is reported as a validation error by `login`.
#[derive(Clone, Deserialize)]
pub struct FrontendAuthPayload {
    #[serde(alias = "Username", default)]
    pub username: String,
    #[serde(alias = "Password", default)]
    pub password: String,
}

impl std::fmt::Debug for FrontendAuthPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrontendAuthPayload").field("username", &self.username).finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontendAuthResponse {
    #[serde(rename = "jwtToken")]
    pub jwt_token: String,
}

#[derive(Debug, Error)]
pub enum LoginError {
    #[error("{0}")]
    Validation(String),
    /// Unknown user and wrong password look the same from outside.
    #[error("invalid credentials")]
    Authentication,
    #[error("user storage failed: {0}")]
    Storage(#[from] StoreError),
    #[error("token issue failed: {0}")]
    Token(TokenError),
}

pub trait FrontendAuthManager: Send + Sync {
    fn login(&self, payload: &FrontendAuthPayload) -> Result<FrontendAuthResponse, LoginError>;
    fn refresh(&self, token: &str) -> Result<FrontendAuthResponse, LoginError>;
}

/// Password login against the configured user store.
pub struct LocalAuthManager {
    users: Arc<dyn UserService>,
    crypto: Arc<CryptoService>,
    jwt: Arc<JwtService>,
    /// Digest of a random secret, verified when the username is unknown so
    /// that both rejection paths cost one argon2 run.
    decoy_digest: String,
}

impl LocalAuthManager {
    pub fn new(
        users: Arc<dyn UserService>,
        crypto: Arc<CryptoService>,
        jwt: Arc<JwtService>,
    ) -> Result<Self, CryptoError> {
        let decoy_digest = crypto.hash(&uuid::Uuid::new_v4().to_string())?;
        Ok(Self { users, crypto, jwt, decoy_digest })
    }
}

impl FrontendAuthManager for LocalAuthManager {
    fn login(&self, payload: &FrontendAuthPayload) -> Result<FrontendAuthResponse, LoginError> {
        if payload.username.trim().is_empty() {
            return Err(LoginError::Validation("username is required".into()));
        }
        if payload.password.is_empty() {
            return Err(LoginError::Validation("password is required".into()));
        }

        let user = match self.users.user_by_username(&payload.username) {
            Ok(u) => u,
            Err(e) if e.is_not_found() => {
                let _ = self.crypto.verify(&self.decoy_digest, &payload.password);
                info!(target: "auth", username = %payload.username, "login rejected: unknown user");
                return Err(LoginError::Authentication);
            }
            Err(e) => return Err(LoginError::Storage(e)),
        };

        match self.crypto.verify(&user.password_hash, &payload.password) {
            Ok(()) => {}
            Err(CryptoError::Mismatch) => {
                info!(target: "auth", username = %user.username, "login rejected: bad password");
                return Err(LoginError::Authentication);
            }
            Err(e) => {
                error!(target: "auth", user_id = %user.id, error = %e, "stored password digest is unusable");
                return Err(LoginError::Authentication);
            }
        }

        let token = self.jwt.generate(&TokenData::from(&user)).map_err(LoginError::Token)?;
        info!(target: "auth", user_id = %user.id, username = %user.username, role = %user.role, "login ok");
        Ok(FrontendAuthResponse { jwt_token: token })
    }

    fn refresh(&self, token: &str) -> Result<FrontendAuthResponse, LoginError> {
        match self.jwt.refresh(token) {
            Ok(jwt_token) => Ok(FrontendAuthResponse { jwt_token }),
            Err(TokenError::Encode(e)) => Err(LoginError::Token(TokenError::Encode(e))),
            Err(e) => {
                warn!(target: "auth", error = %e, "token refresh rejected");
                Err(LoginError::Authentication)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::test_crypto;
    use crate::identity::session::TEST_SECRET;
    use crate::identity::UserRole;
    use crate::storage::{DataStore, LocalDataStore, NewUser};
    use chrono::Duration;

    fn setup() -> (LocalAuthManager, Arc<JwtService>, crate::storage::User) {
        let store = LocalDataStore::in_memory();
        store.open().unwrap();
        let users = store.user_service();
        let crypto = Arc::new(test_crypto());
        let alice = users
            .create_user(NewUser {
                username: "alice".into(),
                password_hash: crypto.hash("pw123").unwrap(),
                role: UserRole::NormalUser,
            })
            .unwrap();
        let jwt = Arc::new(JwtService::new(TEST_SECRET, Duration::minutes(15)).unwrap());
        (LocalAuthManager::new(users, crypto, Arc::clone(&jwt)).unwrap(), jwt, alice)
    }

    fn payload(u: &str, p: &str) -> FrontendAuthPayload {
        FrontendAuthPayload { username: u.into(), password: p.into() }
    }

    #[test]
    fn login_returns_token_for_stored_user() {
        let (mgr, jwt, alice) = setup();
        let resp = mgr.login(&payload("alice", "pw123")).unwrap();
        let v = jwt.decrypt(&resp.jwt_token).unwrap();
        assert_eq!(v.data, TokenData::from(&alice));
        assert_eq!(v.data.role, UserRole::NormalUser);
    }

    #[test]
    fn wrong_password_and_unknown_user_look_alike() {
        let (mgr, _, _) = setup();
        let a = mgr.login(&payload("alice", "wrong")).unwrap_err();
        let b = mgr.login(&payload("mallory", "pw123")).unwrap_err();
        assert!(matches!(a, LoginError::Authentication));
        assert!(matches!(b, LoginError::Authentication));
        assert_eq!(a.to_string(), b.to_string());
    }

    #[test]
    fn empty_fields_are_validation_errors() {
        let (mgr, _, _) = setup();
        assert!(matches!(mgr.login(&payload("", "pw123")), Err(LoginError::Validation(_))));
        assert!(matches!(mgr.login(&payload("alice", "")), Err(LoginError::Validation(_))));
        assert!(matches!(mgr.login(&payload("   ", "x")), Err(LoginError::Validation(_))));
    }

    #[test]
    fn refresh_round_trip() {
        let (mgr, jwt, alice) = setup();
        let resp = mgr.login(&payload("alice", "pw123")).unwrap();
        let refreshed = mgr.refresh(&resp.jwt_token).unwrap();
        assert_eq!(jwt.decrypt(&refreshed.jwt_token).unwrap().data.id, alice.id);
        assert!(matches!(mgr.refresh("junk"), Err(LoginError::Authentication)));
    }

    #[test]
    fn payload_debug_hides_password() {
        let s = format!("{:?}", payload("alice", "pw123"));
        assert!(!s.contains("pw123"));
    }

    #[test]
    fn response_uses_wire_name() {
        let r = FrontendAuthResponse { jwt_token: "t".into() };
        assert_eq!(serde_json::to_value(&r).unwrap(), serde_json::json!({"jwtToken": "t"}));
    }
}
