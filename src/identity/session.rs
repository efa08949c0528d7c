//! Signed session tokens.
//!
//! Tokens are HS256 JWTs signed with a secret that is fixed for the life of
//! the process. The role claim is authoritative until the token expires;
//! there is no revocation list, so keep the TTL short and use `refresh`.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::principal::TokenData;
use super::role::UserRole;
use crate::storage::UserId;

pub const MIN_SECRET_LEN: usize = 32;
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 15 * 60;
/// Upper bound on token lifetime: one year.
pub const MAX_TOKEN_TTL_SECS: i64 = 365 * 24 * 60 * 60;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token signature is invalid")]
    InvalidSignature,
    #[error("token has expired")]
    Expired,
    #[error("token is malformed: {0}")]
    Malformed(String),
    #[error("signing secret must be at least {MIN_SECRET_LEN} bytes, got {0}")]
    WeakSecret(usize),
    #[error("token lifetime must be between 1 and {MAX_TOKEN_TTL_SECS} seconds")]
    InvalidTtl,
    #[error("token encoding failed: {0}")]
    Encode(String),
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    name: String,
    role: UserRole,
    iat: i64,
    exp: i64,
    jti: String,
}

/// Claims recovered from a verified token, with the validity window that was
/// stamped on it at issue time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedToken {
    pub data: TokenData,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

pub struct JwtService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl fmt::Debug for JwtService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtService").field("ttl_secs", &self.ttl.num_seconds()).finish_non_exhaustive()
    }
}

impl JwtService {
    pub fn new(secret: &[u8], ttl: Duration) -> Result<Self, TokenError> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(TokenError::WeakSecret(secret.len()));
        }
        if ttl <= Duration::zero() || ttl > Duration::seconds(MAX_TOKEN_TTL_SECS) {
            return Err(TokenError::InvalidTtl);
        }
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        // Expiry is checked against the caller-supplied clock in `decrypt_at`.
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp", "sub"]);
        Ok(Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            ttl,
        })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn generate(&self, data: &TokenData) -> Result<String, TokenError> {
        self.generate_at(data, Utc::now())
    }

    pub fn generate_at(&self, data: &TokenData, now: DateTime<Utc>) -> Result<String, TokenError> {
        let exp = now.checked_add_signed(self.ttl).ok_or(TokenError::InvalidTtl)?;
        let claims = Claims {
            sub: data.id.to_string(),
            name: data.username.clone(),
            role: data.role,
            iat: now.timestamp(),
            exp: exp.timestamp(),
            jti: uuid::Uuid::new_v4().to_string(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TokenError::Encode(e.to_string()))
    }

    pub fn decrypt(&self, token: &str) -> Result<VerifiedToken, TokenError> {
        self.decrypt_at(token, Utc::now())
    }

    pub fn decrypt_at(&self, token: &str, now: DateTime<Utc>) -> Result<VerifiedToken, TokenError> {
        let claims = jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|d| d.claims)
            .map_err(|e| {
                debug!(target: "auth", error = %e, "token rejected");
                match e.kind() {
                    ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => TokenError::InvalidSignature,
                    ErrorKind::ExpiredSignature => TokenError::Expired,
                    _ => TokenError::Malformed(e.to_string()),
                }
            })?;
        if now.timestamp() >= claims.exp {
            return Err(TokenError::Expired);
        }
        let id = claims
            .sub
            .parse::<u64>()
            .map(UserId)
            .map_err(|_| TokenError::Malformed("subject is not a user id".into()))?;
        let issued_at = DateTime::from_timestamp(claims.iat, 0)
            .ok_or_else(|| TokenError::Malformed("iat out of range".into()))?;
        let expires_at = DateTime::from_timestamp(claims.exp, 0)
            .ok_or_else(|| TokenError::Malformed("exp out of range".into()))?;
        Ok(VerifiedToken {
            data: TokenData { id, username: claims.name, role: claims.role },
            issued_at,
            expires_at,
        })
    }

    /// Re-issue a still-valid token with a fresh expiry.
    pub fn refresh(&self, token: &str) -> Result<String, TokenError> {
        self.refresh_at(token, Utc::now())
    }

    pub fn refresh_at(&self, token: &str, now: DateTime<Utc>) -> Result<String, TokenError> {
        let verified = self.decrypt_at(token, now)?;
        self.generate_at(&verified.data, now)
    }
}

#[cfg(test)]
pub(crate) const TEST_SECRET: &[u8] = b"0123456789abcdef0123456789abcdef-test";
