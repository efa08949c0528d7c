//! Unified application error model used at the HTTP boundary.
//! Component errors map into `AppError` here so that every surface reports
//! failures the same way and authentication details never leak.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use crate::dispatch::DispatchError;
use crate::identity::{AccountError, LoginError};
use crate::storage::StoreError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    UserInput { code: String, message: String },
    Auth { code: String, message: String },
    Forbidden { code: String, message: String },
    NotFound { code: String, message: String },
    Conflict { code: String, message: String },
    Unavailable { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::UserInput { code, .. }
            | AppError::Auth { code, .. }
            | AppError::Forbidden { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::Conflict { code, .. }
            | AppError::Unavailable { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::UserInput { message, .. }
            | AppError::Auth { message, .. }
            | AppError::Forbidden { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::Conflict { message, .. }
            | AppError::Unavailable { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn user<S: Into<String>>(code: S, msg: S) -> Self { AppError::UserInput { code: code.into(), message: msg.into() } }
    pub fn auth<S: Into<String>>(code: S, msg: S) -> Self { AppError::Auth { code: code.into(), message: msg.into() } }
    pub fn forbidden<S: Into<String>>(code: S, msg: S) -> Self { AppError::Forbidden { code: code.into(), message: msg.into() } }
    pub fn not_found<S: Into<String>>(code: S, msg: S) -> Self { AppError::NotFound { code: code.into(), message: msg.into() } }
    pub fn conflict<S: Into<String>>(code: S, msg: S) -> Self { AppError::Conflict { code: code.into(), message: msg.into() } }
    pub fn unavailable<S: Into<String>>(code: S, msg: S) -> Self { AppError::Unavailable { code: code.into(), message: msg.into() } }
    pub fn internal<S: Into<String>>(code: S, msg: S) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::UserInput { .. } => 400,
            AppError::Auth { .. } => 401,
            AppError::Forbidden { .. } => 403,
            AppError::NotFound { .. } => 404,
            AppError::Conflict { .. } => 409,
            AppError::Unavailable { .. } => 503,
            AppError::Internal { .. } => 500,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => AppError::not_found("user_not_found".into(), err.to_string()),
            StoreError::DuplicateUsername(_) => AppError::conflict("duplicate_username".into(), err.to_string()),
            StoreError::Validation(_) => AppError::user("invalid_user".into(), err.to_string()),
            StoreError::Closed => AppError::unavailable("store_closed".into(), err.to_string()),
            // Storage internals stay in the server logs.
            _ => AppError::internal("storage_error", "user storage failed"),
        }
    }
}

impl From<LoginError> for AppError {
    fn from(err: LoginError) -> Self {
        match err {
            LoginError::Validation(msg) => AppError::user("invalid_login".into(), msg),
            LoginError::Authentication => AppError::auth("invalid_credentials", "invalid credentials"),
            LoginError::Storage(e) => match e {
                StoreError::Closed => AppError::from(e),
                _ => AppError::internal("storage_error", "user storage failed"),
            },
            LoginError::Token(_) => AppError::internal("token_error", "could not issue token"),
        }
    }
}

impl From<AccountError> for AppError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::Validation(msg) => AppError::user("invalid_user".into(), msg),
            AccountError::Store(e) => AppError::from(e),
            AccountError::Crypto(_) => AppError::internal("crypto_error", "could not hash password"),
        }
    }
}

impl From<DispatchError> for AppError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Authentication => AppError::auth("authentication_required", "authentication required"),
            DispatchError::Authorization(d) => AppError::forbidden("forbidden".into(), d.to_string()),
            DispatchError::UnknownKind(_) => AppError::not_found("unknown_kind".into(), err.to_string()),
            DispatchError::Validation(msg) => AppError::user("invalid_request".into(), msg),
            DispatchError::Transport(_) => AppError::unavailable("transport_error", "cluster request failed"),
        }
    }
}
