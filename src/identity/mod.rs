//! Identity: roles, session tokens, login and authorization policy.
//! Keep the public surface thin and split implementation across sub-modules.

mod role;
mod principal;
mod session;
mod provider;
mod authorizer;
pub mod accounts;

pub use role::{RoleError, UserRole};
pub use principal::TokenData;
pub use session::{JwtService, TokenError, VerifiedToken, DEFAULT_TOKEN_TTL_SECS, MAX_TOKEN_TTL_SECS, MIN_SECRET_LEN};
pub use provider::{FrontendAuthManager, FrontendAuthPayload, FrontendAuthResponse, LocalAuthManager, LoginError};
pub use authorizer::{AccessPolicy, Denied, Operation, PolicyError};
pub use accounts::{create_account, ensure_default_admin, AccountError};
