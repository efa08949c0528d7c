//! Runtime configuration read from `KUBEGATE_*` environment variables.
//! The binary layers command-line overrides on top of `Config::from_env`.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::crypto::HashParams;
use crate::identity::{DEFAULT_TOKEN_TTL_SECS, MAX_TOKEN_TTL_SECS};

pub const ENV_HTTP_PORT: &str = "KUBEGATE_HTTP_PORT";
pub const ENV_DATA_DIR: &str = "KUBEGATE_DATA_DIR";
pub const ENV_JWT_SECRET: &str = "KUBEGATE_JWT_SECRET";
pub const ENV_TOKEN_TTL_SECS: &str = "KUBEGATE_TOKEN_TTL_SECS";
pub const ENV_POLICY_FILE: &str = "KUBEGATE_POLICY_FILE";
pub const ENV_ADMIN_USERNAME: &str = "KUBEGATE_ADMIN_USERNAME";
pub const ENV_ADMIN_PASSWORD: &str = "KUBEGATE_ADMIN_PASSWORD";
pub const ENV_ARGON2_MEMORY_KIB: &str = "KUBEGATE_ARGON2_MEMORY_KIB";
pub const ENV_ARGON2_ITERATIONS: &str = "KUBEGATE_ARGON2_ITERATIONS";
pub const ENV_ARGON2_PARALLELISM: &str = "KUBEGATE_ARGON2_PARALLELISM";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "KUBEGATE_REQUEST_TIMEOUT_SECS";

/// `KUBEGATE_DATA_DIR` value that selects the in-memory user store.
pub const IN_MEMORY: &str = ":memory:";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name}: invalid value `{value}`")]
    Invalid { name: String, value: String },
    #[error("{0} and {1} must be set together")]
    Incomplete(&'static str, &'static str),
    #[error("missing value for {0}")]
    MissingArg(String),
    #[error("unknown argument `{0}`")]
    UnknownArg(String),
}

#[derive(Clone, PartialEq, Eq)]
pub struct AdminBootstrap {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for AdminBootstrap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminBootstrap").field("username", &self.username).finish_non_exhaustive()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    pub http_port: u16,
    /// `None` keeps users in memory only.
    pub data_dir: Option<PathBuf>,
    pub jwt_secret: Option<String>,
    pub token_ttl: Duration,
    pub policy_file: Option<PathBuf>,
    pub admin: Option<AdminBootstrap>,
    pub hash_params: HashParams,
    pub request_timeout: Duration,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("http_port", &self.http_port)
            .field("data_dir", &self.data_dir)
            .field("jwt_secret", &self.jwt_secret.as_ref().map(|_| "<set>"))
            .field("token_ttl", &self.token_ttl)
            .field("policy_file", &self.policy_file)
            .field("admin", &self.admin)
            .field("hash_params", &self.hash_params)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 9090,
            data_dir: Some(PathBuf::from("data")),
            jwt_secret: None,
            token_ttl: Duration::from_secs(DEFAULT_TOKEN_TTL_SECS as u64),
            policy_file: None,
            admin: None,
            hash_params: HashParams::default(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

fn parse_value<T: FromStr>(name: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| ConfigError::Invalid { name: name.to_string(), value: raw.to_string() })
}

fn parse_data_dir(raw: &str) -> Option<PathBuf> {
    if raw == IN_MEMORY { None } else { Some(PathBuf::from(raw)) }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source; unset and empty values keep
    /// their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());
        let mut cfg = Config::default();

        if let Some(v) = get(ENV_HTTP_PORT) {
            cfg.http_port = parse_value(ENV_HTTP_PORT, &v)?;
        }
        if let Some(v) = get(ENV_DATA_DIR) {
            cfg.data_dir = parse_data_dir(&v);
        }
        cfg.jwt_secret = get(ENV_JWT_SECRET);
        if let Some(v) = get(ENV_TOKEN_TTL_SECS) {
            let secs: u64 = parse_value(ENV_TOKEN_TTL_SECS, &v)?;
            if secs == 0 || secs > MAX_TOKEN_TTL_SECS as u64 {
                return Err(ConfigError::Invalid { name: ENV_TOKEN_TTL_SECS.into(), value: v });
            }
            cfg.token_ttl = Duration::from_secs(secs);
        }
        cfg.policy_file = get(ENV_POLICY_FILE).map(PathBuf::from);
        cfg.admin = match (get(ENV_ADMIN_USERNAME), get(ENV_ADMIN_PASSWORD)) {
            (Some(username), Some(password)) => Some(AdminBootstrap { username, password }),
            (None, None) => None,
            _ => return Err(ConfigError::Incomplete(ENV_ADMIN_USERNAME, ENV_ADMIN_PASSWORD)),
        };
        if let Some(v) = get(ENV_ARGON2_MEMORY_KIB) {
            cfg.hash_params.memory_kib = parse_value(ENV_ARGON2_MEMORY_KIB, &v)?;
        }
        if let Some(v) = get(ENV_ARGON2_ITERATIONS) {
            cfg.hash_params.iterations = parse_value(ENV_ARGON2_ITERATIONS, &v)?;
        }
        if let Some(v) = get(ENV_ARGON2_PARALLELISM) {
            cfg.hash_params.parallelism = parse_value(ENV_ARGON2_PARALLELISM, &v)?;
        }
        if let Some(v) = get(ENV_REQUEST_TIMEOUT_SECS) {
            let secs: u64 = parse_value(ENV_REQUEST_TIMEOUT_SECS, &v)?;
            if secs == 0 {
                return Err(ConfigError::Invalid { name: ENV_REQUEST_TIMEOUT_SECS.into(), value: v });
            }
            cfg.request_timeout = Duration::from_secs(secs);
        }
        Ok(cfg)
    }

    /// Apply `--port`, `--data-dir` and `--policy-file` overrides.
    pub fn apply_args(&mut self, args: &[String]) -> Result<(), ConfigError> {
        let mut i = 0;
        while i < args.len() {
            let flag = args[i].as_str();
            let value = || args.get(i + 1).ok_or_else(|| ConfigError::MissingArg(flag.to_string()));
            match flag {
                "--port" => self.http_port = parse_value("--port", value()?)?,
                "--data-dir" => self.data_dir = parse_data_dir(value()?),
                "--policy-file" => self.policy_file = Some(PathBuf::from(value()?)),
                other => return Err(ConfigError::UnknownArg(other.to_string())),
            }
            i += 2;
        }
        Ok(())
    }
}
