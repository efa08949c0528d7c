//!
//! kubegate HTTP server
//! --------------------
//! A thin axum surface over the access core. Handlers only translate between
//! HTTP and the core types; all decisions live in `identity` and `dispatch`.
//!
//! Endpoints:
//! - `POST /api/v1/login`: password login, returns `{"jwtToken": ...}`.
//! - `POST /api/v1/token/refresh`: re-issue a still-valid token.
//! - `GET /api/v1/route/{kind}`: resolve and authorize a resource request for
//!   the bearer token, returning the client family and scope that would serve it.
//!
//! Blocking work (user store I/O, password hashing) runs on the blocking pool
//! under the configured request deadline.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::crypto::CryptoService;
use crate::dispatch::{DispatchRequest, Dispatcher};
use crate::error::AppError;
use crate::identity::{
    ensure_default_admin, AccessPolicy, FrontendAuthManager, FrontendAuthPayload, JwtService, LocalAuthManager,
    Operation,
};
use crate::registry::ResourceRegistry;
use crate::storage::{DataStore, LocalDataStore};

const GENERATED_SECRET_LEN: usize = 64;

#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<dyn FrontendAuthManager>,
    pub dispatcher: Arc<Dispatcher>,
    pub request_timeout: Duration,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(json!({"status": "error", "error": self}))).into_response()
    }
}

/// Run `f` on the blocking pool, bounded by `deadline`. The deadline only
/// bounds how long the caller waits; the blocking task is not cancelled.
async fn run_blocking<T, F>(deadline: Duration, f: F) -> Result<T, AppError>
where
    F: FnOnce() -> Result<T, AppError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::time::timeout(deadline, tokio::task::spawn_blocking(f)).await {
        Ok(Ok(res)) => res,
        Ok(Err(e)) => {
            error!("blocking task failed: {e}");
            Err(AppError::internal("internal", "request handler failed"))
        }
        Err(_) => {
            warn!("request deadline of {:?} exceeded", deadline);
            Err(AppError::unavailable("timeout", "request deadline exceeded"))
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get("authorization")?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

async fn login(State(state): State<AppState>, Json(payload): Json<FrontendAuthPayload>) -> Response {
    let auth = Arc::clone(&state.auth);
    match run_blocking(state.request_timeout, move || auth.login(&payload).map_err(AppError::from)).await {
        Ok(resp) => (StatusCode::OK, Json(resp)).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct RefreshPayload {
    #[serde(rename = "jwtToken", default)]
    jwt_token: String,
}

async fn refresh(State(state): State<AppState>, Json(payload): Json<RefreshPayload>) -> Response {
    match state.auth.refresh(&payload.jwt_token) {
        Ok(resp) => (StatusCode::OK, Json(resp)).into_response(),
        Err(e) => AppError::from(e).into_response(),
    }
}

#[derive(Debug, Default, Deserialize)]
struct RouteQuery {
    operation: Option<String>,
    namespace: Option<String>,
}

async fn resolve_route(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(query): Query<RouteQuery>,
    headers: HeaderMap,
) -> Response {
    let Some(token) = bearer_token(&headers) else {
        return AppError::auth("authentication_required", "authentication required").into_response();
    };
    let operation = match query.operation.as_deref().unwrap_or("get").parse::<Operation>() {
        Ok(op) => op,
        Err(e) => return AppError::user("invalid_operation".into(), e.to_string()).into_response(),
    };
    let request = DispatchRequest { kind, operation, namespace: query.namespace };
    match state.dispatcher.authorize(token, &request) {
        Ok(route) => (StatusCode::OK, Json(route)).into_response(),
        Err(e) => AppError::from(e).into_response(),
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "kubegate ok" }))
        .route("/api/v1/login", post(login))
        .route("/api/v1/token/refresh", post(refresh))
        .route("/api/v1/route/{kind}", get(resolve_route))
        .with_state(state)
}

fn signing_secret(config: &Config, crypto: &CryptoService) -> anyhow::Result<Vec<u8>> {
    match &config.jwt_secret {
        Some(secret) => Ok(secret.as_bytes().to_vec()),
        None => {
            warn!(
                target: "startup",
                "{} is not set; using a random signing secret, tokens will not survive a restart",
                crate::config::ENV_JWT_SECRET
            );
            crypto.generate_key(GENERATED_SECRET_LEN).context("While generating a signing secret")
        }
    }
}

pub async fn run(config: Config) -> anyhow::Result<()> {
    let crypto = Arc::new(CryptoService::new(config.hash_params).context("Invalid argon2 parameters")?);

    let store: Arc<dyn DataStore> = match &config.data_dir {
        Some(dir) => Arc::new(LocalDataStore::with_dir(dir)),
        None => Arc::new(LocalDataStore::in_memory()),
    };
    store.open().context("While opening the user store")?;
    store.init().context("While initializing the user store")?;
    let users = store.user_service();

    if let Some(admin) = &config.admin {
        ensure_default_admin(users.as_ref(), &crypto, &admin.username, &admin.password)
            .context("While ensuring the bootstrap admin")?;
    }

    let policy = match &config.policy_file {
        Some(path) => AccessPolicy::from_file(path)
            .with_context(|| format!("While loading policy file {}", path.display()))?,
        None => AccessPolicy::default(),
    };

    let registry = Arc::new(ResourceRegistry::with_defaults());
    info!(target: "startup", kinds = registry.len(), "resource registry ready");

    let secret = signing_secret(&config, &crypto)?;
    let ttl = chrono::Duration::from_std(config.token_ttl).context("Token TTL out of range")?;
    let jwt = Arc::new(JwtService::new(&secret, ttl).context("Invalid signing configuration")?);

    let auth = LocalAuthManager::new(Arc::clone(&users), Arc::clone(&crypto), Arc::clone(&jwt))
        .context("While preparing the login service")?;
    let state = AppState {
        auth: Arc::new(auth),
        dispatcher: Arc::new(Dispatcher::new(registry, jwt, Arc::new(policy))),
        request_timeout: config.request_timeout,
    };

    let addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let served = axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested");
        })
        .await;

    // Close the store even when serving failed.
    if let Err(e) = store.close() {
        error!(target: "store", "closing user store failed: {e}");
    }
    served?;
    Ok(())
}
