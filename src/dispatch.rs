//! Request dispatch.
//!
//! Every request walks the same states and stops at the first failure:
//!
//! ```text
//! TokenPresented -> TokenValidated -> KindResolved -> AuthorizationChecked -> Forwarded
//! ```
//!
//! The dispatcher decides which client family and which scope serve a request;
//! the call itself belongs to a `Transport`.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::identity::{AccessPolicy, Denied, JwtService, Operation, TokenData};
use crate::registry::{RegistryEntry, RegistryError, ResourceRegistry};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Token missing, forged, expired or unreadable. Details stay in the logs.
    #[error("authentication required")]
    Authentication,
    #[error(transparent)]
    Authorization(#[from] Denied),
    #[error("unknown resource kind `{0}`")]
    UnknownKind(String),
    #[error("{0}")]
    Validation(String),
    #[error("transport failed: {0}")]
    Transport(#[source] anyhow::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchRequest {
    pub kind: String,
    pub operation: Operation,
    pub namespace: Option<String>,
}

impl DispatchRequest {
    pub fn new(kind: impl Into<String>, operation: Operation) -> Self {
        Self { kind: kind.into(), operation, namespace: None }
    }

    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }
}

/// Resolved target of an authorized request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub resource: String,
    pub client_type: crate::registry::ClientType,
    pub namespaced: bool,
    pub namespace: Option<String>,
    pub operation: Operation,
}

/// What a transport receives once a request has been authorized.
#[derive(Debug, Clone, Copy)]
pub struct ForwardRequest<'a> {
    pub entry: &'a RegistryEntry,
    pub namespace: Option<&'a str>,
    pub operation: Operation,
    pub caller: &'a TokenData,
}

/// Performs the actual cluster API call for a resolved request.
pub trait Transport: Send + Sync {
    type Output;

    fn forward(&self, request: ForwardRequest<'_>) -> anyhow::Result<Self::Output>;
}

pub struct Dispatcher {
    registry: Arc<ResourceRegistry>,
    jwt: Arc<JwtService>,
    policy: Arc<AccessPolicy>,
}

/// Outcome of the first four states, borrowed from the registry.
struct Authorized<'a> {
    entry: &'a RegistryEntry,
    namespace: Option<&'a str>,
    caller: TokenData,
}

impl Dispatcher {
    pub fn new(registry: Arc<ResourceRegistry>, jwt: Arc<JwtService>, policy: Arc<AccessPolicy>) -> Self {
        Self { registry, jwt, policy }
    }

    fn check<'a>(&'a self, token: &str, request: &'a DispatchRequest) -> Result<Authorized<'a>, DispatchError> {
        let caller = self
            .jwt
            .decrypt(token)
            .map_err(|e| {
                debug!(target: "dispatch", error = %e, "token validation failed");
                DispatchError::Authentication
            })?
            .data;

        let entry = self.registry.lookup(&request.kind).map_err(|e| match e {
            RegistryError::UnknownKind(k) => DispatchError::UnknownKind(k),
            other => DispatchError::Validation(other.to_string()),
        })?;

        let namespace = request.namespace.as_deref().map(str::trim).filter(|ns| !ns.is_empty());
        match (entry.namespaced, namespace) {
            (true, None) => {
                return Err(DispatchError::Validation(format!(
                    "resource kind `{}` is namespaced; a namespace is required",
                    request.kind.trim()
                )));
            }
            (false, Some(ns)) => {
                return Err(DispatchError::Validation(format!(
                    "resource kind `{}` is cluster-scoped; namespace `{}` is not allowed",
                    request.kind.trim(),
                    ns
                )));
            }
            _ => {}
        }

        self.policy.check(caller.role, request.operation)?;
        debug!(
            target: "dispatch",
            user_id = %caller.id,
            kind = %request.kind,
            operation = %request.operation,
            "request authorized"
        );
        Ok(Authorized { entry, namespace, caller })
    }

    /// Validate, resolve and authorize without forwarding.
    pub fn authorize(&self, token: &str, request: &DispatchRequest) -> Result<Route, DispatchError> {
        let a = self.check(token, request)?;
        Ok(Route {
            resource: a.entry.resource.clone(),
            client_type: a.entry.client_type,
            namespaced: a.entry.namespaced,
            namespace: a.namespace.map(str::to_string),
            operation: request.operation,
        })
    }

    pub fn dispatch<T: Transport>(
        &self,
        transport: &T,
        token: &str,
        request: &DispatchRequest,
    ) -> Result<T::Output, DispatchError> {
        let a = self.check(token, request)?;
        transport
            .forward(ForwardRequest {
                entry: a.entry,
                namespace: a.namespace,
                operation: request.operation,
                caller: &a.caller,
            })
            .map_err(DispatchError::Transport)
    }
}
