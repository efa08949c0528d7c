//! Resource kind registry.
//!
//! Maps a logical resource kind ("configmap", "deployment", ...) to the
//! cluster-facing resource name, the transport client family that serves it,
//! and whether it lives under a namespace.
//!
//! Registration happens on a `RegistryBuilder`, which is consumed by `build()`.
//! The resulting `ResourceRegistry` is immutable and is shared behind an `Arc`,
//! so lookups need no lock and can never observe a half-written entry.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Logical category of a managed object, e.g. `configmap`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceKind(String);

impl ResourceKind {
    pub fn new(kind: impl AsRef<str>) -> Self {
        Self(kind.as_ref().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceKind {
    fn from(s: &str) -> Self {
        ResourceKind::new(s)
    }
}

pub const KIND_CONFIG_MAP: &str = "configmap";
pub const KIND_DAEMON_SET: &str = "daemonset";
pub const KIND_DEPLOYMENT: &str = "deployment";
pub const KIND_POD: &str = "pod";
pub const KIND_SERVICE: &str = "service";
pub const KIND_SECRET: &str = "secret";
pub const KIND_REPLICA_SET: &str = "replicaset";
pub const KIND_REPLICATION_CONTROLLER: &str = "replicationcontroller";
pub const KIND_STATEFUL_SET: &str = "statefulset";
pub const KIND_JOB: &str = "job";
pub const KIND_CRON_JOB: &str = "cronjob";
pub const KIND_HORIZONTAL_POD_AUTOSCALER: &str = "horizontalpodautoscaler";
pub const KIND_INGRESS: &str = "ingress";
pub const KIND_PERSISTENT_VOLUME_CLAIM: &str = "persistentvolumeclaim";
pub const KIND_NAMESPACE: &str = "namespace";
pub const KIND_NODE: &str = "node";
pub const KIND_PERSISTENT_VOLUME: &str = "persistentvolume";
pub const KIND_STORAGE_CLASS: &str = "storageclass";

/// Transport client family used to reach a kind's backing API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClientType {
    #[serde(rename = "restclient")]
    Default,
    #[serde(rename = "extensionclient")]
    Extension,
    #[serde(rename = "appsclient")]
    Apps,
    #[serde(rename = "batchclient")]
    Batch,
    #[serde(rename = "betabatchclient")]
    BetaBatch,
    #[serde(rename = "autoscalingclient")]
    Autoscaling,
    #[serde(rename = "storageclient")]
    Storage,
}

impl ClientType {
    pub fn as_str(self) -> &'static str {
        match self {
            ClientType::Default => "restclient",
            ClientType::Extension => "extensionclient",
            ClientType::Apps => "appsclient",
            ClientType::Batch => "batchclient",
            ClientType::BetaBatch => "betabatchclient",
            ClientType::Autoscaling => "autoscalingclient",
            ClientType::Storage => "storageclient",
        }
    }
}

impl fmt::Display for ClientType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryEntry {
    /// Cluster-facing plural name, e.g. `configmaps`.
    pub resource: String,
    pub client_type: ClientType,
    /// False for cluster-global objects such as nodes.
    pub namespaced: bool,
}

impl RegistryEntry {
    pub fn new(resource: impl Into<String>, client_type: ClientType, namespaced: bool) -> Self {
        Self { resource: resource.into(), client_type, namespaced }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("unknown resource kind `{0}`")]
    UnknownKind(String),
    #[error("resource kind `{0}` is already registered")]
    DuplicateKind(String),
    #[error("invalid entry for `{kind}`: {reason}")]
    InvalidEntry { kind: String, reason: String },
}

const DEFAULT_TABLE: &[(&str, &str, ClientType, bool)] = &[
    (KIND_CONFIG_MAP, "configmaps", ClientType::Default, true),
    (KIND_DAEMON_SET, "daemonsets", ClientType::Extension, true),
    (KIND_DEPLOYMENT, "deployments", ClientType::Extension, true),
    (KIND_POD, "pods", ClientType::Default, true),
    (KIND_SERVICE, "services", ClientType::Default, true),
    (KIND_SECRET, "secrets", ClientType::Default, true),
    (KIND_REPLICA_SET, "replicasets", ClientType::Extension, true),
    (KIND_REPLICATION_CONTROLLER, "replicationcontrollers", ClientType::Default, true),
    (KIND_STATEFUL_SET, "statefulsets", ClientType::Apps, true),
    (KIND_JOB, "jobs", ClientType::Batch, true),
    (KIND_CRON_JOB, "cronjobs", ClientType::BetaBatch, true),
    (KIND_HORIZONTAL_POD_AUTOSCALER, "horizontalpodautoscalers", ClientType::Autoscaling, true),
    (KIND_INGRESS, "ingresses", ClientType::Extension, true),
    (KIND_PERSISTENT_VOLUME_CLAIM, "persistentvolumeclaims", ClientType::Default, true),
    (KIND_NAMESPACE, "namespaces", ClientType::Default, false),
    (KIND_NODE, "nodes", ClientType::Default, false),
    (KIND_PERSISTENT_VOLUME, "persistentvolumes", ClientType::Default, false),
    (KIND_STORAGE_CLASS, "storageclasses", ClientType::Storage, false),
];

#[derive(Debug, Default)]
pub struct RegistryBuilder {
    entries: HashMap<ResourceKind, RegistryEntry>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder pre-seeded with the built-in kinds.
    pub fn with_defaults() -> Self {
        let mut b = Self::new();
        for (kind, resource, client, namespaced) in DEFAULT_TABLE {
            b.entries.insert(ResourceKind::new(kind), RegistryEntry::new(*resource, *client, *namespaced));
        }
        b
    }

    /// Additive only: an existing kind is never overwritten.
    pub fn register(&mut self, kind: impl Into<ResourceKind>, entry: RegistryEntry) -> Result<&mut Self, RegistryError> {
        let kind = kind.into();
        if kind.as_str().is_empty() {
            return Err(RegistryError::InvalidEntry { kind: kind.0, reason: "kind must not be empty".into() });
        }
        if entry.resource.trim().is_empty() {
            return Err(RegistryError::InvalidEntry { kind: kind.0, reason: "resource name must not be empty".into() });
        }
        if self.entries.contains_key(&kind) {
            return Err(RegistryError::DuplicateKind(kind.0));
        }
        self.entries.insert(kind, entry);
        Ok(self)
    }

    pub fn build(self) -> ResourceRegistry {
        ResourceRegistry { entries: self.entries }
    }
}

/// Immutable kind table, built once at startup.
#[derive(Debug, Clone)]
pub struct ResourceRegistry {
    entries: HashMap<ResourceKind, RegistryEntry>,
}

impl ResourceRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn with_defaults() -> Self {
        RegistryBuilder::with_defaults().build()
    }

    pub fn lookup(&self, kind: &str) -> Result<&RegistryEntry, RegistryError> {
        let kind = kind.trim();
        self.entries
            .get(&ResourceKind(kind.to_string()))
            .ok_or_else(|| RegistryError::UnknownKind(kind.to_string()))
    }

    /// Registered kinds in sorted order.
    pub fn kinds(&self) -> Vec<&ResourceKind> {
        let mut out: Vec<&ResourceKind> = self.entries.keys().collect();
        out.sort();
        out
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
