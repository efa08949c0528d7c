//! kubegate: access layer for a cluster-management backend.
//!
//! Resolves resource kinds to the client family and scope that serve them
//! (`registry`, `dispatch`), and authenticates and authorizes the users who
//! ask (`crypto`, `identity`, `storage`).

pub mod config;
pub mod crypto;
pub mod dispatch;
pub mod error;
pub mod identity;
pub mod registry;
pub mod server;
pub mod storage;
