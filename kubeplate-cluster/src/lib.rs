//! kubeplate cluster access — resource kinds, label selectors, the API
//! client and the per-cycle resource cache.
//!
//! Public API surface:
//! - [`kind`] — [`ResourceKind`], [`ResourceList`], [`ResourceQuery`]
//! - [`selector`] — [`Selector`]
//! - [`client`] — [`ClusterClient`], [`KubeClusterClient`], [`AccessMode`]
//! - [`cache`] — [`ResourceCache`]
//! - [`error`] — [`ClusterError`]

pub mod cache;
pub mod client;
pub mod error;
pub mod kind;
pub mod selector;

#[cfg(any(test, feature = "testing"))]
pub mod fake;

pub use cache::ResourceCache;
pub use client::{AccessMode, ClusterClient, KubeClusterClient};
pub use error::ClusterError;
pub use kind::{ResourceKind, ResourceList, ResourceQuery, Scope, DEFAULT_NAMESPACE};
pub use selector::Selector;

/// Re-exported so downstream crates name the same object types.
pub use k8s_openapi;
