//! Error types for kubeplate-cluster.

use thiserror::Error;

use crate::kind::ResourceKind;
use crate::selector::SelectorError;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failures while reaching the API server or answering a resource query.
///
/// None of these are cached by [`crate::ResourceCache`]: the next lookup of
/// the same query goes back to the cluster.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// The label selector could not be parsed.
    #[error("invalid label selector '{selector}': {source}")]
    InvalidSelector {
        selector: String,
        #[source]
        source: SelectorError,
    },

    /// A list request against the API server failed.
    #[error("failed to list {kind}: {source}")]
    Api {
        kind: ResourceKind,
        #[source]
        source: kube::Error,
    },

    /// The local mirror for `kind` was stopped before its initial sync completed.
    #[error("couldn't sync local mirror for {kind}")]
    CacheSyncFailed { kind: ResourceKind },

    /// Building the client configuration (kubeconfig, in-cluster, master URL) failed.
    #[error("cluster client configuration failed: {source}")]
    ClientConfig {
        #[source]
        source: BoxError,
    },

    /// A client returned a list of a different kind than was asked for.
    #[error("expected a list of {expected}, got {actual}")]
    UnexpectedKind {
        expected: ResourceKind,
        actual: ResourceKind,
    },
}

pub(crate) fn config_err(source: impl Into<BoxError>) -> ClusterError {
    ClusterError::ClientConfig {
        source: source.into(),
    }
}
