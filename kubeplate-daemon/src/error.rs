use std::process::ExitStatus;
use std::time::Duration;

use thiserror::Error;

/// Error surface for pipeline construction and the run loop.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("configuration error: {0}")]
    Config(#[from] kubeplate_core::ConfigError),

    #[error("cluster error: {0}")]
    Cluster(#[from] kubeplate_cluster::ClusterError),

    #[error("template error: {0}")]
    Template(#[from] kubeplate_sync::SyncError),

    #[error("no async runtime: {0}")]
    Runtime(#[from] tokio::runtime::TryCurrentError),

    #[error("task join failure: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Failure of one template command. Never fatal to a cycle.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("can't start command '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("command '{command}' timed out after {}", human(.timeout))]
    Timeout { command: String, timeout: Duration },

    #[error("command '{command}' failed: {status}")]
    ExitStatus { command: String, status: ExitStatus },

    #[error("can't wait for command '{command}': {source}")]
    Wait {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

impl CommandError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, CommandError::Timeout { .. })
    }
}

fn human(duration: &Duration) -> humantime::FormattedDuration {
    humantime::format_duration(*duration)
}
