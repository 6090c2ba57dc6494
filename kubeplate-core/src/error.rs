//! Error types for kubeplate-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while assembling a [`crate::Config`].
///
/// Every variant is fatal for the attempt that produced it: startup aborts,
/// a reload attempt is abandoned and the running pipeline is left alone.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure while reading a config file.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML/JSON parse error — includes file path and line context from serde_yaml.
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The config file named explicitly on the command line does not exist.
    #[error("config file not found at {path}")]
    NotFound { path: PathBuf },

    /// A `path:output[:command]` descriptor string could not be parsed.
    #[error("invalid template descriptor '{input}': {reason}")]
    InvalidDescriptor { input: String, reason: &'static str },

    /// A template delimiter is empty.
    #[error("template {which} delimiter must not be empty")]
    EmptyDelimiter { which: &'static str },

    /// Nothing left to render after merging command line and config file.
    #[error("no templates to process")]
    NoTemplates,
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}
