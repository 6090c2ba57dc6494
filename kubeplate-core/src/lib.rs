//! kubeplate core library — configuration types, loading, errors.
//!
//! Public API surface:
//! - [`types`] — [`Config`], [`TemplateDescriptor`], [`ClusterConfig`]
//! - [`error`] — [`ConfigError`]
//! - [`config`] — [`ConfigInputs`] and `load` / `load_at`

pub mod config;
pub mod error;
pub mod types;

pub use config::ConfigInputs;
pub use error::ConfigError;
pub use types::{ClusterConfig, Config, TemplateDescriptor};
