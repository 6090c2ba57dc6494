//! Configuration loading.
//!
//! # Sources
//!
//! ```text
//! command line flags        (ConfigInputs, highest precedence)
//! KUBEPLATE_* environment   (folded into ConfigInputs by the CLI)
//! config file               (--config, or ./kubeplate.{yaml,yml,json})
//! built-in defaults         (types::DEFAULT_*)
//! ```
//!
//! # API pattern
//!
//! - `load_at(dir: &Path, …)` — explicit directory for the default config
//!   file search; used in tests with `TempDir`
//! - `load(…)` — searches the current working directory, delegates to `_at`

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{io_err, ConfigError};
use crate::types::{ClusterConfig, Config, TemplateDescriptor};

/// Base name of the config file searched for when `--config` is not given.
pub const CONFIG_FILE_STEM: &str = "kubeplate";

const CONFIG_FILE_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

// ---------------------------------------------------------------------------
// 1. Inputs
// ---------------------------------------------------------------------------

/// Raw settings gathered from the command line.
///
/// `None` means "not given", letting the config file or the default apply.
/// The same value is kept for the lifetime of the process so a reload
/// re-reads the config file from exactly the same place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigInputs {
    pub config_file: Option<PathBuf>,
    pub dry_run: bool,
    pub run_once: bool,
    pub in_cluster: bool,
    pub kube_config: Option<PathBuf>,
    pub master: Option<String>,
    pub poll_period: Option<Duration>,
    pub command_timeout: Option<Duration>,
    pub left_delimiter: Option<String>,
    pub right_delimiter: Option<String>,
    /// `templatePath:outputPath[:command]` strings, in command line order.
    pub templates: Vec<String>,
}

// ---------------------------------------------------------------------------
// 2. Config file schema
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ConfigFile {
    master: Option<String>,
    kube_config: Option<PathBuf>,
    #[serde(default, with = "humantime_serde")]
    poll_period: Option<Duration>,
    /// Deprecated spelling of `poll-period`.
    #[serde(default, with = "humantime_serde")]
    poll_time: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    command_timeout: Option<Duration>,
    left_delimiter: Option<String>,
    right_delimiter: Option<String>,
    #[serde(default)]
    templates: Vec<FileTemplate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct FileTemplate {
    path: Option<PathBuf>,
    output: Option<PathBuf>,
    command: Option<String>,
    #[serde(default, with = "humantime_serde")]
    command_timeout: Option<Duration>,
}

impl FileTemplate {
    fn into_descriptor(self) -> Option<TemplateDescriptor> {
        let (Some(source), Some(output)) = (self.path, self.output) else {
            return None;
        };
        Some(TemplateDescriptor {
            source,
            output,
            command: self.command.filter(|c| !c.trim().is_empty()),
            command_timeout: self.command_timeout,
        })
    }
}

// ---------------------------------------------------------------------------
// 3. Config file discovery and parsing
// ---------------------------------------------------------------------------

/// Locate the config file: the explicit one (must exist) or the first
/// `kubeplate.{yaml,yml,json}` found in `dir`.
pub fn config_file_at(dir: &Path, explicit: Option<&Path>) -> Result<Option<PathBuf>, ConfigError> {
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }
        return Ok(Some(path.to_path_buf()));
    }
    Ok(CONFIG_FILE_EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{CONFIG_FILE_STEM}.{ext}")))
        .find(|candidate| candidate.is_file()))
}

fn read_config_file(path: &Path) -> Result<ConfigFile, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    if contents.trim().is_empty() {
        return Ok(ConfigFile::default());
    }
    serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

// ---------------------------------------------------------------------------
// 4. Merge
// ---------------------------------------------------------------------------

/// Build a [`Config`] from `inputs`, searching `dir` for the default config file.
pub fn load_at(dir: &Path, inputs: &ConfigInputs) -> Result<Config, ConfigError> {
    let file = match config_file_at(dir, inputs.config_file.as_deref())? {
        Some(path) => {
            tracing::info!(path = %path.display(), "using config file");
            read_config_file(&path)?
        }
        None => ConfigFile::default(),
    };

    let mut config = Config {
        dry_run: inputs.dry_run,
        run_once: inputs.run_once,
        ..Config::default()
    };

    config.cluster = ClusterConfig {
        in_cluster: inputs.in_cluster,
        kube_config: inputs.kube_config.clone().or(file.kube_config),
        master: inputs.master.clone().or(file.master),
    };

    let file_poll_period = match (file.poll_period, file.poll_time) {
        (Some(period), _) => Some(period),
        (None, Some(period)) => {
            tracing::warn!("'poll-time' parameter is deprecated, use 'poll-period' instead");
            Some(period)
        }
        (None, None) => None,
    };
    if let Some(period) = inputs.poll_period.or(file_poll_period) {
        config.poll_period = period;
    }
    tracing::debug!(poll_period = ?config.poll_period, "poll period set");

    if let Some(timeout) = inputs.command_timeout.or(file.command_timeout) {
        config.command_timeout = timeout;
    }

    if let Some(left) = inputs.left_delimiter.clone().or(file.left_delimiter) {
        config.left_delimiter = left;
    }
    if let Some(right) = inputs.right_delimiter.clone().or(file.right_delimiter) {
        config.right_delimiter = right;
    }
    if config.left_delimiter.is_empty() {
        return Err(ConfigError::EmptyDelimiter { which: "left" });
    }
    if config.right_delimiter.is_empty() {
        return Err(ConfigError::EmptyDelimiter { which: "right" });
    }

    let mut seen = HashSet::new();
    for raw in &inputs.templates {
        match raw.parse::<TemplateDescriptor>() {
            Ok(descriptor) => {
                tracing::debug!(path = %descriptor.source.display(), "adding template from command line");
                append_descriptor(&mut config.templates, &mut seen, descriptor);
            }
            Err(err) => tracing::error!(error = %err, "can't parse template descriptor"),
        }
    }
    for entry in file.templates {
        let Some(descriptor) = entry.into_descriptor() else {
            tracing::warn!("skipped non-complete template descriptor in config file");
            continue;
        };
        tracing::debug!(path = %descriptor.source.display(), "adding template from config file");
        append_descriptor(&mut config.templates, &mut seen, descriptor);
    }

    if config.templates.is_empty() {
        return Err(ConfigError::NoTemplates);
    }
    Ok(config)
}

/// `load_at` convenience wrapper searching the current working directory.
pub fn load(inputs: &ConfigInputs) -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|e| io_err(".", e))?;
    load_at(&cwd, inputs)
}

fn append_descriptor(
    templates: &mut Vec<TemplateDescriptor>,
    seen: &mut HashSet<PathBuf>,
    descriptor: TemplateDescriptor,
) {
    if seen.insert(descriptor.source.clone()) {
        templates.push(descriptor);
    } else {
        tracing::warn!(path = %descriptor.source.display(), "template already added");
    }
}
