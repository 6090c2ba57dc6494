//! Domain types consumed by the rendering pipeline.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem paths.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Default API server poll period. Zero disables periodic re-rendering.
pub const DEFAULT_POLL_PERIOD: Duration = Duration::from_secs(15);

/// Default time budget for a template command. Zero waits indefinitely.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

pub const DEFAULT_LEFT_DELIMITER: &str = "{{";
pub const DEFAULT_RIGHT_DELIMITER: &str = "}}";

// ---------------------------------------------------------------------------
// TemplateDescriptor
// ---------------------------------------------------------------------------

/// One configured template: where it is read from, where its output goes and
/// what runs after the output changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateDescriptor {
    /// Template source file. Unique across one run.
    pub source: PathBuf,
    /// Rendered output file.
    pub output: PathBuf,
    /// Optional shell command executed after the output changed.
    pub command: Option<String>,
    /// Per-template command timeout; `None` uses [`Config::command_timeout`].
    pub command_timeout: Option<Duration>,
}

impl TemplateDescriptor {
    pub fn new(source: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            output: output.into(),
            command: None,
            command_timeout: None,
        }
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }
}

impl FromStr for TemplateDescriptor {
    type Err = ConfigError;

    /// Parses `templatePath:outputPath[:command]`. The command part is taken
    /// verbatim, so it may itself contain colons.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason| ConfigError::InvalidDescriptor {
            input: s.to_string(),
            reason,
        };

        if s.trim().is_empty() {
            return Err(invalid("empty template descriptor string"));
        }

        let mut parts = s.splitn(3, ':');
        let source = parts.next().unwrap_or_default();
        let Some(output) = parts.next() else {
            return Err(invalid("should be 'templatePath:outputPath[:command]'"));
        };
        if source.is_empty() {
            return Err(invalid("template path is empty"));
        }
        if output.is_empty() {
            return Err(invalid("output path is empty"));
        }

        let mut descriptor = TemplateDescriptor::new(source, output);
        if let Some(command) = parts.next().filter(|c| !c.trim().is_empty()) {
            descriptor.command = Some(command.to_string());
        }
        Ok(descriptor)
    }
}

impl fmt::Display for TemplateDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source.display(), self.output.display())?;
        if let Some(command) = &self.command {
            write!(f, ":{command}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ClusterConfig
// ---------------------------------------------------------------------------

/// How to reach the orchestration API server.
///
/// Resolution order: in-cluster service account, explicit kubeconfig file,
/// explicit master URL, then kube's standard inference.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterConfig {
    /// Use the pod's service account and `KUBERNETES_SERVICE_*` environment.
    pub in_cluster: bool,
    /// Explicit kubeconfig file.
    pub kube_config: Option<PathBuf>,
    /// Explicit API server URL.
    pub master: Option<String>,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Fully resolved configuration for one pipeline instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Do not write output or run commands; print intended changes instead.
    pub dry_run: bool,
    /// Run one cycle and exit.
    pub run_once: bool,
    /// Cycle period. Zero or less disables periodic re-rendering and the
    /// watch-based cluster mirror.
    pub poll_period: Duration,
    /// Process-wide default command timeout.
    pub command_timeout: Duration,
    pub left_delimiter: String,
    pub right_delimiter: String,
    pub cluster: ClusterConfig,
    /// Ordered, source-path-unique template list.
    pub templates: Vec<TemplateDescriptor>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dry_run: false,
            run_once: false,
            poll_period: DEFAULT_POLL_PERIOD,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            left_delimiter: DEFAULT_LEFT_DELIMITER.to_string(),
            right_delimiter: DEFAULT_RIGHT_DELIMITER.to_string(),
            cluster: ClusterConfig::default(),
            templates: Vec::new(),
        }
    }
}

impl Config {
    /// Whether cycles repeat; also selects the cached cluster access mode.
    pub fn polling_enabled(&self) -> bool {
        !self.poll_period.is_zero()
    }

    /// Effective command timeout for `descriptor`.
    pub fn command_timeout_for(&self, descriptor: &TemplateDescriptor) -> Duration {
        descriptor.command_timeout.unwrap_or(self.command_timeout)
    }
}
