//! The render loop.
//!
//! # One cycle
//!
//! ```text
//! flush cache
//!   → process every template, in configured order      (blocking pool)
//!       changed + command → schedule (deduplicated, first trigger wins)
//!   → run scheduled commands one after another          (async)
//! ```
//!
//! A dry run prints changed content during the template phase and the
//! scheduled commands after it, running none of them.
//!
//! A failing template or command is logged and never ends the cycle.
//!
//! # Lifecycle
//!
//! ```text
//! Idle ──start()──▶ Running ──stop──▶ Stopped   (done fires once)
//! ```
//!
//! `start` runs one cycle immediately, then one per poll period until the
//! stop token fires. With polling disabled it only waits for stop.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use kubeplate_cluster::{AccessMode, ClusterClient, KubeClusterClient, ResourceCache};
use kubeplate_core::Config;
use kubeplate_renderer::{EngineSettings, FunctionTable};
use kubeplate_sync::{Processed, SyncError, TemplateUnit};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::command;
use crate::error::{CommandError, DaemonError};

// ---------------------------------------------------------------------------
// 1. Run state and handle
// ---------------------------------------------------------------------------

/// Stop request and completion signal of one orchestrator.
#[derive(Debug, Clone, Default)]
pub struct RunState {
    stop: CancellationToken,
    done: CancellationToken,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token that fires when a stop is requested. Share it with anything
    /// that must wind down with the orchestrator.
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }
}

/// Controls a started orchestrator from other tasks.
#[derive(Debug, Clone)]
pub struct OrchestratorHandle {
    state: RunState,
}

impl OrchestratorHandle {
    /// Request the loop to exit after the current cycle.
    pub fn stop(&self) {
        self.state.stop.cancel();
    }

    /// Wait until the loop has exited.
    pub async fn done(&self) {
        self.state.done.cancelled().await;
    }

    pub fn is_done(&self) -> bool {
        self.state.done.is_cancelled()
    }
}

// ---------------------------------------------------------------------------
// 2. Cycle report
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum TemplateStatus {
    Unchanged,
    Changed,
    /// Rendering failed; the output file was not touched.
    RenderFailed(SyncError),
    /// Rendering succeeded but the output could not be written.
    WriteFailed(SyncError),
}

#[derive(Debug)]
pub struct TemplateOutcome {
    pub name: String,
    pub status: TemplateStatus,
}

#[derive(Debug)]
pub struct CommandOutcome {
    pub command: String,
    pub result: Result<(), CommandError>,
}

/// What one cycle did, in execution order.
#[derive(Debug, Default)]
pub struct CycleReport {
    pub templates: Vec<TemplateOutcome>,
    pub commands: Vec<CommandOutcome>,
    /// Dry run only: commands that were scheduled but not run.
    pub skipped_commands: Vec<String>,
}

impl CycleReport {
    pub fn changed(&self) -> usize {
        self.count(|s| matches!(s, TemplateStatus::Changed))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, TemplateStatus::RenderFailed(_) | TemplateStatus::WriteFailed(_)))
    }

    pub fn commands_failed(&self) -> usize {
        self.commands.iter().filter(|c| c.result.is_err()).count()
    }

    /// Commands in execution order.
    pub fn command_lines(&self) -> Vec<&str> {
        self.commands.iter().map(|c| c.command.as_str()).collect()
    }

    fn count(&self, pred: impl Fn(&TemplateStatus) -> bool) -> usize {
        self.templates.iter().filter(|t| pred(&t.status)).count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ScheduledCommand {
    command: String,
    timeout: Duration,
}

// ---------------------------------------------------------------------------
// 3. Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator {
    config: Config,
    cache: Arc<ResourceCache>,
    /// Only the cycle path touches the units, one cycle at a time.
    units: Arc<Mutex<Vec<TemplateUnit>>>,
    state: RunState,
}

impl Orchestrator {
    /// Build the pipeline: cache over `client`, then one compiled unit per
    /// configured template. Must be called within a tokio runtime.
    pub fn new(config: Config, client: Arc<dyn ClusterClient>, state: RunState) -> Result<Self, DaemonError> {
        let runtime = tokio::runtime::Handle::try_current()?;
        let cache = Arc::new(ResourceCache::new(client));
        let functions = FunctionTable::new(Arc::clone(&cache), runtime);
        let settings = EngineSettings::from(&config);

        let units = config
            .templates
            .iter()
            .map(|descriptor| TemplateUnit::new(descriptor.clone(), &settings, &functions))
            .collect::<Result<Vec<_>, _>>()?;
        tracing::debug!(templates = units.len(), "templates compiled");

        Ok(Orchestrator {
            config,
            cache,
            units: Arc::new(Mutex::new(units)),
            state,
        })
    }

    /// Connect to the configured cluster and build the pipeline. The client's
    /// mirrors share this orchestrator's stop token.
    pub async fn from_config(config: &Config) -> Result<Self, DaemonError> {
        let state = RunState::new();
        let mode = AccessMode::for_polling(config.polling_enabled() && !config.run_once);
        let client = KubeClusterClient::connect(&config.cluster, mode, state.stop_token()).await?;
        Self::new(config.clone(), Arc::new(client), state)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn handle(&self) -> OrchestratorHandle {
        OrchestratorHandle {
            state: self.state.clone(),
        }
    }

    /// Run exactly one cycle.
    pub async fn run_once(&self) -> Result<CycleReport, DaemonError> {
        self.cache.flush().await;

        let units = Arc::clone(&self.units);
        let config = self.config.clone();
        let (templates, scheduled) =
            tokio::task::spawn_blocking(move || process_units(&units, &config)).await?;

        if self.config.dry_run {
            let skipped_commands = scheduled
                .into_iter()
                .map(|ScheduledCommand { command, .. }| {
                    println!("(dry-run) executing: {command:?}");
                    command
                })
                .collect();
            return Ok(CycleReport {
                templates,
                commands: Vec::new(),
                skipped_commands,
            });
        }

        let mut commands = Vec::with_capacity(scheduled.len());
        for ScheduledCommand { command, timeout } in scheduled {
            let result = command::execute(&command, timeout).await;
            if let Err(err) = &result {
                tracing::warn!(error = %err, "command failed");
            }
            commands.push(CommandOutcome { command, result });
        }

        Ok(CycleReport {
            templates,
            commands,
            skipped_commands: Vec::new(),
        })
    }

    /// Run the loop until stopped, then signal done.
    pub async fn start(self) {
        self.run_loop().await;
        self.state.done.cancel();
        tracing::info!("orchestrator stopped");
    }

    async fn run_loop(&self) {
        if self.state.stop.is_cancelled() {
            return;
        }
        self.cycle().await;

        if !self.config.polling_enabled() {
            tracing::info!("polling disabled, waiting for stop");
            self.state.stop.cancelled().await;
            return;
        }

        let mut interval = tokio::time::interval(self.config.poll_period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval.tick().await; // the first tick is immediate

        loop {
            tokio::select! {
                biased;
                () = self.state.stop.cancelled() => break,
                _ = interval.tick() => self.cycle().await,
            }
        }
    }

    async fn cycle(&self) {
        match self.run_once().await {
            Ok(report) => tracing::info!(
                templates = report.templates.len(),
                changed = report.changed(),
                failed = report.failed(),
                commands = report.commands.len(),
                commands_failed = report.commands_failed(),
                "cycle complete"
            ),
            Err(err) => tracing::error!(error = %err, "cycle aborted"),
        }
    }
}

// ---------------------------------------------------------------------------
// 4. Template phase
// ---------------------------------------------------------------------------

fn process_units(
    units: &Mutex<Vec<TemplateUnit>>,
    config: &Config,
) -> (Vec<TemplateOutcome>, Vec<ScheduledCommand>) {
    let mut units = units.lock().unwrap_or_else(PoisonError::into_inner);
    let mut outcomes = Vec::with_capacity(units.len());
    let mut scheduled: Vec<ScheduledCommand> = Vec::new();

    for unit in units.iter_mut() {
        let name = unit.name().to_string();
        let status = match unit.process(config.dry_run) {
            Ok(Processed::Unchanged) => TemplateStatus::Unchanged,
            Ok(Processed::Changed { content }) => {
                let descriptor = unit.descriptor();
                if config.dry_run {
                    println!("(dry-run) {name}:\n{content}");
                }
                if let Some(cmd) = &descriptor.command {
                    let command = normalize_command(cmd);
                    if scheduled.iter().any(|s| s.command == command) {
                        tracing::debug!(template = %name, command = %command, "command already scheduled");
                    } else {
                        tracing::debug!(template = %name, command = %command, "command scheduled");
                        scheduled.push(ScheduledCommand {
                            command,
                            timeout: config.command_timeout_for(descriptor),
                        });
                    }
                }
                TemplateStatus::Changed
            }
            Err(err) if err.is_write_failure() => {
                tracing::error!(template = %name, error = %err, "can't write output");
                TemplateStatus::WriteFailed(err)
            }
            Err(err) => {
                tracing::warn!(template = %name, error = %err, "can't render template");
                TemplateStatus::RenderFailed(err)
            }
        };
        outcomes.push(TemplateOutcome { name, status });
    }

    (outcomes, scheduled)
}

/// Dedup key and invocation string for `command`: the canonical path when it
/// names an existing path, otherwise the string as given.
fn normalize_command(command: &str) -> String {
    let path = Path::new(command);
    if !path.exists() {
        return command.to_string();
    }
    match std::fs::canonicalize(path) {
        Ok(canonical) => canonical.to_string_lossy().into_owned(),
        Err(err) => {
            tracing::debug!(command, error = %err, "can't canonicalize command path");
            command.to_string()
        }
    }
}
