//! kubeplate daemon — the render loop, template commands and hot reload.
//!
//! Public API surface:
//! - [`orchestrator`] — [`Orchestrator`], [`RunState`], [`OrchestratorHandle`], [`CycleReport`]
//! - [`command`] — `execute` with a timeout
//! - [`supervise`] — [`supervise()`] and [`Control`]
//! - [`error`] — [`DaemonError`], [`CommandError`]

pub mod command;
pub mod error;
pub mod orchestrator;
pub mod supervise;

pub use error::{CommandError, DaemonError};
pub use orchestrator::{
    CommandOutcome, CycleReport, Orchestrator, OrchestratorHandle, RunState, TemplateOutcome, TemplateStatus,
};
pub use supervise::{supervise, Control};
