//! Hot reload.
//!
//! ```text
//! Reload ─▶ factory() ─ok─▶ stop current, await done, start next
//!                    └─err─▶ log, current keeps running
//! Stop / channel closed ─▶ stop current, await done, return
//! ```

use std::future::Future;

use tokio::sync::mpsc;

use crate::error::DaemonError;
use crate::orchestrator::{Orchestrator, OrchestratorHandle};

/// Requests accepted by [`supervise`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Reload,
    Stop,
}

/// Start `first` and keep one orchestrator running until told to stop.
pub async fn supervise<F, Fut>(first: Orchestrator, mut control: mpsc::Receiver<Control>, mut factory: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Orchestrator, DaemonError>>,
{
    let mut current = launch(first);

    loop {
        match control.recv().await {
            Some(Control::Reload) => {
                tracing::info!("reloading configuration");
                match factory().await {
                    Ok(next) => {
                        shut_down(&current).await;
                        current = launch(next);
                        tracing::info!("configuration reloaded");
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "reload failed, keeping the running configuration");
                    }
                }
            }
            Some(Control::Stop) | None => break,
        }
    }

    shut_down(&current).await;
}

fn launch(orchestrator: Orchestrator) -> OrchestratorHandle {
    let handle = orchestrator.handle();
    tokio::spawn(orchestrator.start());
    handle
}

async fn shut_down(handle: &OrchestratorHandle) {
    handle.stop();
    handle.done().await;
}
