//! Template command execution.
//!
//! ```text
//! execute ──spawn──▶ /bin/sh -c <command>   (own process group)
//!    │                  ├─ stdout ─▶ drain task ─▶ debug log, line by line
//!    │                  └─ stderr ─▶ drain task ─▶ debug log, line by line
//!    │
//!    ├─ waiter task: owns the child, waits for exit or a kill request
//!    └─ timer: fires after `timeout` (never when the timeout is zero)
//! ```
//!
//! The waiter and the timer both report to one [`Verdict`]. The first report
//! is the only outcome returned; the timeout path still waits until the
//! killed child is reaped.

use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;

use crate::error::CommandError;

// ---------------------------------------------------------------------------
// 1. Verdict
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Exited,
    TimedOut,
}

#[derive(Debug, Default)]
struct Verdict(Mutex<Option<Outcome>>);

impl Verdict {
    /// Record `outcome` unless another was recorded first. Returns the winner.
    fn settle(&self, outcome: Outcome) -> Outcome {
        let mut slot = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        *slot.get_or_insert(outcome)
    }
}

// ---------------------------------------------------------------------------
// 2. execute
// ---------------------------------------------------------------------------

/// Run `command` through the platform shell. A zero `timeout` waits
/// indefinitely; otherwise the whole process group is killed once it elapses.
pub async fn execute(command: &str, timeout: Duration) -> Result<(), CommandError> {
    tracing::info!(command, timeout = %humantime::format_duration(timeout), "executing command");

    let mut child = shell(command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| CommandError::Spawn {
            command: command.to_string(),
            source,
        })?;

    if let Some(stdout) = child.stdout.take() {
        drain(stdout, command, "stdout");
    }
    if let Some(stderr) = child.stderr.take() {
        drain(stderr, command, "stderr");
    }

    let verdict = Arc::new(Verdict::default());
    let (kill_tx, kill_rx) = oneshot::channel();
    let (status_tx, mut status_rx) = oneshot::channel();
    tokio::spawn(wait_or_kill(child, kill_rx, Arc::clone(&verdict), status_tx));

    let status = if timeout.is_zero() {
        status_rx.await
    } else {
        tokio::select! {
            status = &mut status_rx => status,
            () = tokio::time::sleep(timeout) => {
                if verdict.settle(Outcome::TimedOut) == Outcome::TimedOut {
                    let _ = kill_tx.send(());
                    let _ = status_rx.await;
                    tracing::warn!(command, "command timed out, process group killed");
                    return Err(CommandError::Timeout {
                        command: command.to_string(),
                        timeout,
                    });
                }
                status_rx.await
            }
        }
    };

    let wait_err = |source| CommandError::Wait {
        command: command.to_string(),
        source,
    };
    match status {
        Ok(Ok(status)) if status.success() => {
            tracing::info!(command, "command finished");
            Ok(())
        }
        Ok(Ok(status)) => Err(CommandError::ExitStatus {
            command: command.to_string(),
            status,
        }),
        Ok(Err(source)) => Err(wait_err(source)),
        Err(_) => Err(wait_err(io::Error::other("command waiter stopped"))),
    }
}

async fn wait_or_kill(
    mut child: Child,
    kill_rx: oneshot::Receiver<()>,
    verdict: Arc<Verdict>,
    status_tx: oneshot::Sender<io::Result<ExitStatus>>,
) {
    let status = tokio::select! {
        status = child.wait() => {
            verdict.settle(Outcome::Exited);
            status
        }
        Ok(()) = kill_rx => {
            kill_group(&mut child);
            child.wait().await
        }
    };
    let _ = status_tx.send(status);
}

// ---------------------------------------------------------------------------
// 3. Platform plumbing
// ---------------------------------------------------------------------------

#[cfg(unix)]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("/bin/sh");
    cmd.arg("-c").arg(command).process_group(0);
    cmd
}

#[cfg(windows)]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

#[cfg(unix)]
fn kill_group(child: &mut Child) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    if let Some(pid) = child.id().and_then(|id| i32::try_from(id).ok()) {
        if let Err(errno) = killpg(Pid::from_raw(pid), Signal::SIGKILL) {
            tracing::debug!(pid, error = %errno, "can't kill process group");
        }
    }
    // the leader itself, in case the group was already gone
    let _ = child.start_kill();
}

#[cfg(not(unix))]
fn kill_group(child: &mut Child) {
    let _ = child.start_kill();
}

/// Log `reader` line by line as it arrives. Invalid UTF-8 is replaced.
fn drain<R>(reader: R, command: &str, stream: &'static str)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let command = command.to_string();
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut line = Vec::new();
        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line).await {
                Ok(0) => break,
                Ok(_) => {
                    let text = String::from_utf8_lossy(&line);
                    tracing::debug!(command = %command, stream, "{}", text.trim_end());
                }
                Err(err) => {
                    tracing::debug!(command = %command, stream, error = %err, "output stream closed");
                    break;
                }
            }
        }
    });
}
