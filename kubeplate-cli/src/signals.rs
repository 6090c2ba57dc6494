//! Process signals → supervisor control requests.
//!
//! | signal                    | request  |
//! |---------------------------|----------|
//! | SIGINT, SIGTERM, SIGQUIT  | Stop     |
//! | SIGHUP                    | Reload   |

use kubeplate_daemon::Control;
use tokio::sync::mpsc;

#[cfg(unix)]
pub struct Signals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
    quit: tokio::signal::unix::Signal,
    hangup: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Signals {
    /// Install the handlers. Fails when a handler can't be registered.
    pub fn install() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            quit: signal(SignalKind::quit())?,
            hangup: signal(SignalKind::hangup())?,
        })
    }

    /// Forward signals until a stop was sent or the supervisor is gone.
    pub async fn forward(mut self, control: mpsc::Sender<Control>) {
        loop {
            let (name, request) = tokio::select! {
                _ = self.interrupt.recv() => ("SIGINT", Control::Stop),
                _ = self.terminate.recv() => ("SIGTERM", Control::Stop),
                _ = self.quit.recv() => ("SIGQUIT", Control::Stop),
                _ = self.hangup.recv() => ("SIGHUP", Control::Reload),
            };
            tracing::info!(signal = name, ?request, "signal received");
            if control.send(request).await.is_err() || request == Control::Stop {
                return;
            }
        }
    }
}

#[cfg(not(unix))]
pub struct Signals;

#[cfg(not(unix))]
impl Signals {
    pub fn install() -> std::io::Result<Self> {
        Ok(Self)
    }

    pub async fn forward(self, control: mpsc::Sender<Control>) {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!(signal = "ctrl-c", "signal received");
                let _ = control.send(Control::Stop).await;
            }
            Err(err) => tracing::error!(error = %err, "ctrl-c handler failed"),
        }
    }
}
