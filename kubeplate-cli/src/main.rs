//! kubeplate — render configuration files from Kubernetes cluster state.
//!
//! # Usage
//!
//! ```text
//! kubeplate -t nginx.tmpl:/etc/nginx/upstreams.conf:"nginx -s reload"
//! kubeplate --once --dry-run -c kubeplate.yaml
//! kubeplate -k ~/.kube/config -p 30s -t haproxy.tmpl:/etc/haproxy/haproxy.cfg
//! ```
//!
//! Daemon mode runs until SIGINT/SIGTERM/SIGQUIT; SIGHUP reloads the
//! configuration from the same flags and config file.

mod args;
mod signals;

use anyhow::{Context, Result};
use clap::Parser;
use kubeplate_core::{config, ConfigInputs};
use kubeplate_daemon::{supervise, Orchestrator};
use tokio::sync::mpsc;

use args::Cli;
use signals::Signals;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level(), cli.log_json);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("can't start the async runtime")?;
    runtime.block_on(run(cli.inputs()))
}

async fn run(inputs: ConfigInputs) -> Result<()> {
    let config = config::load(&inputs).context("can't load configuration")?;
    let orchestrator = Orchestrator::from_config(&config)
        .await
        .context("can't set up the render pipeline")?;

    if config.run_once {
        let report = orchestrator.run_once().await?;
        orchestrator.handle().stop();
        tracing::info!(
            templates = report.templates.len(),
            changed = report.changed(),
            failed = report.failed(),
            commands = report.commands.len(),
            commands_failed = report.commands_failed(),
            "run complete"
        );
        return Ok(());
    }

    let signals = Signals::install().context("can't install signal handlers")?;
    let (control_tx, control_rx) = mpsc::channel(8);
    let forwarder = tokio::spawn(signals.forward(control_tx));

    tracing::info!(templates = config.templates.len(), "kubeplate started");
    supervise(orchestrator, control_rx, move || {
        let inputs = inputs.clone();
        async move {
            let config = config::load(&inputs)?;
            Orchestrator::from_config(&config).await
        }
    })
    .await;

    forwarder.abort();
    tracing::info!("kubeplate stopped");
    Ok(())
}

fn init_tracing(fallback: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
