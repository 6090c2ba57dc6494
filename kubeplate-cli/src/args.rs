//! Command line flags.

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser};
use kubeplate_core::ConfigInputs;

#[derive(Parser, Debug)]
#[command(
    name = "kubeplate",
    version,
    about = "Render configuration files from Kubernetes cluster state",
    long_about = None,
)]
pub struct Cli {
    /// Run one render cycle and exit.
    #[arg(long, env = "KUBEPLATE_ONCE")]
    pub once: bool,

    /// Print changed output and commands instead of writing and running them.
    #[arg(long, env = "KUBEPLATE_DRY_RUN")]
    pub dry_run: bool,

    /// Config file (default: ./kubeplate.{yaml,yml,json} when present).
    #[arg(short, long, env = "KUBEPLATE_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// API server URL.
    #[arg(long, env = "KUBEPLATE_MASTER", value_name = "URL")]
    pub master: Option<String>,

    /// kubeconfig file.
    #[arg(short, long, env = "KUBEPLATE_KUBE_CONFIG", value_name = "FILE")]
    pub kube_config: Option<PathBuf>,

    /// Use the in-cluster service account.
    #[arg(long, env = "KUBEPLATE_GUESS_KUBE_API_SETTINGS")]
    pub guess_kube_api_settings: bool,

    /// Time between render cycles; 0 renders once and waits for a signal.
    #[arg(
        short,
        long,
        alias = "poll-time",
        env = "KUBEPLATE_POLL_PERIOD",
        value_name = "DURATION",
        value_parser = humantime::parse_duration
    )]
    pub poll_period: Option<Duration>,

    /// Default time budget for template commands; 0 waits indefinitely.
    #[arg(
        long,
        env = "KUBEPLATE_COMMAND_TIMEOUT",
        value_name = "DURATION",
        value_parser = humantime::parse_duration
    )]
    pub command_timeout: Option<Duration>,

    /// Left template delimiter.
    #[arg(short, long, env = "KUBEPLATE_LEFT_DELIMITER")]
    pub left_delimiter: Option<String>,

    /// Right template delimiter.
    #[arg(short, long, env = "KUBEPLATE_RIGHT_DELIMITER")]
    pub right_delimiter: Option<String>,

    /// Template to render, as templatePath:outputPath[:command]. Repeatable.
    #[arg(short, long = "template", value_name = "SRC:OUT[:CMD]")]
    pub templates: Vec<String>,

    /// More logging (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Log as JSON lines.
    #[arg(long, env = "KUBEPLATE_LOG_JSON")]
    pub log_json: bool,
}

impl Cli {
    pub fn inputs(&self) -> ConfigInputs {
        ConfigInputs {
            config_file: self.config.clone(),
            dry_run: self.dry_run,
            run_once: self.once,
            in_cluster: self.guess_kube_api_settings,
            kube_config: self.kube_config.clone(),
            master: self.master.clone(),
            poll_period: self.poll_period,
            command_timeout: self.command_timeout,
            left_delimiter: self.left_delimiter.clone(),
            right_delimiter: self.right_delimiter.clone(),
            templates: self.templates.clone(),
        }
    }

    /// Fallback filter directive when `RUST_LOG` is unset.
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_map_onto_config_inputs() {
        let cli = Cli::try_parse_from([
            "kubeplate",
            "--once",
            "--dry-run",
            "-p",
            "1m30s",
            "--command-timeout",
            "0s",
            "-l",
            "[[",
            "-r",
            "]]",
            "-t",
            "a.tmpl:a.conf",
            "--template",
            "b.tmpl:b.conf:nginx -s reload",
        ])
        .unwrap();
        let inputs = cli.inputs();
        assert!(inputs.run_once);
        assert!(inputs.dry_run);
        assert_eq!(inputs.poll_period, Some(Duration::from_secs(90)));
        assert_eq!(inputs.command_timeout, Some(Duration::ZERO));
        assert_eq!(inputs.left_delimiter.as_deref(), Some("[["));
        assert_eq!(inputs.right_delimiter.as_deref(), Some("]]"));
        assert_eq!(inputs.templates, vec!["a.tmpl:a.conf", "b.tmpl:b.conf:nginx -s reload"]);
    }

    #[test]
    fn poll_time_is_accepted_as_alias() {
        let cli = Cli::try_parse_from(["kubeplate", "--poll-time", "5s"]).unwrap();
        assert_eq!(cli.poll_period, Some(Duration::from_secs(5)));
    }

    #[test]
    fn malformed_duration_is_rejected() {
        assert!(Cli::try_parse_from(["kubeplate", "--poll-period", "soon"]).is_err());
    }

    #[test]
    fn verbosity_raises_log_level() {
        let level = |args: &[&str]| Cli::try_parse_from(args).unwrap().log_level();
        assert_eq!(level(&["kubeplate"]), "info");
        assert_eq!(level(&["kubeplate", "-v"]), "debug");
        assert_eq!(level(&["kubeplate", "-vv"]), "trace");
    }
}
