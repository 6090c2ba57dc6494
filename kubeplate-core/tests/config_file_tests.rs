//! Config file discovery, parsing and merge-precedence integration tests.

use std::path::PathBuf;
use std::time::Duration;

use assert_fs::prelude::*;
use kubeplate_core::{
    config::{self, ConfigInputs},
    types::{DEFAULT_COMMAND_TIMEOUT, DEFAULT_POLL_PERIOD},
    ConfigError,
};
use rstest::rstest;

fn cli_templates(templates: &[&str]) -> ConfigInputs {
    ConfigInputs {
        templates: templates.iter().map(|t| t.to_string()).collect(),
        ..ConfigInputs::default()
    }
}

// ---------------------------------------------------------------------------
// 1. Discovery
// ---------------------------------------------------------------------------

#[rstest]
#[case("kubeplate.yaml")]
#[case("kubeplate.yml")]
#[case("kubeplate.json")]
fn default_config_file_is_discovered(#[case] file_name: &str) {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    dir.child(file_name)
        .write_str(r#"{"templates": [{"path": "a.tmpl", "output": "a.conf"}]}"#)
        .expect("write");

    let config = config::load_at(dir.path(), &ConfigInputs::default()).expect("load");
    assert_eq!(config.templates.len(), 1);
    assert_eq!(config.templates[0].source, PathBuf::from("a.tmpl"));
}

#[test]
fn no_config_file_uses_defaults() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let config = config::load_at(dir.path(), &cli_templates(&["a:b"])).expect("load");
    assert_eq!(config.poll_period, DEFAULT_POLL_PERIOD);
    assert_eq!(config.command_timeout, DEFAULT_COMMAND_TIMEOUT);
    assert_eq!(config.left_delimiter, "{{");
    assert_eq!(config.right_delimiter, "}}");
    assert!(config.cluster.master.is_none());
}

// ---------------------------------------------------------------------------
// 2. Parsing
// ---------------------------------------------------------------------------

#[test]
fn corrupt_config_file_reports_path() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    dir.child("kubeplate.yaml")
        .write_str("templates: [unclosed")
        .expect("write");

    let err = config::load_at(dir.path(), &cli_templates(&["a:b"])).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains("kubeplate.yaml"));
}

#[test]
fn durations_use_humantime_syntax() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    dir.child("kubeplate.yaml")
        .write_str(
            "poll-period: 1m30s\n\
             command-timeout: 250ms\n\
             templates:\n\
             \x20 - path: a.tmpl\n\
             \x20   output: a.conf\n\
             \x20   command: systemctl reload nginx\n\
             \x20   command-timeout: 5s\n",
        )
        .expect("write");

    let config = config::load_at(dir.path(), &ConfigInputs::default()).expect("load");
    assert_eq!(config.poll_period, Duration::from_secs(90));
    assert_eq!(config.command_timeout, Duration::from_millis(250));
    let t = &config.templates[0];
    assert_eq!(t.command.as_deref(), Some("systemctl reload nginx"));
    assert_eq!(config.command_timeout_for(t), Duration::from_secs(5));
}

#[test]
fn deprecated_poll_time_is_still_honoured() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    dir.child("kubeplate.yaml")
        .write_str("poll-time: 42s\n")
        .expect("write");

    let config = config::load_at(dir.path(), &cli_templates(&["a:b"])).expect("load");
    assert_eq!(config.poll_period, Duration::from_secs(42));
}

#[test]
fn incomplete_file_templates_are_skipped() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    dir.child("kubeplate.yaml")
        .write_str(
            "templates:\n\
             \x20 - path: only-path.tmpl\n\
             \x20 - output: only-output.conf\n\
             \x20 - path: full.tmpl\n\
             \x20   output: full.conf\n",
        )
        .expect("write");

    let config = config::load_at(dir.path(), &ConfigInputs::default()).expect("load");
    assert_eq!(config.templates.len(), 1);
    assert_eq!(config.templates[0].source, PathBuf::from("full.tmpl"));
}

// ---------------------------------------------------------------------------
// 3. Precedence
// ---------------------------------------------------------------------------

#[test]
fn command_line_wins_over_config_file() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    dir.child("kubeplate.yaml")
        .write_str(
            "master: http://file:8080\n\
             poll-period: 1m\n\
             left-delimiter: '[['\n\
             right-delimiter: ']]'\n",
        )
        .expect("write");

    let inputs = ConfigInputs {
        master: Some("https://flag:6443".to_string()),
        poll_period: Some(Duration::ZERO),
        ..cli_templates(&["a:b"])
    };
    let config = config::load_at(dir.path(), &inputs).expect("load");
    assert_eq!(config.cluster.master.as_deref(), Some("https://flag:6443"));
    assert_eq!(config.poll_period, Duration::ZERO);
    assert!(!config.polling_enabled());
    assert_eq!(config.left_delimiter, "[[");
    assert_eq!(config.right_delimiter, "]]");
}

#[test]
fn command_line_templates_come_first_and_win_duplicates() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    dir.child("kubeplate.yaml")
        .write_str(
            "templates:\n\
             \x20 - path: shared.tmpl\n\
             \x20   output: from-file.conf\n\
             \x20 - path: file-only.tmpl\n\
             \x20   output: file-only.conf\n",
        )
        .expect("write");

    let config =
        config::load_at(dir.path(), &cli_templates(&["shared.tmpl:from-cli.conf"])).expect("load");
    let outputs: Vec<_> = config.templates.iter().map(|t| t.output.clone()).collect();
    assert_eq!(
        outputs,
        vec![PathBuf::from("from-cli.conf"), PathBuf::from("file-only.conf")]
    );
}

#[test]
fn explicit_config_file_outside_search_dir() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let elsewhere = assert_fs::TempDir::new().expect("tempdir");
    let file = elsewhere.child("custom.yml");
    file.write_str("kube-config: /etc/kube/admin.conf\n").expect("write");

    let inputs = ConfigInputs {
        config_file: Some(file.path().to_path_buf()),
        ..cli_templates(&["a:b"])
    };
    let config = config::load_at(dir.path(), &inputs).expect("load");
    assert_eq!(
        config.cluster.kube_config,
        Some(PathBuf::from("/etc/kube/admin.conf"))
    );
}
