//! CLI end-to-end tests
//!
//! Tests for the autovhs command-line interface.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::process::Command;
use tempfile::tempdir;

/// Get a command for the autovhs binary
#[allow(deprecated)]
fn autovhs_cmd() -> Command {
    let mut cmd = Command::cargo_bin("autovhs").unwrap();
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_cli_no_args_shows_help() {
    let mut cmd = autovhs_cmd();
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_help_flag() {
    let mut cmd = autovhs_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("autovhs"))
        .stdout(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_version_flag() {
    let mut cmd = autovhs_cmd();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("autovhs"));
}

#[test]
fn test_cli_run_help() {
    let mut cmd = autovhs_cmd();
    cmd.args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Restore video files"))
        .stdout(predicate::str::contains("--encoder"));
}

#[test]
fn test_cli_run_rejects_unknown_encoder() {
    let mut cmd = autovhs_cmd();
    cmd.args(["run", "--encoder", "h264"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn test_cli_check_tools_command() {
    let mut cmd = autovhs_cmd();
    cmd.arg("check-tools").assert().success().stdout(
        predicate::str::contains("ffmpeg")
            .and(predicate::str::contains("ffprobe"))
            .and(predicate::str::contains("vspipe")),
    );
}

#[test]
fn test_cli_probe_nonexistent_file() {
    let mut cmd = autovhs_cmd();
    cmd.args(["probe", "/nonexistent/path/tape.avi"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn test_cli_validate_defaults() {
    let mut cmd = autovhs_cmd();
    cmd.arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("using defaults"))
        .stdout(predicate::str::contains("Encoder: prores"));
}

#[test]
fn test_cli_validate_config_file() {
    let temp = tempdir().unwrap();
    let config_file = temp.path().join("autovhs.toml");
    fs::write(
        &config_file,
        r#"
[encoding]
encoder = "av1"
audio_bitrate = "256k"

[sync]
max_drift_percent = 1.5

[deinterlace]
tv_standard = "pal"
"#,
    )
    .unwrap();

    let mut cmd = autovhs_cmd();
    cmd.args(["validate", config_file.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"))
        .stdout(predicate::str::contains("_deinterlaced_av1.mkv"))
        .stdout(predicate::str::contains("256k"));
}

#[test]
fn test_cli_validate_invalid_config() {
    let temp = tempdir().unwrap();
    let config_file = temp.path().join("bad.toml");
    fs::write(&config_file, "[sync]\nmin_drift_seconds = -1.0\n").unwrap();

    let mut cmd = autovhs_cmd();
    cmd.args(["validate", config_file.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("min_drift_seconds"));
}

#[test]
fn test_cli_global_config_flag_is_used_by_validate() {
    let temp = tempdir().unwrap();
    let config_file = temp.path().join("broken.toml");
    fs::write(&config_file, "[encoding\n").unwrap();

    let mut cmd = autovhs_cmd();
    cmd.args(["--config", config_file.to_str().unwrap(), "validate"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse config file"));
}

#[cfg(unix)]
#[test]
fn test_cli_run_reports_missing_tools() {
    let temp = tempdir().unwrap();
    let mut cmd = autovhs_cmd();
    cmd.current_dir(temp.path())
        .env("PATH", temp.path())
        .args(["run", "--progress", "none"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Missing required tools"));
}
