//! Argument and configuration errors are reported before any socket is
//! opened, so these run without privileges.

use predicates::prelude::*;
use std::fs;
use tempfile::tempdir;

#[test]
fn test_quiet_and_verbose_conflict() {
    let mut cmd = assert_cmd::cargo_bin_cmd!("procevents");
    cmd.arg("--quiet").arg("--verbose");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used"));
}

#[test]
fn test_non_numeric_pid_is_rejected() {
    let mut cmd = assert_cmd::cargo_bin_cmd!("procevents");
    cmd.args(["--pid", "systemd"]);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn test_buffer_size_out_of_range() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("config.toml");
    fs::write(&config_path, "").unwrap();

    let mut cmd = assert_cmd::cargo_bin_cmd!("procevents");
    cmd.arg("--config")
        .arg(&config_path)
        .args(["--buffer-size", "8"]);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Invalid receive buffer size"));
}

#[test]
fn test_queue_capacity_out_of_range() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("config.toml");
    fs::write(&config_path, "").unwrap();

    let mut cmd = assert_cmd::cargo_bin_cmd!("procevents");
    cmd.arg("--config")
        .arg(&config_path)
        .args(["--queue-capacity", "1000000"]);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Invalid queue capacity"));
}

#[test]
fn test_missing_config_file() {
    let dir = tempdir().unwrap();

    let mut cmd = assert_cmd::cargo_bin_cmd!("procevents");
    cmd.arg("--config").arg(dir.path().join("absent.toml"));

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read configuration file"));
}

#[test]
fn test_malformed_config_file() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("config.toml");
    fs::write(&config_path, "queue_capacity = \"lots\"\n").unwrap();

    let mut cmd = assert_cmd::cargo_bin_cmd!("procevents");
    cmd.arg("--config").arg(&config_path);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse configuration file"));
}
