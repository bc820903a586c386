//! CLI integration tests for tablesync.
//!
//! These tests verify command-line argument parsing, help output,
//! exit codes for configuration errors and per-table failure reporting.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

/// Get a command for the tablesync binary.
fn cmd() -> Command {
    Command::cargo_bin("tablesync").unwrap()
}

/// Profiles that pass config validation but cannot connect: `pl_db` lacks a host.
fn unreachable_config(extra_general: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
General:
  log_level: INFO
{}
Connections:
  pl_db:
    db_user: pl
    db_password: pw
    db_name: PL
  prod:
    db_user: app
    db_password: pw
    db_name: PROD
Sync:
  nightly:
    local_db: pl_db
    remote_db: prod
    tables:
      - ORDERS: ORDERS
"#,
        extra_general
    )
    .unwrap();
    file
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_lists_flags() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--input"))
        .stdout(predicate::str::contains("--output"))
        .stdout(predicate::str::contains("--local-conn"))
        .stdout(predicate::str::contains("--remote-conn"))
        .stdout(predicate::str::contains("--method-sync"))
        .stdout(predicate::str::contains("--show-only"))
        .stdout(predicate::str::contains("--log-level"))
        .stdout(predicate::str::contains("--output-json"));
}

#[test]
fn test_help_shows_defaults() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("[default: config.yml]"))
        .stdout(predicate::str::contains("[default: pl_db]"))
        .stdout(predicate::str::contains("[default: prod]"))
        .stdout(predicate::str::contains("[default: truncate]"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("tablesync"));
}

#[test]
fn test_invalid_method_rejected() {
    cmd()
        .args(["-m", "merge"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn test_invalid_log_level_rejected() {
    cmd()
        .args(["--log-level", "LOUD"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

// =============================================================================
// Configuration Errors
// =============================================================================

#[test]
fn test_missing_config_fails() {
    cmd()
        .args(["--config", "nonexistent_config_file.yml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("IO error"));
}

#[test]
fn test_invalid_yaml_fails() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "invalid: yaml: content: [").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("YAML error"));
}

#[test]
fn test_unknown_profile_fails_validation() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
Connections:
  pl_db: {{db_user: pl, db_password: pw, db_host: h, db_name: PL}}
Sync:
  nightly:
    local_db: pl_db
    remote_db: missing
    tables:
      - T: T
"#
    )
    .unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration error"))
        .stderr(predicate::str::contains("missing"));
}

#[test]
fn test_manual_sync_with_unknown_connection_fails() {
    let file = unreachable_config("");

    cmd()
        .args([
            "--config",
            file.path().to_str().unwrap(),
            "-i",
            "SRC",
            "-o",
            "DST",
            "-l",
            "nowhere",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nowhere"));
}

// =============================================================================
// Runs With Failing Tables
// =============================================================================

#[test]
fn test_connection_failure_is_reported_not_fatal() {
    let file = unreachable_config("");

    cmd()
        .args(["--config", file.path().to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Tables: 0/1"))
        .stdout(predicate::str::contains("nightly/ORDERS"))
        .stdout(predicate::str::contains("db_host"));
}

#[test]
fn test_output_json_reports_failed_table() {
    let file = unreachable_config("");

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "--output-json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"tables_failed\": 1"))
        .stdout(predicate::str::contains("\"status\": \"failed\""));
}

#[test]
fn test_log_file_receives_banner() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("sync.log");
    let file = unreachable_config(&format!("  log_file: {}", log_path.display()));

    cmd()
        .args(["--config", file.path().to_str().unwrap()])
        .assert()
        .success();

    let log = std::fs::read_to_string(&log_path).unwrap();
    assert!(log.contains("the script started working"));
    assert!(log.contains("The script execution time was"));
}

#[test]
fn test_manual_sync_replaces_configured_jobs() {
    let file = unreachable_config("");

    cmd()
        .args([
            "--config",
            file.path().to_str().unwrap(),
            "-i",
            "SRC",
            "-o",
            "dst",
            "-m",
            "diff",
            "--output-json",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"job\": \"manual_sync\""))
        .stdout(predicate::str::contains("\"local_table\": \"DST\""))
        .stdout(predicate::str::contains("\"mode\": \"diff\""))
        .stdout(predicate::str::contains("nightly").not());
}
