//! Smoke tests for the Lodestar CLI.
//!
//! These tests verify basic CLI functionality:
//! - `lodestar --version` outputs version info
//! - `lodestar --help` lists the commands
//! - client commands against an unreachable backend fail cleanly

mod common;

use common::TestEnv;
use predicates::prelude::*;

#[test]
fn test_version_flag() {
    TestEnv::new()
        .lodestar()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("lodestar"))
        .stdout(predicate::str::contains("0.1.0"));
}

#[test]
fn test_version_carries_commit_and_build_time() {
    TestEnv::new()
        .lodestar()
        .arg("--version")
        .assert()
        .success()
        .stdout(
            predicate::str::is_match(
                r"lodestar 0\.1\.0 \(\S+ \d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}Z\)",
            )
            .unwrap(),
        );
}

#[test]
fn test_help_lists_commands() {
    TestEnv::new()
        .lodestar()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("simulate"))
        .stdout(predicate::str::contains("watch"))
        .stdout(predicate::str::contains("apply-patch"));
}

#[test]
fn test_no_subcommand_is_usage_error() {
    TestEnv::new()
        .lodestar()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn test_watch_rejects_unknown_level() {
    TestEnv::new()
        .lodestar()
        .args(["watch", "proj-x", "--level", "verbose", "--seconds", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown log level"));
}

#[test]
fn test_unreachable_backend_reports_json_error() {
    // Port 9 (discard) is not served in test environments
    TestEnv::new()
        .lodestar()
        .args(["projects", "--server-url", "http://127.0.0.1:9"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("\"error\""));
}

#[test]
fn test_upload_rejects_non_zip_before_sending() {
    let env = TestEnv::new();
    let notes = env.config_dir.path().join("notes.txt");
    std::fs::write(&notes, "not an archive").unwrap();
    env.lodestar()
        .arg("upload")
        .arg(&notes)
        .args(["--server-url", "http://127.0.0.1:9"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("only .zip archives"));
}
