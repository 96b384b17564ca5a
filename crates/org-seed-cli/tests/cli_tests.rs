//! CLI integration tests for org-seed.
//!
//! These tests verify command-line argument parsing, help output, and exit
//! codes for error conditions that fail before any network activity.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

/// Get a command for the org-seed binary.
fn cmd() -> Command {
    Command::cargo_bin("org-seed").unwrap()
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_shows_all_flags() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--source-org"))
        .stdout(predicate::str::contains("--target-org"))
        .stdout(predicate::str::contains("--object"))
        .stdout(predicate::str::contains("--children"))
        .stdout(predicate::str::contains("--grandchildren"))
        .stdout(predicate::str::contains("--include-tasks"))
        .stdout(predicate::str::contains("--include-events"))
        .stdout(predicate::str::contains("--include-files"))
        .stdout(predicate::str::contains("--count"))
        .stdout(predicate::str::contains("--where"))
        .stdout(predicate::str::contains("--upsert-field"))
        .stdout(predicate::str::contains("--dry-run"));
}

#[test]
fn test_count_default_is_ten() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("[default: 10]"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("org-seed"));
}

#[test]
fn test_short_flags_accepted() {
    // Short flags parse; the run then fails fast on the missing auth file.
    cmd()
        .args(["-s", "dev", "-t", "qa", "-o", "Account", "-n", "5", "-d"])
        .args(["--auth-file", "/nonexistent/orgs.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Auth error"));
}

// =============================================================================
// Fail-fast validation
// =============================================================================

#[test]
fn test_zero_count_rejected() {
    cmd()
        .args(["-s", "dev", "-t", "qa", "-o", "Account", "-n", "0"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("positive integer"));
}

#[test]
fn test_non_numeric_count_rejected() {
    cmd()
        .args(["-s", "dev", "-t", "qa", "-o", "Account", "-n", "ten"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("'All'").or(predicate::str::contains("positive integer")));
}

#[test]
fn test_missing_auth_file_fails_with_auth_error() {
    cmd()
        .args(["-s", "dev", "-t", "qa", "-o", "Account"])
        .args(["--auth-file", "/nonexistent/orgs.json"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("could not read auth file"));
}

#[test]
fn test_unknown_alias_lists_available_orgs() {
    let mut auth = tempfile::NamedTempFile::with_suffix(".json").unwrap();
    auth.write_all(
        br#"{"dev": {"instance_url": "https://dev.example.com", "access_token": "tok"}}"#,
    )
    .unwrap();
    auth.flush().unwrap();

    cmd()
        .args(["-s", "missing", "-t", "dev", "-o", "Account"])
        .args(["--auth-file", auth.path().to_str().unwrap()])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("unknown org alias 'missing'"))
        .stderr(predicate::str::contains("dev"));
}

#[test]
fn test_invalid_auth_file_rejected() {
    let mut auth = tempfile::NamedTempFile::with_suffix(".json").unwrap();
    auth.write_all(b"not json").unwrap();
    auth.flush().unwrap();

    cmd()
        .args(["-s", "dev", "-t", "qa", "-o", "Account"])
        .args(["--auth-file", auth.path().to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid auth file"));
}
