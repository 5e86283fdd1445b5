//! Smoke tests for the ensayo CLI
//!
//! These tests verify basic CLI functionality works correctly.

#![allow(deprecated)] // Allow deprecated Command::cargo_bin until assert_cmd is updated
#![allow(clippy::expect_used, clippy::unwrap_used)]

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Get a command for the ensayo binary with a clean environment
fn ensayo() -> Command {
    let mut cmd = Command::cargo_bin("ensayo").expect("ensayo binary should exist");
    cmd.env_remove("ENSAYO_BASE_URL")
        .env_remove("ENSAYO_TIMEOUT_MS")
        .env_remove("ENSAYO_HEADLESS")
        .env_remove("RUST_LOG");
    cmd
}

fn greenkart_scenario() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../scenarios/greenkart.yaml")
}

// ============================================================================
// Basic CLI Tests
// ============================================================================

#[test]
fn test_version_flag() {
    ensayo()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_help_flag() {
    ensayo()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_no_args_shows_help() {
    ensayo().assert().failure();
}

#[test]
fn test_run_subcommand_help() {
    ensayo()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--base-url"))
        .stdout(predicate::str::contains("--headed"));
}

// ============================================================================
// Validate Tests
// ============================================================================

#[test]
fn test_validate_bundled_greenkart_scenario() {
    ensayo()
        .args(["validate", greenkart_scenario().to_str().unwrap()])
        .assert()
        .success()
        .stderr(predicate::str::contains("greenkart-cart"));
}

#[test]
fn test_validate_rejects_unknown_scope() {
    let temp = TempDir::new().expect("create temp dir");
    let path = temp.path().join("bad.yaml");
    let yaml = r"
name: bad-scope
locators:
  - name: qty
    selector: input.quantity
    within: carrot
steps:
  - type: fill
    locator: qty
    value: '5'
";
    fs::write(&path, yaml).expect("write scenario");

    ensayo()
        .args(["validate", path.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("carrot"));
}

#[test]
fn test_validate_invalid_yaml() {
    let temp = TempDir::new().expect("create temp dir");
    let path = temp.path().join("invalid.yaml");
    fs::write(&path, "not: valid: yaml: content").expect("write");

    ensayo()
        .args(["validate", path.to_str().unwrap()])
        .assert()
        .failure();
}

#[test]
fn test_validate_missing_file() {
    ensayo()
        .args(["validate", "/nonexistent/scenario.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

// ============================================================================
// Config Tests
// ============================================================================

#[test]
fn test_config_prints_defaults() {
    let temp = TempDir::new().expect("create temp dir");
    ensayo()
        .current_dir(temp.path())
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("overlay_id: ensayo-test-log"))
        .stdout(predicate::str::contains("headless: true"));
}

#[test]
fn test_config_layers_file_env_and_flags() {
    let temp = TempDir::new().expect("create temp dir");
    fs::write(
        temp.path().join("ensayo.yaml"),
        "base_url: https://file.test/\ntimeout_ms: 9000\n",
    )
    .expect("write config");

    ensayo()
        .current_dir(temp.path())
        .env("ENSAYO_TIMEOUT_MS", "7000")
        .args(["config", "--headed"])
        .assert()
        .success()
        .stdout(predicate::str::contains("https://file.test/"))
        .stdout(predicate::str::contains("timeout_ms: 7000"))
        .stdout(predicate::str::contains("headless: false"));
}

#[test]
fn test_config_flag_overrides_invalid_env_timeout() {
    let temp = TempDir::new().expect("create temp dir");
    ensayo()
        .current_dir(temp.path())
        .env("ENSAYO_TIMEOUT_MS", "0")
        .args(["config", "--timeout-ms", "4000"])
        .assert()
        .success()
        .stdout(predicate::str::contains("timeout_ms: 4000"));

    ensayo()
        .current_dir(temp.path())
        .env("ENSAYO_TIMEOUT_MS", "0")
        .arg("config")
        .assert()
        .failure()
        .stderr(predicate::str::contains("greater than zero"));
}

#[test]
fn test_config_rejects_bad_env() {
    let temp = TempDir::new().expect("create temp dir");
    ensayo()
        .current_dir(temp.path())
        .env("ENSAYO_HEADLESS", "sometimes")
        .arg("config")
        .assert()
        .failure()
        .stderr(predicate::str::contains("ENSAYO_HEADLESS"));
}

// ============================================================================
// Run Tests
// ============================================================================

#[cfg(not(feature = "browser"))]
#[test]
fn test_run_without_browser_feature_fails_clearly() {
    let temp = TempDir::new().expect("create temp dir");
    ensayo()
        .current_dir(temp.path())
        .args(["run", greenkart_scenario().to_str().unwrap(), "-q"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--features browser"));
}
