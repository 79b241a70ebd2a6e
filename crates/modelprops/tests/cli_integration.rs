//! CLI integration tests for the modelprops command-line interface.
//!
//! These tests cover argument parsing, help output and configuration errors.
//! None of them reach the network.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// A modelprops command isolated from the user's config and environment.
fn modelprops(config_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("modelprops").unwrap();
    cmd.env("MODELPROPS_CONFIG_DIR", config_dir.path())
        .env_remove("MODELPROPS_CONFIG")
        .env_remove("MODELPROPS_PROJECT")
        .env_remove("MODELPROPS_DESIGN")
        .env_remove("APS_ACCESS_TOKEN")
        .env_remove("OPENAI_API_KEY")
        .current_dir(config_dir.path());
    cmd
}

// ─────────────────────────────────────────────────────────────────────────────
// Help and Version Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_help_lists_subcommands() {
    let dir = TempDir::new().unwrap();
    modelprops(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("ask"))
        .stdout(predicate::str::contains("chat"))
        .stdout(predicate::str::contains("inspect"));
}

#[test]
fn test_version_displays() {
    let dir = TempDir::new().unwrap();
    modelprops(&dir)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("modelprops"));
}

#[test]
fn test_ask_help_shows_design_flags() {
    let dir = TempDir::new().unwrap();
    modelprops(&dir)
        .args(["ask", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--project"))
        .stdout(predicate::str::contains("--design"))
        .stdout(predicate::str::contains("--token"));
}

#[test]
fn test_global_flags_accepted() {
    let dir = TempDir::new().unwrap();
    modelprops(&dir)
        .args(["--verbose", "--json", "inspect", "--help"])
        .assert()
        .success();
}

// ─────────────────────────────────────────────────────────────────────────────
// Argument Errors
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_ask_requires_design() {
    let dir = TempDir::new().unwrap();
    modelprops(&dir)
        .args(["ask", "--token", "t", "how many walls?"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--project"));
}

#[test]
fn test_ask_requires_prompt() {
    let dir = TempDir::new().unwrap();
    modelprops(&dir)
        .args(["ask", "-p", "b.proj", "-d", "urn:v1", "--token", "t"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("PROMPT"));
}

#[test]
fn test_unknown_subcommand_rejected() {
    let dir = TempDir::new().unwrap();
    modelprops(&dir).arg("serve").assert().failure();
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration Errors
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_missing_api_key_reported() {
    let dir = TempDir::new().unwrap();
    modelprops(&dir)
        .args(["ask", "-p", "b.proj", "-d", "urn:v1", "--token", "t", "hi"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("OPENAI_API_KEY"));
}

#[test]
fn test_invalid_config_file_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "[agent]\nmax_results = 0\n").unwrap();

    modelprops(&dir)
        .arg("--config")
        .arg(&path)
        .args(["ask", "-p", "b.proj", "-d", "urn:v1", "--token", "t", "hi"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("agent.max_results"));
}

#[test]
fn test_blank_token_rejected() {
    let dir = TempDir::new().unwrap();
    modelprops(&dir)
        .env("OPENAI_API_KEY", "sk-test")
        .args(["inspect", "-p", "b.proj", "-d", "urn:v1", "--token", " "])
        .assert()
        .failure()
        .stderr(predicate::str::contains("access token is empty"));
}
