//! CLI integration tests
//!
//! Tests the rvz-chat binary using assert_cmd.

use assert_cmd::Command;
use predicates::prelude::*;

fn rvz_chat() -> Command {
    let mut cmd = Command::cargo_bin("rvz-chat")
        .expect("Failed to locate rvz-chat binary - ensure it's built before running tests");
    cmd.env_remove("RVZ_RENDEZVOUS");
    cmd
}

#[test]
fn test_cli_help() {
    rvz_chat()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("rendezvous"))
        .stdout(predicate::str::contains("--listen"));
}

#[test]
fn test_cli_version() {
    rvz_chat()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("rvz-chat"));
}

#[test]
fn test_cli_requires_rendezvous() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");
    std::fs::write(&config, "").unwrap();

    rvz_chat()
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("rendezvous"));
}

#[test]
fn test_cli_rejects_bad_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");
    std::fs::write(&config, "poll_interval = \"soon\"\n").unwrap();

    rvz_chat()
        .args(["--rendezvous", "room", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load config"));
}
