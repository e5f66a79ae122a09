//! CLI integration tests
//!
//! Tests the revsocks CLI using assert_cmd.

use assert_cmd::Command;
use predicates::prelude::*;

fn revsocks() -> Command {
    Command::cargo_bin("revsocks")
        .expect("Failed to locate revsocks binary - ensure it's built before running tests")
}

/// Loopback endpoint with nothing listening on it
fn dead_endpoint() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("tcp:{}", addr)
}

#[test]
fn test_cli_help() {
    revsocks()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Reverse SOCKS5 tunnel server"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("close"));
}

#[test]
fn test_cli_version() {
    revsocks()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("revsocks"));
}

#[test]
fn test_run_help_lists_transport_flags() {
    revsocks()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--tls"))
        .stdout(predicate::str::contains("--tor"))
        .stdout(predicate::str::contains("--port"));
}

#[test]
fn test_serve_help_explains_remote_bridges() {
    for command in ["run", "start"] {
        revsocks()
            .args([command, "--help"])
            .assert()
            .success()
            .stdout(predicate::str::contains("bridge_host = \"0.0.0.0\""));
    }
}

#[test]
fn test_tls_and_tor_conflict() {
    revsocks()
        .args(["run", "--tls", "--tor"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

#[test]
fn test_close_requires_id() {
    revsocks()
        .arg("close")
        .assert()
        .failure()
        .stderr(predicate::str::contains("<ID>"));
}

#[test]
fn test_invalid_control_endpoint() {
    revsocks()
        .args(["--control", "http://localhost", "ls"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unix:"));
}

#[test]
fn test_stop_when_not_running() {
    revsocks()
        .args(["--control", &dead_endpoint(), "stop"])
        .assert()
        .success()
        .stderr(predicate::str::contains("not running"));
}

#[test]
fn test_ls_when_not_running() {
    revsocks()
        .args(["--control", &dead_endpoint(), "ls"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to list connections"));
}

#[test]
fn test_missing_config_file() {
    revsocks()
        .args(["--config", "/nonexistent/revsocks.toml", "ls"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load config"));
}

#[test]
fn test_unknown_command() {
    revsocks().arg("agent").assert().failure();
}
