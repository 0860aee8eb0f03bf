//! Integration tests for the `rescuelink` binary.
//!
//! Argument parsing, config management and one-shot snapshots against a
//! mocked backend. Nothing here touches the user's real configuration.
#![allow(clippy::unwrap_used)]

use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::{Value, json};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a command with env isolation and the config file at `config`.
fn rescuelink_cmd(config: &Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("rescuelink");
    cmd.env("RESCUELINK_CONFIG", config)
        .env("HOME", "/tmp/rescuelink-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/rescuelink-cli-test-nonexistent")
        .env("NO_COLOR", "1")
        .env_remove("RESCUELINK_PROFILE")
        .env_remove("RESCUELINK_API_URL")
        .env_remove("RESCUELINK_PUSH_URL")
        .env_remove("RESCUELINK_TOKEN")
        .env_remove("RESCUELINK_OUTPUT")
        .env_remove("RESCUELINK_INSECURE")
        .env_remove("RUST_LOG");
    cmd
}

fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

fn alert(id: &str, device: &str, minute: u32, resolved: bool) -> Value {
    json!({
        "alert_id": id,
        "device_id": device,
        "severity": "High",
        "message": "SOS triggered",
        "timestamp": format!("2026-03-01T12:{minute:02}:00Z"),
        "resolved_status": resolved,
    })
}

async fn backend(alerts: Value) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/alerts"))
        .and(header("authorization", "Bearer tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(alerts))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "device_id": "D1", "battery_level": 81 },
            { "device_id": "D2", "battery_level": 40 }
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/devices/my-devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "device_id": "D1", "battery_level": 81 }
        ])))
        .mount(&server)
        .await;
    server
}

fn backend_args(server: &MockServer) -> Vec<String> {
    vec![
        "--api-url".into(),
        format!("{}/api/v1/", server.uri()),
        "--push-url".into(),
        "ws://127.0.0.1:9/ws".into(),
        "--token".into(),
        "tok".into(),
    ]
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let dir = tempfile::tempdir().unwrap();
    let output = rescuelink_cmd(&dir.path().join("config.toml"))
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("Usage"));
}

#[test]
fn test_help_lists_commands() {
    let dir = tempfile::tempdir().unwrap();
    rescuelink_cmd(&dir.path().join("config.toml"))
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("watch")
                .and(predicate::str::contains("snapshot"))
                .and(predicate::str::contains("config")),
        );
}

#[test]
fn test_version_flag() {
    let dir = tempfile::tempdir().unwrap();
    rescuelink_cmd(&dir.path().join("config.toml"))
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("rescuelink"));
}

// ── Configuration ───────────────────────────────────────────────────

#[test]
fn test_snapshot_without_backend_explains_setup() {
    let dir = tempfile::tempdir().unwrap();
    rescuelink_cmd(&dir.path().join("config.toml"))
        .arg("snapshot")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("No backend configured"));
}

#[test]
fn test_unknown_profile_lists_available() {
    let dir = tempfile::tempdir().unwrap();
    rescuelink_cmd(&dir.path().join("config.toml"))
        .args(["--profile", "nope", "snapshot"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Profile 'nope' not found"));
}

#[test]
fn test_config_path_honors_override() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("custom.toml");
    rescuelink_cmd(&config)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("custom.toml"));
}

#[test]
fn test_config_init_then_show_redacts_token() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");

    rescuelink_cmd(&config)
        .args([
            "config",
            "init",
            "--name",
            "hq",
            "--poll-interval",
            "15",
            "--api-url",
            "https://hq.example/api/v1/",
            "--push-url",
            "wss://hq.example/ws",
            "--token",
            "super-secret",
        ])
        .assert()
        .success();

    let written = std::fs::read_to_string(&config).unwrap();
    assert!(written.contains("default_profile = \"hq\""));
    assert!(written.contains("poll_interval_secs = 15"));

    rescuelink_cmd(&config)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("wss://hq.example/ws")
                .and(predicate::str::contains("super-secret").not()),
        );

    rescuelink_cmd(&config)
        .args(["config", "profiles"])
        .assert()
        .success()
        .stdout(predicate::str::contains("* hq"));
}

#[test]
fn test_config_init_requires_push_url() {
    let dir = tempfile::tempdir().unwrap();
    rescuelink_cmd(&dir.path().join("config.toml"))
        .args(["config", "init", "--api-url", "https://hq.example/api/v1/"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--push-url is required"));
}

#[test]
fn test_config_use_rejects_unknown_profile() {
    let dir = tempfile::tempdir().unwrap();
    rescuelink_cmd(&dir.path().join("config.toml"))
        .args(["config", "use", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("ghost"));
}

// ── Snapshot ────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn test_snapshot_prints_alerts_newest_first() {
    let server = backend(json!([
        alert("A1", "D1", 0, false),
        alert("A2", "D2", 5, false),
    ]))
    .await;
    let dir = tempfile::tempdir().unwrap();

    let output = rescuelink_cmd(&dir.path().join("config.toml"))
        .args(backend_args(&server))
        .args(["snapshot", "alerts", "-o", "json"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", combined_output(&output));

    let records: Vec<Value> = serde_json::from_slice(&output.stdout).unwrap();
    let ids: Vec<_> = records.iter().map(|r| r["id"].as_str().unwrap()).collect();
    assert_eq!(ids, ["A2", "A1"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_snapshot_scopes_to_owned_devices() {
    let server = backend(json!([
        alert("A1", "D1", 0, false),
        alert("A2", "D2", 5, false),
        alert("A3", "D1", 9, true),
    ]))
    .await;
    let dir = tempfile::tempdir().unwrap();

    rescuelink_cmd(&dir.path().join("config.toml"))
        .args(backend_args(&server))
        .args(["snapshot", "--role", "user", "--owned", "D1", "-o", "plain"])
        .assert()
        .success()
        .stdout("A3\nA1\n");

    rescuelink_cmd(&dir.path().join("config.toml"))
        .args(backend_args(&server))
        .args(["snapshot", "--role", "user", "--owned", "D1", "--unresolved", "-o", "plain"])
        .assert()
        .success()
        .stdout("A1\n");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_snapshot_rejected_token_exits_with_auth_code() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({ "detail": "Token expired" })),
        )
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();

    rescuelink_cmd(&dir.path().join("config.toml"))
        .args(backend_args(&server))
        .arg("snapshot")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("rejected the session token"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_snapshot_devices_table() {
    let server = backend(json!([])).await;
    let dir = tempfile::tempdir().unwrap();

    rescuelink_cmd(&dir.path().join("config.toml"))
        .args(backend_args(&server))
        .args(["snapshot", "devices"])
        .assert()
        .success()
        .stdout(predicate::str::contains("D1").and(predicate::str::contains("81")));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_snapshot_devices_for_user_lists_only_owned_devices() {
    let server = backend(json!([])).await;
    let dir = tempfile::tempdir().unwrap();

    // D2 is claimed locally but the backend's owner list only has D1.
    rescuelink_cmd(&dir.path().join("config.toml"))
        .args(backend_args(&server))
        .args(["snapshot", "devices", "--role", "user", "--owned", "D1,D2", "-o", "plain"])
        .assert()
        .success()
        .stdout("D1\n");
}
