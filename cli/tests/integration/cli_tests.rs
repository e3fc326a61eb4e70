//! End-to-end behavior of the `vbmc` binary.

#![allow(clippy::expect_used)]

use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread::JoinHandle;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// `vbmc` with an isolated config pointing at `port`.
fn vbmc(home: &TempDir, port: u16) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("vbmc"));
    cmd.env("NO_COLOR", "1")
        .env("VBMC_CONFIG", home.path().join("config.yaml"))
        .env("VBMC_CONFIG_DIR", home.path())
        .env("VBMC_SERVER_PORT", port.to_string())
        .env("VBMC_SERVER_RESPONSE_TIMEOUT_MS", "5000");
    cmd
}

/// Answer one request with `reply`, returning the raw request.
fn fake_vbmcd(reply: &'static str) -> (u16, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("local addr").port();
    let handle = std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        let mut request = String::new();
        stream.read_to_string(&mut request).expect("read request");
        stream.write_all(reply.as_bytes()).expect("write reply");
        request
    });
    (port, handle)
}

fn unused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    listener.local_addr().expect("local addr").port()
}

// --- Help and version ---

#[test]
fn no_args_shows_help_and_exits_two() {
    Command::new(assert_cmd::cargo::cargo_bin!("vbmc"))
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn help_lists_commands() {
    Command::new(assert_cmd::cargo::cargo_bin!("vbmc"))
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Commands:"))
        .stdout(predicate::str::contains("--no-daemon"));
}

#[test]
fn version_flag_shows_version() {
    Command::new(assert_cmd::cargo::cargo_bin!("vbmc"))
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("vbmc"));
}

#[test]
fn add_without_backend_type_is_a_usage_error() {
    let home = TempDir::new().expect("tempdir");
    vbmc(&home, unused_port())
        .args(["add", "bmc1"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--backend-type"));
}

// --- Exchanges ---

#[test]
fn no_daemon_without_supervisor_fails_to_connect() {
    let home = TempDir::new().expect("tempdir");
    vbmc(&home, unused_port())
        .args(["--no-daemon", "list"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("failed to connect to vbmcd"));
}

#[test]
fn list_is_rendered_sorted() {
    let home = TempDir::new().expect("tempdir");
    let (port, server) = fake_vbmcd(
        r#"{"rc":0,"header":["name","status"],"rows":[["bmc2","down"],["bmc1","running"]]}"#,
    );
    let assert = vbmc(&home, port).args(["--no-daemon", "list"]).assert().success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    let bmc1 = stdout.find("bmc1").expect("bmc1 listed");
    let bmc2 = stdout.find("bmc2").expect("bmc2 listed");
    assert!(bmc1 < bmc2, "rows not sorted:\n{stdout}");

    let request: serde_json::Value =
        serde_json::from_str(&server.join().expect("server thread")).expect("json request");
    assert_eq!(request["command"], "list");
}

#[test]
fn server_rc_becomes_exit_code() {
    let home = TempDir::new().expect("tempdir");
    let (port, server) = fake_vbmcd(r#"{"rc":2,"msg":"BMC instance 'bmc9' not found"}"#);
    vbmc(&home, port)
        .args(["--no-daemon", "show", "bmc9"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("(2): BMC instance 'bmc9' not found"));
    let request: serde_json::Value =
        serde_json::from_str(&server.join().expect("server thread")).expect("json request");
    assert_eq!(request["command"], "show");
    assert_eq!(request["name"], "bmc9");
}

#[test]
fn multi_name_failures_are_listed() {
    let home = TempDir::new().expect("tempdir");
    let (port, server) = fake_vbmcd(
        r#"{"rc":2,"msg":["BMC instance 'a' not found","BMC instance 'b' not found"]}"#,
    );
    vbmc(&home, port)
        .args(["--no-daemon", "stop", "a", "b"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("'a' not found"))
        .stderr(predicate::str::contains("'b' not found"));
    let request: serde_json::Value =
        serde_json::from_str(&server.join().expect("server thread")).expect("json request");
    assert_eq!(request["names"], serde_json::json!(["a", "b"]));
}

#[test]
fn json_flag_prints_the_response_document() {
    let home = TempDir::new().expect("tempdir");
    let (port, _server) = fake_vbmcd(r#"{"rc":0,"msg":""}"#);
    let assert = vbmc(&home, port)
        .args(["--no-daemon", "--json", "start", "bmc1"])
        .assert()
        .success();
    let doc: serde_json::Value =
        serde_json::from_slice(&assert.get_output().stdout).expect("json output");
    assert_eq!(doc["rc"], 0);
}

#[test]
fn undecodable_response_fails() {
    let home = TempDir::new().expect("tempdir");
    let (port, _server) = fake_vbmcd("not json");
    vbmc(&home, port)
        .args(["--no-daemon", "list"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("cannot decode"));
}

#[test]
fn stream_is_half_closed_after_the_request() {
    let home = TempDir::new().expect("tempdir");
    let (port, server) = fake_vbmcd(r#"{"rc":0,"msg":""}"#);
    vbmc(&home, port).args(["--no-daemon", "delete", "x"]).assert().success();
    // the fake only replies after reading to EOF
    assert!(server.join().expect("server thread").contains("\"delete\""));
}
