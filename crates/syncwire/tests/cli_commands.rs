#![cfg(all(unix, feature = "cli"))]

use std::net::TcpListener;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const SECRET: &str = "8f0e3a1c5b7d9f2e4a6c8e0b2d4f6a8c1e3b5d7f9a2c4e6b8d0f1a3c5e7b9d2f";

fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind should succeed");
    listener.local_addr().expect("local addr").port()
}

fn syncwire() -> Command {
    Command::new(env!("CARGO_BIN_EXE_syncwire"))
}

#[test]
fn send_reaches_listener() {
    let addr = format!("127.0.0.1:{}", free_port());

    let listener = syncwire()
        .args(["--log-level", "error", "--format", "json", "listen", &addr])
        .args(["--secret", SECRET, "--count", "3"])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("listen command should start");

    let start = Instant::now();
    let send = loop {
        let output = syncwire()
            .args(["--log-level", "error", "--format", "json", "send", &addr])
            .args(["--secret", SECRET, "-m", "hello", "-m", "world"])
            .output()
            .expect("send should run");
        if output.status.success() || start.elapsed() > Duration::from_secs(5) {
            break output;
        }
        thread::sleep(Duration::from_millis(50));
    };
    assert!(send.status.success(), "send failed: {send:?}");
    let summary: serde_json::Value =
        serde_json::from_slice(&send.stdout).expect("send should emit json");
    assert_eq!(summary["messages"].as_array().map(Vec::len), Some(2));

    let output = listener.wait_with_output().expect("listener should exit");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let kinds: Vec<String> = stdout
        .lines()
        .map(|line| {
            let value: serde_json::Value = serde_json::from_str(line).expect("json line");
            value["kind"].as_str().unwrap_or_default().to_string()
        })
        .collect();
    assert_eq!(kinds, vec!["offer", "message", "message"]);
    assert!(stdout.contains("\"payload\":\"hello\""));
    assert!(stdout.contains("\"payload\":\"world\""));
}

#[test]
fn keygen_emits_a_usable_secret() {
    let output = syncwire()
        .args(["--format", "json", "keygen"])
        .output()
        .expect("keygen should run");
    assert!(output.status.success());
    let value: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("keygen should emit json");
    let secret = value["secret"].as_str().expect("secret field");
    assert_eq!(hex::decode(secret).expect("hex secret").len(), 32);
}

#[test]
fn bad_secret_is_a_usage_error() {
    let output = syncwire()
        .args(["send", "127.0.0.1:9", "--secret", "abcd", "-m", "x"])
        .output()
        .expect("send should run");
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn send_without_listener_fails() {
    let addr = format!("127.0.0.1:{}", free_port());
    let output = syncwire()
        .args(["send", &addr, "--secret", SECRET, "-m", "x", "--timeout", "1s"])
        .output()
        .expect("send should run");
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn version_reports_package_version() {
    let output = syncwire().arg("version").output().expect("version should run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
}
