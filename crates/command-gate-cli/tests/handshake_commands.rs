// crates/command-gate-cli/tests/handshake_commands.rs
// ============================================================================
// Module: CLI Handshake Command Tests
// Description: Integration tests for handshake issue and verify.
// Purpose: Ensure issued envelopes verify and mismatches fail closed.
// Dependencies: command-gate-cli binary
// ============================================================================

//! ## Overview
//! Issues envelopes with the CLI, then verifies them with and without a
//! sandbox request.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::process::Command;
use std::process::Output;

use serde_json::Value;
use serde_json::json;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn command_gate_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_command-gate"))
}

fn run(args: &[&str]) -> Output {
    Command::new(command_gate_bin()).args(args).output().expect("run command-gate")
}

fn stdout_json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout json")
}

fn issue_to_file(dir: &TempDir, args: &[&str]) -> (PathBuf, Value) {
    let mut full = vec!["handshake", "issue"];
    full.extend_from_slice(args);
    let output = run(&full);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let envelope = stdout_json(&output);
    let path = dir.path().join("envelope.json");
    fs::write(&path, serde_json::to_vec(&envelope).unwrap()).expect("write envelope");
    (path, envelope)
}

fn verify(path: &Path, extra: &[&str]) -> Output {
    let path = path.to_string_lossy().to_string();
    let mut args = vec!["handshake", "verify", "--file", path.as_str()];
    args.extend_from_slice(extra);
    run(&args)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

/// Verifies issue normalizes input and scrubs secret metadata.
#[test]
fn cli_handshake_issue_builds_envelope() {
    let dir = TempDir::new().expect("temp dir");
    let (_, envelope) = issue_to_file(
        &dir,
        &[
            "--adapter",
            " local.fs ",
            "--tool",
            "read",
            "--role",
            "student",
            "--ttl-ms",
            "60000",
            "--session",
            "hs-cli",
            "--metadata",
            r#"{"apiKey": "k", "note": "hi"}"#,
        ],
    );
    assert_eq!(envelope["protocol"], json!("command-gate.handshake.v1"));
    assert_eq!(envelope["adapterId"], json!("local.fs"));
    assert_eq!(envelope["toolId"], json!("read"));
    assert_eq!(envelope["role"], json!("student"));
    assert_eq!(envelope["sessionId"], json!("hs-cli"));
    assert_eq!(envelope["metadata"], json!({"note": "hi"}));
    let issued = envelope["issuedAt"].as_u64().unwrap();
    assert_eq!(envelope["expiresAt"].as_u64().unwrap(), issued + 60_000);
}

/// Verifies a blank adapter is rejected.
#[test]
fn cli_handshake_issue_rejects_blank_adapter() {
    let output = run(&["handshake", "issue", "--adapter", "   "]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to issue handshake"), "unexpected stderr: {stderr}");
}

/// Verifies an issued envelope passes verification and sandbox evaluation.
#[test]
fn cli_handshake_verify_allows_matching_request() {
    let dir = TempDir::new().expect("temp dir");
    let (path, _) = issue_to_file(&dir, &["--adapter", "local.fs", "--tool", "read", "--session", "hs-ok"]);

    let output = verify(&path, &["--adapter", "local.fs", "--tool", "read", "--role", "host"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let report = stdout_json(&output);
    assert_eq!(report["valid"], json!(true));
    assert_eq!(report["expired"], json!(false));
    assert_eq!(report["sandbox"]["allowed"], json!(true));
    assert_eq!(report["sandbox"]["reason"], json!("sandbox-allowed"));
    assert_eq!(report["sandbox"]["sessionId"], json!("hs-ok"));
}

/// Verifies a mismatched tool is denied with a failure exit.
#[test]
fn cli_handshake_verify_denies_tool_mismatch() {
    let dir = TempDir::new().expect("temp dir");
    let (path, _) = issue_to_file(&dir, &["--adapter", "local.fs", "--tool", "read"]);

    let output = verify(&path, &["--adapter", "local.fs", "--tool", "write"]);
    assert!(!output.status.success());
    let report = stdout_json(&output);
    assert_eq!(report["sandbox"]["allowed"], json!(false));
    assert_eq!(report["sandbox"]["reason"], json!("tool-mismatch"));
}

/// Verifies a tampered envelope is rejected before any sandbox evaluation.
#[test]
fn cli_handshake_verify_rejects_tampered_envelope() {
    let dir = TempDir::new().expect("temp dir");
    let (path, mut envelope) = issue_to_file(&dir, &["--adapter", "local.fs"]);
    envelope["protocol"] = json!("other.v0");
    fs::write(&path, serde_json::to_vec(&envelope).unwrap()).expect("rewrite envelope");

    let output = verify(&path, &[]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Handshake rejected"), "unexpected stderr: {stderr}");
    assert!(stderr.contains("handshake-protocol-mismatch"), "unexpected stderr: {stderr}");
}

/// Verifies oversized envelope files are refused.
#[test]
fn cli_handshake_verify_refuses_oversized_file() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("huge.json");
    fs::write(&path, format!("\"{}\"", "x".repeat(70 * 1024))).expect("write file");

    let output = verify(&path, &[]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Refusing to read"), "unexpected stderr: {stderr}");
}

fn write_sandbox_config(dir: &TempDir, prefixes: &str) -> PathBuf {
    let path = dir.path().join("command-gate.toml");
    let content = format!(
        "[gateway]\nallowed_origins = [\"https://app.example\"]\ncapability_token = \"cap-verify\"\n\n\
         [sandbox]\nlocal_adapter_prefixes = {prefixes}\n"
    );
    fs::write(&path, content).expect("write config");
    path
}

fn verify_with_config(path: &Path, config: &Path, extra: &[&str]) -> Output {
    let path = path.to_string_lossy().to_string();
    let config = config.to_string_lossy().to_string();
    let mut args = vec!["handshake", "verify", "--file", path.as_str(), "--config", config.as_str()];
    args.extend_from_slice(extra);
    Command::new(command_gate_bin())
        .args(&args)
        .env_remove("COMMAND_GATE_CONFIG")
        .env_remove("COMMAND_GATE_CAPABILITY_TOKEN")
        .env_remove("COMMAND_GATE_ALLOWED_ORIGINS")
        .env_remove("COMMAND_GATE_SESSION_TTL_MS")
        .output()
        .expect("run command-gate")
}

/// Verifies configured prefixes decide which adapters need a handshake.
#[test]
fn cli_handshake_verify_uses_configured_prefixes() {
    let dir = TempDir::new().expect("temp dir");
    let (path, _) = issue_to_file(&dir, &["--adapter", "local.fs", "--tool", "read"]);
    let config = write_sandbox_config(&dir, r#"["ext."]"#);

    let default = verify(&path, &["--adapter", "ext.fs", "--tool", "read"]);
    assert!(default.status.success());
    assert_eq!(stdout_json(&default)["sandbox"]["reason"], json!("sandbox-allowed-non-local-adapter"));

    let gated = verify_with_config(&path, &config, &["--adapter", "ext.fs", "--tool", "read"]);
    assert!(!gated.status.success());
    let report = stdout_json(&gated);
    assert_eq!(report["sandbox"]["allowed"], json!(false));
    assert_eq!(report["sandbox"]["reason"], json!("adapter-mismatch"));

    let ungated = verify_with_config(&path, &config, &["--adapter", "local.fs", "--tool", "read"]);
    assert!(ungated.status.success());
    let report = stdout_json(&ungated);
    assert_eq!(report["sandbox"]["reason"], json!("sandbox-allowed-non-local-adapter"));
    assert_eq!(report["sandbox"]["requiresHandshake"], json!(false));
}

/// Verifies an invalid sandbox section fails verification.
#[test]
fn cli_handshake_verify_rejects_invalid_config() {
    let dir = TempDir::new().expect("temp dir");
    let (path, _) = issue_to_file(&dir, &["--adapter", "local.fs", "--tool", "read"]);
    let config = write_sandbox_config(&dir, "[]");

    let output = verify_with_config(&path, &config, &["--adapter", "local.fs", "--tool", "read"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to load config"), "unexpected stderr: {stderr}");
    assert!(stderr.contains("local_adapter_prefixes"), "unexpected stderr: {stderr}");
}
