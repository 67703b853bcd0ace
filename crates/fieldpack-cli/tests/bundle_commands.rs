// crates/fieldpack-cli/tests/bundle_commands.rs
// ============================================================================
// Module: CLI Bundle Command Tests
// Description: Integration tests driving the fieldpack binary end to end.
// Purpose: Ensure producer and consumer commands honor their exit codes.
// Dependencies: fieldpack-cli binary, serde_json, tempfile
// ============================================================================
//! ## Overview
//! Runs the `fieldpack` binary against a scratch workspace: keys and CAS are
//! initialized, a bundle is sealed, verified, imported twice, and replayed.
//! Refusals exit `2` with a JSON reason; environment failures exit `1`.

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
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

const DELTA: &str = concat!(
    "{\"op\":\"ADD_NODE\",\"id\":\"site-1\",\"type\":\"Doc\",\"attrs\":{\"title\":\"survey\"}}\n",
    "{\"op\":\"ADD_NODE\",\"id\":\"site-2\",\"type\":\"Doc\"}\n",
    "{\"op\":\"ADD_EDGE\",\"src\":\"site-1\",\"dst\":\"site-2\",\"type\":\"CITES\"}\n",
);

fn fieldpack_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_fieldpack"))
}

fn workspace() -> TempDir {
    let dir = TempDir::new().expect("temp dir");
    fs::write(
        dir.path().join("fieldpack.toml"),
        "[producer]\ntoolchain_id = \"fieldpack-node-a\"\n\n[governance]\npolicy = \
         \"meap.yaml\"\nallowlist = \"allowlist.yaml\"\n\n[audit]\nsink = \"none\"\n",
    )
    .expect("write config");
    fs::write(
        dir.path().join("meap.yaml"),
        "policy:\n  name: field-site\n  version: 1\n  mode: AUTO_MERGE\n",
    )
    .expect("write policy");
    fs::write(
        dir.path().join("allowlist.yaml"),
        "allowlist:\n  toolchain_ids:\n    - id: fieldpack-node-a\n      pubkey_path: \
         keys/producer.pub\n",
    )
    .expect("write allowlist");
    fs::write(dir.path().join("delta.jsonl"), DELTA).expect("write delta");
    dir
}

fn run(dir: &Path, args: &[&str]) -> Output {
    Command::new(fieldpack_bin())
        .current_dir(dir)
        .arg("--config")
        .arg(dir.join("fieldpack.toml"))
        .args(args)
        .env_remove("FIELDPACK_CONFIG")
        .output()
        .expect("run fieldpack")
}

fn json_stdout(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).unwrap_or_else(|err| {
        panic!(
            "stdout is not JSON ({err}): {} / stderr: {}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        )
    })
}

fn assert_exit(output: &Output, code: i32) {
    assert_eq!(
        output.status.code(),
        Some(code),
        "stdout: {}\nstderr: {}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

/// Initializes keys and CAS, stores one object, and seals a bundle.
fn sealed_bundle(dir: &Path) -> String {
    assert_exit(&run(dir, &["keys", "init"]), 0);
    assert_exit(&run(dir, &["cas", "init"]), 0);
    fs::write(dir.join("notes.txt"), b"trench 4 field notes").expect("write notes");
    let put = run(dir, &["cas", "put", "--kind", "raw", "notes.txt"]);
    assert_exit(&put, 0);
    assert_eq!(json_stdout(&put)["kind"], "raw");

    let seal = run(
        dir,
        &["seal", "--label", "site-survey", "--created-unix-secs", "1700000000", "--delta", "delta.jsonl"],
    );
    assert_exit(&seal, 0);
    let sealed = json_stdout(&seal);
    assert_eq!(sealed["signed"], true);
    sealed["path"].as_str().expect("bundle path").to_string()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn seal_verify_import_and_replay() {
    let dir = workspace();
    let bundle = sealed_bundle(dir.path());

    let verify = run(dir.path(), &["verify", "--bundle", &bundle]);
    assert_exit(&verify, 0);
    let verified = json_stdout(&verify);
    assert_eq!(verified["ok"], true);
    assert_eq!(verified["toolchain_id"], "fieldpack-node-a");

    let import = run(dir.path(), &["import", "--bundle", &bundle]);
    assert_exit(&import, 0);
    let outcome = json_stdout(&import);
    assert_eq!(outcome["status"], "MERGED");
    assert_eq!(outcome["ops_count"], 3);

    let again = run(dir.path(), &["import", "--bundle", &bundle, "--idempotent"]);
    assert_exit(&again, 0);
    assert_eq!(json_stdout(&again)["status"], "ALREADY_INGESTED");

    let replay = run(dir.path(), &["replay"]);
    assert_exit(&replay, 0);
    assert_eq!(json_stdout(&replay)["match"], true);
}

#[test]
fn cas_get_round_trips_stored_object() {
    let dir = workspace();
    assert_exit(&run(dir.path(), &["cas", "init"]), 0);
    fs::write(dir.path().join("transcript.txt"), b"interview").expect("write input");
    let put = run(dir.path(), &["cas", "put", "--kind", "aux", "transcript.txt"]);
    assert_exit(&put, 0);
    let digest = json_stdout(&put)["digest"].as_str().expect("digest").to_string();

    let get = run(dir.path(), &["cas", "get", "--kind", "aux", &digest, "--out", "copy.txt"]);
    assert_exit(&get, 0);
    assert_eq!(fs::read(dir.path().join("copy.txt")).expect("read copy"), b"interview");
}

#[test]
fn kill_mode_refuses_with_exit_two() {
    let dir = workspace();
    let bundle = sealed_bundle(dir.path());

    let import = run(dir.path(), &["import", "--bundle", &bundle, "--mode", "KILL"]);
    assert_exit(&import, 2);
    let refusal = json_stdout(&import);
    assert_eq!(refusal["ok"], false);
    assert_eq!(refusal["reason"], "policy_mode_kill");

    let staged = run(dir.path(), &["staged", "list"]);
    assert_exit(&staged, 0);
    assert_eq!(json_stdout(&staged), Value::Array(Vec::new()));
}

#[test]
fn tampered_bundle_fails_verification() {
    let dir = workspace();
    let _ = sealed_bundle(dir.path());
    let garbage = dir.path().join("garbage.tar");
    fs::write(&garbage, b"not an archive").expect("write garbage");

    let verify = run(dir.path(), &["verify", "--bundle", &garbage.to_string_lossy()]);
    assert_exit(&verify, 2);
    assert_eq!(json_stdout(&verify)["reason"], "corrupt_bundle");
}

#[test]
fn seal_without_keys_fails_with_exit_one() {
    let dir = workspace();
    assert_exit(&run(dir.path(), &["cas", "init"]), 0);
    let seal = run(dir.path(), &["seal", "--label", "no-keys"]);
    assert_exit(&seal, 1);
    assert!(String::from_utf8_lossy(&seal.stderr).contains("Key management failed"));
}

#[test]
fn config_validate_reports_success_and_missing_file() {
    let dir = workspace();
    let ok = run(dir.path(), &["config", "validate"]);
    assert_exit(&ok, 0);
    assert!(String::from_utf8_lossy(&ok.stdout).contains("Config valid."));

    let missing = Command::new(fieldpack_bin())
        .current_dir(dir.path())
        .args(["--config", "absent.toml", "config", "validate"])
        .env_remove("FIELDPACK_CONFIG")
        .output()
        .expect("run fieldpack");
    assert_exit(&missing, 1);
    assert!(String::from_utf8_lossy(&missing.stderr).contains("Failed to load config"));
}
