//! Config load validation tests for fieldpack-config.
// crates/fieldpack-config/tests/load_validation.rs
// =============================================================================
// Module: Config Load Validation Tests
// Description: Validate config loading guards and section validation.
// Purpose: Ensure config input handling is strict and fail-closed.
// =============================================================================

use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use fieldpack_config::AuditSinkKind;
use fieldpack_config::ConfigError;
use fieldpack_config::FieldpackConfig;
use fieldpack_store_sqlite::SqliteStoreMode;
use tempfile::NamedTempFile;
use tempfile::TempDir;

type TestResult = Result<(), String>;

fn assert_invalid(result: Result<FieldpackConfig, ConfigError>, needle: &str) -> TestResult {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error {message} did not contain {needle}"))
            }
        }
        Ok(_) => Err("expected invalid config load".to_string()),
    }
}

#[test]
fn load_rejects_path_too_long() -> TestResult {
    let long_path = "a".repeat(5_000);
    assert_invalid(FieldpackConfig::load(Some(Path::new(&long_path))), "config path exceeds max length")
}

#[test]
fn load_rejects_path_component_too_long() -> TestResult {
    let long_component = "a".repeat(300);
    assert_invalid(
        FieldpackConfig::load(Some(Path::new(&long_component))),
        "config path component too long",
    )
}

#[test]
fn load_rejects_oversized_file() -> TestResult {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    file.write_all(&vec![b'#'; 1_048_577]).map_err(|err| err.to_string())?;
    assert_invalid(FieldpackConfig::load(Some(file.path())), "config file exceeds size limit")
}

#[test]
fn load_rejects_non_utf8_file() -> TestResult {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    file.write_all(&[0xFF, 0xFE, 0xFF]).map_err(|err| err.to_string())?;
    assert_invalid(FieldpackConfig::load(Some(file.path())), "config file must be utf-8")
}

#[test]
fn load_reports_missing_file_as_io() -> TestResult {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    match FieldpackConfig::load(Some(&dir.path().join("absent.toml"))) {
        Err(ConfigError::Io(_)) => Ok(()),
        other => Err(format!("expected io error, got {}", other.is_ok())),
    }
}

#[test]
fn empty_document_yields_defaults() -> TestResult {
    let config = FieldpackConfig::from_toml_str("").map_err(|err| err.to_string())?;
    if config.producer.toolchain_id != "fieldpack-node-a" {
        return Err("default toolchain id not applied".to_string());
    }
    if config.accept.limits().max_new_nodes != 2_000 {
        return Err("default accept limits not applied".to_string());
    }
    if config.audit.sink != AuditSinkKind::Stderr || config.paths.graph_ledger.is_some() {
        return Err("default audit or ledger settings not applied".to_string());
    }
    Ok(())
}

#[test]
fn load_resolves_paths_against_config_dir() -> TestResult {
    let dir = TempDir::new().map_err(|err| err.to_string())?;
    let path = dir.path().join("fieldpack.toml");
    std::fs::write(
        &path,
        "[paths]\ncas_root = \"data/cas\"\ngraph_ledger = \"ledger.jsonl\"\n\n[store]\npath = \
         \"db/fieldpack.sqlite3\"\njournal_mode = \"delete\"\n",
    )
    .map_err(|err| err.to_string())?;
    let config = FieldpackConfig::load(Some(&path)).map_err(|err| err.to_string())?;
    if config.resolve(&config.paths.cas_root) != dir.path().join("data/cas") {
        return Err("cas root not resolved against config dir".to_string());
    }
    let store = config.store_config();
    if store.path != dir.path().join("db/fieldpack.sqlite3") {
        return Err("store path not resolved".to_string());
    }
    if store.journal_mode != SqliteStoreMode::Delete || store.busy_timeout_ms != 5_000 {
        return Err("store pragmas not parsed".to_string());
    }
    if config.graph_ledger_path() != Some(dir.path().join(PathBuf::from("ledger.jsonl"))) {
        return Err("graph ledger not resolved".to_string());
    }
    Ok(())
}

#[test]
fn unknown_keys_fail_closed() -> TestResult {
    assert_invalid(FieldpackConfig::from_toml_str("[producer]\nsigning = false\n"), "config parse error")?;
    assert_invalid(FieldpackConfig::from_toml_str("[telemetry]\nenabled = true\n"), "config parse error")
}

#[test]
fn toolchain_id_must_use_safe_characters() -> TestResult {
    assert_invalid(
        FieldpackConfig::from_toml_str("[producer]\ntoolchain_id = \"\"\n"),
        "producer.toolchain_id must be non-empty",
    )?;
    assert_invalid(
        FieldpackConfig::from_toml_str("[producer]\ntoolchain_id = \"node a/1\"\n"),
        "producer.toolchain_id contains invalid characters",
    )
}

#[test]
fn accept_limits_must_be_positive() -> TestResult {
    assert_invalid(
        FieldpackConfig::from_toml_str("[accept]\nmax_new_edges = 0\n"),
        "accept.max_new_edges must be positive",
    )
}

#[test]
fn file_audit_sink_requires_path() -> TestResult {
    assert_invalid(
        FieldpackConfig::from_toml_str("[audit]\nsink = \"file\"\n"),
        "audit.path is required",
    )?;
    let config = FieldpackConfig::from_toml_str("[audit]\nsink = \"file\"\npath = \"audit.jsonl\"\n")
        .map_err(|err| err.to_string())?;
    if config.audit.sink != AuditSinkKind::File {
        return Err("file sink not parsed".to_string());
    }
    Ok(())
}

#[test]
fn key_paths_must_differ() -> TestResult {
    assert_invalid(
        FieldpackConfig::from_toml_str(
            "[paths]\nsigning_key = \"keys/k\"\npublic_key = \"keys/k\"\n",
        ),
        "must differ",
    )
}
