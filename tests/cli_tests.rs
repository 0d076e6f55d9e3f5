//! Integration tests for the subint command-line front end

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// One method that resolves (`flag`) and one that cannot be typed (`conflict`)
const MIXED_PROGRAM: &str = r#"{
  "methods": [
    {
      "name": "flag",
      "return_type": "void",
      "locals": [{"name": "x", "ty": "int"}],
      "stmts": [
        {"kind": "assign", "dest": 0, "value": {"use": {"int": 1}}},
        {"kind": "compare", "op": "ne", "lhs": {"local": 0}, "rhs": {"int": 0}}
      ]
    },
    {
      "name": "conflict",
      "return_type": "void",
      "locals": [{"name": "x", "ty": "int"}],
      "stmts": [
        {"kind": "assign", "dest": 0, "value": {"use": {"int": 5}}},
        {"kind": "field_access", "access": {"store": {
          "field": {"owner": "A", "name": "c", "ty": "char"}, "base": null, "value": {"local": 0}}}},
        {"kind": "field_access", "access": {"store": {
          "field": {"owner": "A", "name": "s", "ty": "short"}, "base": null, "value": {"local": 0}}}}
      ]
    }
  ]
}"#;

const BOOLEAN_PROGRAM: &str = r#"{
  "methods": [
    {
      "name": "flag",
      "return_type": "void",
      "locals": [{"name": "x", "ty": "int"}],
      "stmts": [
        {"kind": "assign", "dest": 0, "value": {"use": {"int": 1}}},
        {"kind": "compare", "op": "ne", "lhs": {"local": 0}, "rhs": {"int": 0}}
      ]
    }
  ]
}"#;

fn write_input(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

fn subint() -> Command {
    let mut cmd = Command::cargo_bin("subint").unwrap();
    cmd.env("NO_COLOR", "1").env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_cli_help() {
    subint()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Integer sub-type resolution"));
}

#[test]
fn test_cli_version() {
    subint()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_lattice_tables() {
    subint()
        .arg("lattice")
        .assert()
        .success()
        .stdout(predicate::str::contains("boolean"))
        .stdout(predicate::str::contains("[0..32767]"));
}

#[test]
fn test_resolve_prints_types() {
    let temp_dir = TempDir::new().unwrap();
    let input = write_input(temp_dir.path(), "flag.json", BOOLEAN_PROGRAM);

    subint()
        .arg("resolve")
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("flag (optimistic)"))
        .stdout(predicate::str::contains("x: boolean"));
}

#[test]
fn test_failed_method_sets_exit_code() {
    let temp_dir = TempDir::new().unwrap();
    let input = write_input(temp_dir.path(), "mixed.json", MIXED_PROGRAM);

    subint()
        .arg("resolve")
        .arg(&input)
        .assert()
        .failure()
        .stdout(predicate::str::contains("x: boolean"))
        .stdout(predicate::str::contains("forced by statement 1 `A.c = x`"))
        .stderr(predicate::str::contains("1 of 2 methods could not be typed"));
}

#[test]
fn test_json_report_keeps_input_order() {
    let temp_dir = TempDir::new().unwrap();
    let input = write_input(temp_dir.path(), "mixed.json", MIXED_PROGRAM);

    let output = subint()
        .args(["resolve", "--format", "json", "--jobs", "2"])
        .arg(&input)
        .output()
        .unwrap();
    assert!(!output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let entries = report.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["method"], "flag");
    assert_eq!(entries[0]["status"], "ok");
    assert_eq!(entries[0]["resolution"]["assignments"][0]["type"], "boolean");
    assert_eq!(entries[1]["method"], "conflict");
    assert_eq!(entries[1]["kind"], "fatal");
    assert_eq!(entries[1]["statement"], 2);
}

#[test]
fn test_no_fallback_reports_rejection() {
    let temp_dir = TempDir::new().unwrap();
    let input = write_input(temp_dir.path(), "mixed.json", MIXED_PROGRAM);

    let output = subint()
        .args(["resolve", "--format", "json", "--no-fallback"])
        .arg(&input)
        .output()
        .unwrap();
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report[1]["kind"], "rejected");
    assert_eq!(report[1]["statement"], 1);
}

#[test]
fn test_config_file_disables_fallback() {
    let temp_dir = TempDir::new().unwrap();
    let input = write_input(temp_dir.path(), "mixed.json", MIXED_PROGRAM);
    let config = write_input(temp_dir.path(), "subint.json", r#"{"fallback": false}"#);

    subint()
        .arg("resolve")
        .arg(&input)
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stdout(predicate::str::contains("fallback is disabled"));
}

#[test]
fn test_output_file_holds_typed_program() {
    let temp_dir = TempDir::new().unwrap();
    let input = write_input(temp_dir.path(), "flag.json", BOOLEAN_PROGRAM);
    let typed = temp_dir.path().join("typed.json");

    subint()
        .arg("resolve")
        .arg(&input)
        .arg("--output")
        .arg(&typed)
        .assert()
        .success();

    let program: serde_json::Value = serde_json::from_str(&fs::read_to_string(&typed).unwrap()).unwrap();
    assert_eq!(program["methods"][0]["locals"][0]["ty"], "boolean");
}

#[test]
fn test_unreadable_input() {
    let temp_dir = TempDir::new().unwrap();
    let input = write_input(temp_dir.path(), "broken.json", "{ not json");

    subint()
        .arg("resolve")
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to parse"));

    subint()
        .arg("resolve")
        .arg(temp_dir.path().join("missing.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read"));
}
