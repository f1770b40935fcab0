//! CLI test cases.
//!
//! History tests run fully offline against a temporary store file. The
//! recognition and solve tests need real DashScope credentials, so they are
//! ignored by default; run them with `cargo test -- --ignored` and a
//! `DASHSCOPE_API_KEY` in the environment.

use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;

/// Create a new `Command` with our binary.
fn cmd() -> Command {
    let mut cmd = Command::cargo_bin("snapmath").unwrap();
    // Keep host credentials and .env files out of test runs.
    cmd.env_remove("DASHSCOPE_API_KEY").current_dir(env!("CARGO_TARGET_TMPDIR"));
    cmd
}

#[test]
fn test_help() {
    cmd().arg("--help").assert().success();
}

#[test]
fn test_version() {
    cmd().arg("--version").assert().success();
}

#[test]
fn test_ocr_requires_api_key() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("photo.jpg");
    std::fs::write(&image, vec![0xFFu8; 4096]).unwrap();
    cmd()
        .arg("ocr")
        .arg(&image)
        .assert()
        .failure()
        .stderr(predicate::str::contains("DASHSCOPE_API_KEY"));
}

#[test]
fn test_solve_requires_api_key() {
    cmd()
        .arg("solve")
        .arg("2x + 5 = 15")
        .assert()
        .failure()
        .stderr(predicate::str::contains("DASHSCOPE_API_KEY"));
}

#[test]
fn test_history_list_empty_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("history.json");
    cmd()
        .arg("history")
        .arg("list")
        .arg("--history-file")
        .arg(&store)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"total\": 0"));
}

#[test]
fn test_history_list_filters_parse() {
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("history.json");
    cmd()
        .arg("history")
        .arg("list")
        .arg("--type")
        .arg("equation")
        .arg("--difficulty")
        .arg("easy")
        .arg("--page")
        .arg("2")
        .arg("--limit")
        .arg("5")
        .arg("--history-file")
        .arg(&store)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"page\": 2"));
}

#[test]
fn test_history_delete_missing_entry_fails() {
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("history.json");
    cmd()
        .arg("history")
        .arg("delete")
        .arg("problem_0_00000000")
        .arg("--history-file")
        .arg(&store)
        .assert()
        .failure()
        .stderr(predicate::str::contains("no history entry"));
}

#[test]
fn test_history_clear_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("history.json");
    for _ in 0..2 {
        cmd()
            .arg("history")
            .arg("clear")
            .arg("--history-file")
            .arg(&store)
            .assert()
            .success();
    }
}

#[test]
#[ignore = "Needs a real DASHSCOPE_API_KEY"]
fn test_solve_live() {
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("history.json");
    Command::cargo_bin("snapmath")
        .unwrap()
        .arg("solve")
        .arg("2x + 5 = 15")
        .arg("--method")
        .arg("cot")
        .arg("--json")
        .arg("--history-file")
        .arg(&store)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"type\": \"equation\""));
}

#[test]
#[ignore = "Needs a real DASHSCOPE_API_KEY and a test image"]
fn test_ocr_live() {
    Command::cargo_bin("snapmath")
        .unwrap()
        .arg("ocr")
        .arg("tests/fixtures/equation.jpg")
        .assert()
        .success()
        .stdout(predicate::str::contains("math_expression"));
}
