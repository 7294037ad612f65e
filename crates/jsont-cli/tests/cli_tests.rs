/*
 * cli_tests.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * End-to-end tests for the templatec binary.
 */

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

fn templatec(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_templatec"))
        .current_dir(dir)
        .env("RUST_LOG", "off")
        .args(args)
        .output()
        .expect("Failed to run templatec")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn test_execute_with_json_and_partials() {
    let temp = TempDir::new().expect("Failed to create temp directory");
    fs::write(
        temp.path().join("page.jsont"),
        "{.repeated section people}{@|apply person}{.alternates with}, {.end}",
    )
    .unwrap();
    fs::write(
        temp.path().join("data.json"),
        r#"{"people": [{"name": "Ann"}, {"name": "Bo"}]}"#,
    )
    .unwrap();
    fs::write(temp.path().join("partials.json"), r#"{"person": "<{name}>"}"#).unwrap();

    let output = templatec(
        temp.path(),
        &["--json", "data.json", "--partials", "partials.json", "page.jsont"],
    );
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(stdout(&output), "<Ann>, <Bo>");
}

#[test]
fn test_validate_lists_errors() {
    let temp = TempDir::new().expect("Failed to create temp directory");
    fs::write(temp.path().join("bad.jsont"), "{.section a}\n{b|nope}").unwrap();

    let output = templatec(temp.path(), &["--validate", "bad.jsont"]);
    assert!(!output.status.success());
    let listed = stdout(&output);
    assert!(listed.contains("FORMATTER_UNKNOWN"), "{}", listed);
    assert!(listed.contains("EOF_IN_BLOCK"), "{}", listed);
}

#[test]
fn test_strict_syntax_error_fails() {
    let temp = TempDir::new().expect("Failed to create temp directory");
    fs::write(temp.path().join("bad.jsont"), "x{.end}").unwrap();

    let output = templatec(temp.path(), &["bad.jsont"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("MISMATCHED_END"));
}

#[test]
fn test_safe_mode_keeps_output() {
    let temp = TempDir::new().expect("Failed to create temp directory");
    fs::write(temp.path().join("bad.jsont"), "a{.end}b").unwrap();

    let output = templatec(temp.path(), &["--safe", "bad.jsont"]);
    assert_eq!(stdout(&output), "ab");
    assert!(stderr(&output).contains("MISMATCHED_END"));
    assert!(!output.status.success());
}

#[test]
fn test_stats_report() {
    let temp = TempDir::new().expect("Failed to create temp directory");
    fs::write(temp.path().join("t.jsont"), "{.section a}{b|html}{.end}").unwrap();

    let output = templatec(temp.path(), &["--stats", "t.jsont"]);
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(report["formatters"]["html"], 1);
    assert_eq!(report["instructions"]["SECTION"], 1);
}

#[test]
fn test_tree_output() {
    let temp = TempDir::new().expect("Failed to create temp directory");
    fs::write(temp.path().join("t.jsont"), "{a}").unwrap();

    let output = templatec(temp.path(), &["--tree", "t.jsont"]);
    assert!(output.status.success());
    assert!(stdout(&output).starts_with("VARIABLE {1,1}"));
}

#[test]
fn test_missing_template_file() {
    let temp = TempDir::new().expect("Failed to create temp directory");
    let output = templatec(temp.path(), &["nope.jsont"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("failed to read template"));
}
