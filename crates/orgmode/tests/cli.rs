//! End-to-end tests for the `orgmode` binary.
#![cfg(feature = "cli")]

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;
use tempfile::NamedTempFile;

fn org_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

fn orgmode() -> Command {
    Command::cargo_bin("orgmode").unwrap()
}

#[test]
fn test_parse_prints_sexp() {
    let file = org_file("* Hello\nworld\n");
    orgmode()
        .arg("parse")
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "(document (section (heading (stars) title: (title (word))) (body (word))))",
        ));
}

#[test]
fn test_parse_json() {
    let file = org_file("- item\n");
    orgmode()
        .args(["parse", "--json"])
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""kind":"list_item""#))
        .stdout(predicate::str::contains(r#""text":"item""#));
}

#[test]
fn test_parse_errors_set_exit_code() {
    let file = org_file(":LOGBOOK:\nnever closed\n");
    orgmode()
        .args(["parse", "--quiet"])
        .arg(file.path())
        .assert()
        .code(1)
        .stdout(predicate::str::is_empty());
}

#[test]
fn test_parse_missing_file() {
    orgmode()
        .args(["parse", "does/not/exist.org"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("does/not/exist.org"));
}

#[test]
fn test_check_bundled_grammar() {
    orgmode()
        .arg("check-grammar")
        .assert()
        .success()
        .stdout(predicate::str::contains("grammar 'orgmode' is valid"));
}

#[test]
fn test_check_invalid_grammar_file() {
    let file = org_file(
        r#"{"name": "bad", "rules": {"document": {"type": "SYMBOL", "name": "nowhere"}}}"#,
    );
    orgmode()
        .arg("check-grammar")
        .arg(file.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("undefined symbol 'nowhere'"));
}

#[test]
fn test_grammar_round_trips_through_check() {
    let output = orgmode().arg("grammar").output().unwrap();
    assert!(output.status.success());
    let file = org_file(&String::from_utf8(output.stdout).unwrap());
    orgmode()
        .arg("check-grammar")
        .arg(file.path())
        .assert()
        .success();
}

#[test]
fn test_unknown_command() {
    orgmode()
        .arg("frobnicate")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unknown command 'frobnicate'"));
}

#[test]
fn test_check_grammar_json_from_tree_sitter() {
    let file = org_file(
        r#"{"name": "orgmode", "rules": {"document": {"type": "CHOICE", "members": [{"type": "STRING", "value": "TODO"}, {"type": "BLANK"}]}}}"#,
    );
    orgmode()
        .arg("check-grammar")
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("grammar 'orgmode' is valid"));
}

#[test]
fn test_check_malformed_grammar_reports_path() {
    let file = org_file("{ not json");
    orgmode()
        .arg("check-grammar")
        .arg(file.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("parsing"))
        .stderr(predicate::str::contains("JSON parse error"));
}
