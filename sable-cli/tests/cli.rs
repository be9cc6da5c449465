use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn sable() -> Command {
    Command::cargo_bin("sable").expect("binary exists")
}

#[test]
fn runs_a_source_file() {
    let dir = tempdir().expect("tempdir");
    let input_path = dir.path().join("main.sb");
    fs::write(&input_path, "let add = [a int, b int] a + b\nprint(add(2,3))")
        .expect("write input");

    sable()
        .arg("--input")
        .arg(&input_path)
        .assert()
        .success()
        .stdout("5\n");
}

#[test]
fn reads_stdin_when_no_input_is_given() {
    sable()
        .write_stdin("if true print(1) else print(0)\n")
        .assert()
        .success()
        .stdout("1\n");
}

#[test]
fn reports_compilation_errors() {
    sable()
        .write_stdin("print(\"a\" + 1)")
        .assert()
        .code(1)
        .stdout("")
        .stderr(predicate::str::starts_with("Compilation Error: "))
        .stderr(predicate::str::contains("+"));
}

#[test]
fn reports_deep_nesting_as_a_compilation_error() {
    let source = format!("print({}1{})", "(".repeat(2000), ")".repeat(2000));
    sable()
        .write_stdin(source)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("nesting too deep"));
}

#[test]
fn writes_the_bytecode_listing() {
    let dir = tempdir().expect("tempdir");
    let input_path = dir.path().join("main.sb");
    fs::write(&input_path, "let x = 5\nprint(x)").expect("write input");
    let output_path = dir.path().join("out/main.txt");

    sable()
        .arg("--input")
        .arg(&input_path)
        .arg("--emit")
        .arg("bytecode")
        .arg("--output")
        .arg(&output_path)
        .assert()
        .success()
        .stdout("");

    let listing = fs::read_to_string(&output_path).expect("read listing");
    assert!(listing.starts_with("block 0 [print,"));
    assert!(listing.contains("PushInt 5"));
    assert!(listing.contains("FunctionCall"));
}

#[test]
fn reports_runtime_errors() {
    sable()
        .write_stdin("print(1)\nprint(4 / 0)")
        .assert()
        .failure()
        .stdout("1\n")
        .stderr(predicate::str::contains("division by zero"));
}

#[test]
fn reports_missing_input_files() {
    let dir = tempdir().expect("tempdir");
    sable()
        .arg("--input")
        .arg(dir.path().join("missing.sb"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read input file"));
}
