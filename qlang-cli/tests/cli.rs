use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn qlang() -> Command {
    Command::cargo_bin("qlang-cli").expect("binary exists")
}

#[test]
fn compiles_to_bytecode_image() {
    let dir = tempdir().expect("tempdir");
    let input_path = dir.path().join("input.q");
    fs::write(&input_path, "let x = 5; let y = x + 3; print_int(y);").expect("write input");
    let output_path = dir.path().join("out/program.qbc");

    qlang()
        .arg("--input")
        .arg(&input_path)
        .arg("--output")
        .arg(&output_path)
        .assert()
        .success();

    let image = fs::read(&output_path).expect("read output");
    assert_eq!(&image[..4], b"QBC1");
}

#[test]
fn emits_listing_from_stdin() {
    let dir = tempdir().expect("tempdir");
    let output_path = dir.path().join("out.txt");

    qlang()
        .arg("--output")
        .arg(&output_path)
        .arg("--emit")
        .arg("listing")
        .write_stdin("let q = quantum 1; quantum measure q;")
        .assert()
        .success();

    let listing = fs::read_to_string(&output_path).expect("read listing");
    assert!(listing.contains("QUANTUM_CONVERT"));
    assert!(listing.contains("QUANTUM_MEASURE"));
}

#[test]
fn emits_ast() {
    let dir = tempdir().expect("tempdir");
    let output_path = dir.path().join("out.txt");

    qlang()
        .arg("--output")
        .arg(&output_path)
        .arg("--emit")
        .arg("ast")
        .write_stdin("1 + 2 * 3;")
        .assert()
        .success();

    let ast = fs::read_to_string(&output_path).expect("read ast");
    assert_eq!(ast, "(program (expr (+ 1 (* 2 3))))\n");
}

#[test]
fn reports_semantic_errors_with_file_name() {
    let dir = tempdir().expect("tempdir");
    let input_path = dir.path().join("bad.q");
    fs::write(&input_path, "foo(1, 2);").expect("write input");
    let output_path = dir.path().join("out.qbc");

    qlang()
        .arg("--input")
        .arg(&input_path)
        .arg("--output")
        .arg(&output_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("bad.q: error[S0001]"))
        .stderr(predicate::str::contains("undefined function 'foo'"));

    assert!(!output_path.exists(), "no output on failure");
}

#[test]
fn check_mode_needs_no_output() {
    qlang()
        .arg("--check")
        .write_stdin("let a = 1; { let a = true; }")
        .assert()
        .success();

    qlang()
        .arg("--check")
        .write_stdin("return 1;")
        .assert()
        .failure()
        .stderr(predicate::str::contains("S0007"));
}

#[test]
fn entanglement_depth_is_configurable() {
    qlang()
        .arg("--check")
        .arg("--max-entanglement-depth")
        .arg("1")
        .write_stdin("1 ~ 2 ~ 3;")
        .assert()
        .failure()
        .stderr(predicate::str::contains("S0006"));
}

#[test]
fn pool_limit_is_reported() {
    let dir = tempdir().expect("tempdir");
    let output_path = dir.path().join("out.qbc");

    qlang()
        .arg("--output")
        .arg(&output_path)
        .arg("--max-pool-entries")
        .arg("2")
        .write_stdin("let a = 1; let b = 2;")
        .assert()
        .failure()
        .stderr(predicate::str::contains("pool exhausted"));
}

#[test]
fn reports_syntax_errors() {
    let dir = tempdir().expect("tempdir");
    let output_path = dir.path().join("out.qbc");

    qlang()
        .arg("--output")
        .arg(&output_path)
        .write_stdin("let = 1;")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unexpected"));
}

#[test]
fn rejects_unknown_format() {
    let dir = tempdir().expect("tempdir");
    let output_path = dir.path().join("out");

    qlang()
        .arg("--output")
        .arg(&output_path)
        .arg("--emit")
        .arg("wasm")
        .write_stdin("1;")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported emit format: wasm"));
}

#[test]
fn deep_nesting_fails_cleanly() {
    qlang()
        .arg("--check")
        .write_stdin(format!("{}1;", "-".repeat(100_000)))
        .assert()
        .failure()
        .stderr(predicate::str::contains("nesting deeper than"));
}

#[test]
fn calls_may_precede_function_declarations() {
    let dir = tempdir().expect("tempdir");
    let output_path = dir.path().join("out.txt");

    qlang()
        .arg("--output")
        .arg(&output_path)
        .arg("--emit")
        .arg("listing")
        .write_stdin("main(); function main() { print_int(helper()); } function helper(): int { return 1; }")
        .assert()
        .success();

    let listing = fs::read_to_string(&output_path).expect("read listing");
    assert!(listing.contains("DECLARE_FUNC"));
}
