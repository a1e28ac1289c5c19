//! End-to-end tests of the perfmon binary
#![allow(deprecated)] // suppress assert_cmd::Command::cargo_bin deprecation in tests

mod common;

use std::fs;

use assert_cmd::Command;
use common::{calc_class, shape_interface};
use predicates::prelude::*;
use tempfile::TempDir;

fn perfmon() -> Command {
    Command::cargo_bin("perfmon").unwrap()
}

fn class_tree() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("demo")).unwrap();
    fs::write(dir.path().join("demo/Calc.class"), calc_class(52)).unwrap();
    fs::write(dir.path().join("demo/Shape.class"), shape_interface()).unwrap();
    fs::write(dir.path().join("demo/Broken.class"), &calc_class(52)[..40]).unwrap();
    dir
}

#[test]
fn test_single_file_transform() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("Calc.class");
    let output = dir.path().join("out/Calc.class");
    fs::write(&input, calc_class(49)).unwrap();

    perfmon()
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("demo/Calc: transformed"))
        .stdout(predicate::str::contains("pick(I)I (3 exits)"));

    let written = fs::read(&output).unwrap();
    assert_ne!(written, calc_class(49));
    let class = perfmon::decoder::decode(&written).unwrap();
    assert_eq!(class.name, "demo/Calc");
}

#[test]
fn test_directory_transform_mirrors_tree() {
    let input = class_tree();
    let output = TempDir::new().unwrap();

    perfmon()
        .arg(input.path())
        .arg("-o")
        .arg(output.path())
        .arg("-j")
        .arg("2")
        .arg("-c")
        .assert()
        .success()
        .stdout(predicate::str::contains("demo/Calc: transformed"))
        .stdout(predicate::str::contains("demo/Shape: unchanged (interface)"))
        .stdout(predicate::str::contains("demo/Broken: failed"))
        .stdout(predicate::str::contains(
            "3 classes: 1 transformed, 1 unchanged, 1 failed",
        ));

    // unchanged and failed classes are copied as they were
    assert_eq!(
        fs::read(output.path().join("demo/Shape.class")).unwrap(),
        shape_interface()
    );
    assert_eq!(
        fs::read(output.path().join("demo/Broken.class")).unwrap(),
        &calc_class(52)[..40]
    );
    assert!(output.path().join("demo/Calc.class").exists());
}

#[test]
fn test_json_report() {
    let input = class_tree();
    let assert = perfmon()
        .arg(input.path())
        .arg("--format")
        .arg("json")
        .arg("-c")
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    let json: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(json["format"], "perfmon-json-v1");
    assert_eq!(json["classes"].as_array().unwrap().len(), 3);
    assert_eq!(json["summary"]["transformed"], 1);
    assert_eq!(json["summary"]["failed"], 1);
}

#[test]
fn test_filter_expression() {
    let input = class_tree();
    perfmon()
        .arg(input.path())
        .arg("-e")
        .arg("exclude=demo.Calc")
        .assert()
        .success()
        .stdout(predicate::str::contains("demo/Calc: unchanged (filtered)"));
}

#[test]
fn test_include_reaches_into_runtime_package() {
    let input = TempDir::new().unwrap();
    fs::create_dir_all(input.path().join("com/sun/tools/javac")).unwrap();
    fs::write(
        input.path().join("com/sun/tools/javac/Calc.class"),
        calc_class(52),
    )
    .unwrap();

    perfmon()
        .arg(input.path())
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "com/sun/tools/javac/Calc: unchanged (filtered)",
        ));

    perfmon()
        .arg(input.path())
        .arg("-e")
        .arg("include=com.sun.tools.javac")
        .assert()
        .success()
        .stdout(predicate::str::contains("com/sun/tools/javac/Calc: transformed"));
}

#[test]
fn test_invalid_filter_expression() {
    let input = class_tree();
    perfmon()
        .arg(input.path())
        .arg("-e")
        .arg("trace=open")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid filter expression"));
}

#[test]
fn test_inspect_text() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("Calc.class");
    fs::write(&input, calc_class(52)).unwrap();
    perfmon()
        .arg("--inspect")
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("class demo/Calc (version 52.0)"))
        .stdout(predicate::str::contains("extends java/lang/Object"))
        .stdout(predicate::str::contains("method nativeCall()V [no body]"));
}

#[test]
fn test_inspect_json() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("Shape.class");
    fs::write(&input, shape_interface()).unwrap();
    let assert = perfmon()
        .arg("--inspect")
        .arg("--format")
        .arg("json")
        .arg(&input)
        .assert()
        .success();
    let json: serde_json::Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    assert_eq!(json[0]["name"], "demo/Shape");
    assert_eq!(json[0]["interface"], true);
    assert_eq!(json[0]["behaviors"].as_array().unwrap().len(), 2);
}

#[test]
fn test_config_file() {
    let input = class_tree();
    let config = input.path().join("perfmon.toml");
    fs::write(&config, "exclude = [\"demo/Calc\"]\njobs = 1\n").unwrap();
    perfmon()
        .arg(input.path())
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("demo/Calc: unchanged (filtered)"));
}

#[test]
fn test_missing_input() {
    perfmon()
        .arg("/nonexistent/Nothing.class")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read input"));
}

#[test]
fn test_profile_self() {
    let input = class_tree();
    perfmon()
        .arg(input.path())
        .arg("--profile-self")
        .assert()
        .success()
        .stderr(predicate::str::contains("Perfmon Self-Profiling Results"));
}
