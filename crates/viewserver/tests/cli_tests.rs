//! Argument parsing and offline behavior of the `viewserver` binary.

use std::process::Command;

use assert_cmd::assert::OutputAssertExt;
use predicates::prelude::*;

fn cli() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("viewserver"));
    cmd.env_remove("ANDROID_SERIAL")
        .env_remove("RUST_LOG")
        .env("NO_COLOR", "1");
    cmd
}

#[test]
fn test_help_lists_subcommands() {
    cli()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("windows"))
        .stdout(predicate::str::contains("dump"))
        .stdout(predicate::str::contains("watch"));
}

#[test]
fn test_version() {
    cli()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("viewserver"));
}

#[test]
fn test_dump_requires_window() {
    cli()
        .arg("dump")
        .assert()
        .failure()
        .stderr(predicate::str::contains("required"));
}

#[test]
fn test_unknown_format_rejected() {
    cli()
        .args(["--format", "xml", "devices"])
        .assert()
        .failure();
}

#[test]
fn test_completions() {
    cli()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("viewserver"));
}

#[test]
fn test_missing_adb_reports_error() {
    cli()
        .args(["--adb", "/nonexistent/adb-binary", "devices"])
        .assert()
        .code(74)
        .stderr(predicate::str::contains("adb failed"))
        .stderr(predicate::str::contains("Suggestion:"));
}

#[test]
fn test_invalid_window_rejected_before_device_lookup() {
    cli()
        .args(["--adb", "/nonexistent/adb-binary", "dump", "zz"])
        .assert()
        .code(65)
        .stderr(predicate::str::contains("Invalid window 'zz'"));
}

#[test]
fn test_no_color_env_accepts_any_value() {
    for value in ["1", "yes", "0"] {
        cli()
            .env("NO_COLOR", value)
            .args(["--adb", "/nonexistent/adb-binary", "devices"])
            .assert()
            .code(74);
    }
}

#[test]
fn test_json_errors_are_structured() {
    cli()
        .args(["--json", "--adb", "/nonexistent/adb-binary", "dump", "zz"])
        .assert()
        .code(65)
        .stderr(predicate::str::contains("\"category\": \"protocol\""))
        .stderr(predicate::str::contains("\"success\": false"));
}
