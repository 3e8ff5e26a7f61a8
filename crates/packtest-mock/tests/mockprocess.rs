//! Black-box tests of the `mockprocess` executor binary.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::path::Path;
use std::process::{Command, Output};

use packtest_common::constants::{MOCK_PROCESS_FAILURE_EXIT_CODE, MOCK_PROCESS_MAP_ENV};
use packtest_mock::registry::{Mock, MockRegistry};

fn mockprocess(cwd: &Path, registry: Option<&str>, args: &[&str]) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_mockprocess"));
    let _ = cmd.args(args).current_dir(cwd).env_remove(MOCK_PROCESS_MAP_ENV);
    if let Some(value) = registry {
        let _ = cmd.env(MOCK_PROCESS_MAP_ENV, value);
    }
    cmd.output().expect("spawn mockprocess")
}

fn encode(mocks: impl IntoIterator<Item = Mock>) -> String {
    mocks
        .into_iter()
        .collect::<MockRegistry>()
        .to_env_value()
        .expect("encode")
}

#[test]
fn matched_mock_output_is_byte_exact() {
    let dir = tempfile::tempdir().expect("tempdir");
    let registry = encode([Mock::new("npm list @angular/cli")
        .with_stdout("{\n  \"version\": \"17.0.0\"\n}")
        .with_stderr("npm WARN config")
        .with_exit_code(3)]);

    let out = mockprocess(dir.path(), Some(&registry), &["npm", "list", "@angular/cli", "--json"]);

    assert_eq!(out.status.code(), Some(3));
    assert_eq!(out.stdout, b"{\n  \"version\": \"17.0.0\"\n}");
    assert_eq!(out.stderr, b"npm WARN config");
}

#[test]
fn first_declared_mock_wins() {
    let dir = tempfile::tempdir().expect("tempdir");
    let registry = encode([
        Mock::new("npm").with_stdout("first"),
        Mock::new("npm install").with_stdout("second"),
    ]);

    let out = mockprocess(dir.path(), Some(&registry), &["npm", "install", "x"]);

    assert!(out.status.success());
    assert_eq!(out.stdout, b"first");
}

#[test]
fn unmocked_command_succeeds_silently() {
    let dir = tempfile::tempdir().expect("tempdir");
    let registry = encode([Mock::new("yarn").with_exit_code(1)]);

    let out = mockprocess(dir.path(), Some(&registry), &["node", "--version"]);

    assert_eq!(out.status.code(), Some(0));
    assert!(out.stdout.is_empty());
    assert!(out.stderr.is_empty());
}

#[test]
fn missing_registry_is_fatal() {
    let dir = tempfile::tempdir().expect("tempdir");

    let out = mockprocess(dir.path(), None, &["npm", "install"]);

    assert_eq!(out.status.code(), Some(MOCK_PROCESS_FAILURE_EXIT_CODE));
    assert!(out.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains(MOCK_PROCESS_MAP_ENV), "{stderr}");
}

#[test]
fn malformed_registry_is_fatal() {
    let dir = tempfile::tempdir().expect("tempdir");

    let out = mockprocess(dir.path(), Some("{not json"), &["npm", "install"]);

    assert_eq!(out.status.code(), Some(MOCK_PROCESS_FAILURE_EXIT_CODE));
    assert!(out.stdout.is_empty());
}

#[test]
fn move_paths_are_applied_relative_to_cwd() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("downloaded.tgz"), "payload").expect("write");
    let registry = encode([Mock::new("curl")
        .with_stdout("fetched")
        .with_move_path("cache/node.tgz", "downloaded.tgz")]);

    let out = mockprocess(dir.path(), Some(&registry), &["curl", "-o", "node.tgz"]);

    assert!(out.status.success());
    assert_eq!(out.stdout, b"fetched");
    assert!(!dir.path().join("downloaded.tgz").exists());
    let moved = std::fs::read_to_string(dir.path().join("cache/node.tgz")).expect("read");
    assert_eq!(moved, "payload");
}

#[test]
fn failed_move_is_fatal_and_prints_no_mock_output() {
    let dir = tempfile::tempdir().expect("tempdir");
    let registry = encode([Mock::new("curl")
        .with_stdout("fetched")
        .with_move_path("dest", "does-not-exist")]);

    let out = mockprocess(dir.path(), Some(&registry), &["curl"]);

    assert_eq!(out.status.code(), Some(MOCK_PROCESS_FAILURE_EXIT_CODE));
    assert!(out.stdout.is_empty());
}

#[cfg(unix)]
#[test]
fn non_utf8_arguments_still_dispatch() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let dir = tempfile::tempdir().expect("tempdir");
    let registry = encode([Mock::new("npm install").with_stdout("installed").with_exit_code(4)]);

    let out = Command::new(env!("CARGO_BIN_EXE_mockprocess"))
        .args([OsStr::new("npm"), OsStr::new("install"), OsStr::from_bytes(b"\xff")])
        .current_dir(dir.path())
        .env(MOCK_PROCESS_MAP_ENV, &registry)
        .output()
        .expect("spawn mockprocess");

    assert_eq!(out.status.code(), Some(4));
    assert_eq!(out.stdout, b"installed");
}
