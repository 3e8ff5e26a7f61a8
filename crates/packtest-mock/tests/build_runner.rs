//! End-to-end tests of `BuildRunner` with the real `mockprocess` executor,
//! driving an Angular-adapter style buildpack.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use packtest_mock::context::{BuildContext, BuildpackFailure, DetectOutcome};
use packtest_mock::registry::Mock;
use packtest_mock::runner::BuildRunner;
use semver::Version;
use serde_json::Value;

const ADAPTER_INSTALL: &str = "npm install --prefix npm_modules @apphosting/adapter-angular@latest";

fn runner(name: &str) -> BuildRunner {
    BuildRunner::new(env!("CARGO_BIN_EXE_mockprocess")).with_test_name(name)
}

fn detect(ctx: &mut BuildContext<'_>) -> Result<DetectOutcome, BuildpackFailure> {
    if ctx.file_exists("angular.json") {
        Ok(DetectOutcome::pass("found angular.json"))
    } else {
        Ok(DetectOutcome::opt_out("angular.json not found"))
    }
}

fn build(ctx: &mut BuildContext<'_>) -> Result<(), BuildpackFailure> {
    let listing = ctx.exec(&["npm", "list", "@angular/cli", "--json"])?;
    let json: Value = serde_json::from_str(&listing.stdout)
        .map_err(|e| BuildpackFailure::user(format!("unreadable npm listing: {e}")))?;
    let raw = json["dependencies"]["@angular/cli"]["version"]
        .as_str()
        .ok_or_else(|| BuildpackFailure::user("@angular/cli is not installed"))?;
    let version = Version::parse(raw)
        .map_err(|e| BuildpackFailure::user(format!("invalid @angular/cli version {raw}: {e}")))?;
    if version < Version::new(17, 0, 0) {
        return Err(BuildpackFailure::user(format!(
            "unsupported @angular/cli version {version}, 17.0.0 or newer is required"
        )));
    }
    let layer = ctx.layer("npm_modules")?;
    ctx.log(format!("installing adapter into {}", layer.display()));
    let args: Vec<&str> = ADAPTER_INSTALL.split(' ').collect();
    let _ = ctx.exec(&args)?;
    Ok(())
}

fn listing(version: &str) -> String {
    format!(r#"{{"dependencies": {{"@angular/cli": {{"version": "{version}"}}}}}}"#)
}

#[test]
fn detect_with_angular_json() {
    let result = runner("with-angular-json")
        .with_file("angular.json", "{}")
        .run_detect(detect)
        .expect("run");
    assert_eq!(result.exit_code, 0);
}

#[test]
fn detect_without_angular_json() {
    let result = runner("without-angular-json")
        .with_file("package.json", "{}")
        .run_detect(detect)
        .expect("run");
    assert_eq!(result.exit_code, 100);
}

#[test]
fn build_installs_adapter_for_supported_version() {
    let result = runner("supported-version")
        .with_exec_mocks([
            Mock::new("npm list").with_stdout(listing("17.2.0")),
            Mock::new("npm install").with_stdout("added 1 package"),
        ])
        .run_build(build)
        .expect("run");

    assert_eq!(result.exit_code, 0, "{}", result.output);
    assert!(result.command_executed(ADAPTER_INSTALL));
    assert!(result.output.contains("added 1 package"));
    assert_eq!(result.commands.len(), 2);
    assert_eq!(result.commands[0], "npm list @angular/cli --json");
}

#[test]
fn build_rejects_old_angular() {
    let result = runner("unsupported-version")
        .with_exec_mocks([Mock::new("npm list").with_stdout(listing("16.2.0"))])
        .run_build(build)
        .expect("run");

    assert_eq!(result.exit_code, 1);
    assert!(result.output.contains("unsupported @angular/cli version 16.2.0"));
    assert!(!result.command_executed("npm install"));
}

#[test]
fn failing_command_fails_the_build() {
    let result = runner("install-fails")
        .with_exec_mocks([
            Mock::new("npm list").with_stdout(listing("17.0.0")),
            Mock::new("npm install").with_stderr("ERESOLVE").with_exit_code(1),
        ])
        .run_build(build)
        .expect("run");

    assert_eq!(result.exit_code, 1);
    assert!(result.command_executed("npm install"));
    assert!(result.output.contains("ERESOLVE"));
}

#[test]
fn unmocked_listing_is_silent_and_surfaces_as_user_error() {
    let result = runner("unmocked")
        .run_build(build)
        .expect("run");

    assert_eq!(result.exit_code, 1);
    assert!(result.output.contains("unreadable npm listing"));
}

#[test]
fn runner_env_reaches_entry_point() {
    let result = runner("env")
        .with_env("GOOGLE_RUNTIME_VERSION", "20.1.0")
        .run_build(|ctx| {
            let version = ctx.env("GOOGLE_RUNTIME_VERSION").unwrap_or("unset").to_string();
            ctx.log(format!("runtime {version}"));
            Ok(())
        })
        .expect("run");
    assert!(result.output.contains("runtime 20.1.0"));
}

#[test]
fn concurrent_runs_keep_their_own_registries() {
    let handles: Vec<_> = (0..4)
        .map(|i| {
            std::thread::spawn(move || {
                runner(&format!("concurrent-{i}"))
                    .with_exec_mocks([Mock::new("echo").with_stdout(format!("run {i}"))])
                    .run_build(|ctx| {
                        let _ = ctx.exec(&["echo"])?;
                        Ok(())
                    })
                    .expect("run")
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let result = handle.join().expect("thread");
        assert_eq!(result.output, format!("run {i}"));
    }
}
