//! # mockprocess
//!
//! Stand-in for any external tool a buildpack invokes. The scripted
//! behavior comes from the registry in `PACKTEST_MOCK_PROCESS_MAP`; stdout
//! and stderr carry only the scripted output.

use std::io::Write;
use std::process::ExitCode;

use packtest_common::constants::MOCK_PROCESS_FAILURE_EXIT_CODE;
use packtest_common::error::{PacktestError, Result};
use packtest_mock::executor;
use packtest_mock::registry::MockRegistry;

fn main() -> ExitCode {
    // Tracing stays silent unless RUST_LOG asks for it.
    if std::env::var_os("RUST_LOG").is_some() {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .init();
    }

    match run() {
        Ok(code) => exit_code(code),
        Err(e) => {
            let _ = writeln!(std::io::stderr().lock(), "mockprocess: {e}");
            exit_code(MOCK_PROCESS_FAILURE_EXIT_CODE)
        }
    }
}

fn run() -> Result<i32> {
    let registry = MockRegistry::from_env()?;
    let args: Vec<String> = std::env::args_os()
        .skip(1)
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();
    let cwd = std::env::current_dir().map_err(|e| PacktestError::Io {
        path: ".".into(),
        source: e,
    })?;

    let mut stdout = std::io::stdout().lock();
    let mut stderr = std::io::stderr().lock();
    executor::run(&registry, &args, &cwd, &mut stdout, &mut stderr)
}

// Exit statuses are a single byte on Unix; truncate like the OS would.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn exit_code(code: i32) -> ExitCode {
    ExitCode::from((code & 0xff) as u8)
}
