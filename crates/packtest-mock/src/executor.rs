//! Dispatch logic for the `mockprocess` executor.
//!
//! The binary is a thin shell over [`dispatch`] and [`apply`]: it joins its
//! argument vector, looks the command line up in the registry, and replays
//! the selected mock's effects.

use std::io::Write;
use std::path::{Path, PathBuf};

use packtest_common::error::{PacktestError, Result};

use crate::registry::{Mock, MockRegistry, MovePath};

/// Result of looking a command line up in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch<'a> {
    /// The first mock, in declaration order, whose substring matched.
    Matched(&'a Mock),
    /// No mock matched; the command succeeds silently.
    Unmocked,
}

/// Joins an argument vector into the command line mocks are matched against.
#[must_use]
pub fn join_args<S: AsRef<str>>(args: &[S]) -> String {
    args.iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Selects the mock for `command_line`.
#[must_use]
pub fn dispatch<'a>(registry: &'a MockRegistry, command_line: &str) -> Dispatch<'a> {
    registry
        .find(command_line)
        .map_or(Dispatch::Unmocked, Dispatch::Matched)
}

/// Applies a mock's effects and returns the exit code to terminate with.
///
/// Relocations run first, in declaration order and relative to `cwd`, then
/// stdout is written, then stderr. Nothing is written if a relocation fails.
///
/// # Errors
///
/// Returns [`PacktestError::Io`] if a relocation or a write fails.
pub fn apply(
    mock: &Mock,
    cwd: &Path,
    stdout: &mut impl Write,
    stderr: &mut impl Write,
) -> Result<i32> {
    for move_path in &mock.move_paths {
        relocate(move_path, cwd)?;
    }

    stdout
        .write_all(mock.stdout.as_bytes())
        .and_then(|()| stdout.flush())
        .map_err(|e| PacktestError::Io {
            path: PathBuf::from("<stdout>"),
            source: e,
        })?;
    stderr
        .write_all(mock.stderr.as_bytes())
        .and_then(|()| stderr.flush())
        .map_err(|e| PacktestError::Io {
            path: PathBuf::from("<stderr>"),
            source: e,
        })?;

    Ok(mock.exit_code)
}

/// Runs one full executor invocation against an already parsed registry.
///
/// # Errors
///
/// Returns an error if the matched mock's effects cannot be applied.
pub fn run<S: AsRef<str>>(
    registry: &MockRegistry,
    args: &[S],
    cwd: &Path,
    stdout: &mut impl Write,
    stderr: &mut impl Write,
) -> Result<i32> {
    let command_line = join_args(args);
    match dispatch(registry, &command_line) {
        Dispatch::Matched(mock) => {
            tracing::debug!(command = %command_line, mock = %mock.command, "mock matched");
            apply(mock, cwd, stdout, stderr)
        }
        Dispatch::Unmocked => {
            tracing::debug!(command = %command_line, "no mock matched");
            Ok(0)
        }
    }
}

fn relocate(move_path: &MovePath, cwd: &Path) -> Result<()> {
    let source = cwd.join(&move_path.source);
    let destination = cwd.join(&move_path.destination);
    if let Some(parent) = destination.parent() {
        std::fs::create_dir_all(parent).map_err(|e| PacktestError::Io {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    std::fs::rename(&source, &destination).map_err(|e| PacktestError::Io {
        path: source.clone(),
        source: e,
    })?;
    tracing::debug!(
        source = %source.display(),
        destination = %destination.display(),
        "relocated file"
    );
    Ok(())
}
