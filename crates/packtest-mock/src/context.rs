//! The execution context handed to a buildpack entry point.
//!
//! A [`BuildContext`] is the only door from an entry point to the outside
//! world: file access is rooted in the synthetic app directory and every
//! external command goes through the `mockprocess` executor.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use packtest_common::constants::{
    BUILDPACK_FAILURE_EXIT_CODE, DETECT_OPT_OUT_EXIT_CODE, DETECT_PASS_EXIT_CODE,
    MOCK_PROCESS_MAP_ENV,
};
use thiserror::Error;

use crate::executor::join_args;

/// Result of a detect entry point that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectOutcome {
    /// The buildpack participates in the build.
    Pass {
        /// Human-readable reason, echoed to the output.
        reason: String,
    },
    /// The buildpack does not apply to this application.
    OptOut {
        /// Human-readable reason, echoed to the output.
        reason: String,
    },
}

impl DetectOutcome {
    /// Creates a passing outcome.
    #[must_use]
    pub fn pass(reason: impl Into<String>) -> Self {
        Self::Pass {
            reason: reason.into(),
        }
    }

    /// Creates an opt-out outcome.
    #[must_use]
    pub fn opt_out(reason: impl Into<String>) -> Self {
        Self::OptOut {
            reason: reason.into(),
        }
    }

    /// Returns the lifecycle exit code for this outcome.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Pass { .. } => DETECT_PASS_EXIT_CODE,
            Self::OptOut { .. } => DETECT_OPT_OUT_EXIT_CODE,
        }
    }

    /// Returns the reason attached to the outcome.
    #[must_use]
    pub fn reason(&self) -> &str {
        match self {
            Self::Pass { reason } | Self::OptOut { reason } => reason,
        }
    }
}

/// Failure raised by a buildpack entry point.
#[derive(Debug, Error)]
pub enum BuildpackFailure {
    /// The application is not buildable as given; the message is for the user.
    #[error("{message}")]
    User {
        /// Explanation shown to the user.
        message: String,
    },

    /// An external command exited with a non-zero status.
    #[error("command \"{command}\" failed with exit code {exit_code}: {stderr}")]
    Command {
        /// The joined command line.
        command: String,
        /// Exit status of the command.
        exit_code: i32,
        /// Captured stderr of the command.
        stderr: String,
    },

    /// File access inside the synthetic tree failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the failure occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The harness itself could not do its job (e.g. spawn the executor).
    #[error("harness failure: {message}")]
    Harness {
        /// Description of the harness failure.
        message: String,
    },
}

impl BuildpackFailure {
    /// Shorthand for a [`BuildpackFailure::User`] failure.
    pub fn user(message: impl Into<String>) -> Self {
        Self::User {
            message: message.into(),
        }
    }

    /// Returns the lifecycle exit code for a failed phase.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        BUILDPACK_FAILURE_EXIT_CODE
    }
}

/// Captured result of a successful [`BuildContext::exec`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
}

/// Entry-point view of one synthetic build.
#[derive(Debug)]
pub struct BuildContext<'a> {
    app_dir: PathBuf,
    layers_dir: PathBuf,
    executor: &'a Path,
    registry_env: &'a str,
    env: &'a BTreeMap<String, String>,
    output: String,
    commands: Vec<String>,
}

impl<'a> BuildContext<'a> {
    pub(crate) fn new(
        app_dir: PathBuf,
        layers_dir: PathBuf,
        executor: &'a Path,
        registry_env: &'a str,
        env: &'a BTreeMap<String, String>,
    ) -> Self {
        Self {
            app_dir,
            layers_dir,
            executor,
            registry_env,
            env,
            output: String::new(),
            commands: Vec::new(),
        }
    }

    /// Root of the synthetic application source tree.
    #[must_use]
    pub fn app_dir(&self) -> &Path {
        &self.app_dir
    }

    /// Directory layers are created under.
    #[must_use]
    pub fn layers_dir(&self) -> &Path {
        &self.layers_dir
    }

    /// Returns an environment variable configured for this run.
    #[must_use]
    pub fn env(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(String::as_str)
    }

    /// Returns whether `relative` exists inside the app directory.
    #[must_use]
    pub fn file_exists(&self, relative: impl AsRef<Path>) -> bool {
        self.app_dir.join(relative).exists()
    }

    /// Reads a file from the app directory.
    ///
    /// # Errors
    ///
    /// Returns [`BuildpackFailure::Io`] if the file cannot be read.
    pub fn read_file(&self, relative: impl AsRef<Path>) -> Result<String, BuildpackFailure> {
        let path = self.app_dir.join(relative);
        std::fs::read_to_string(&path).map_err(|e| BuildpackFailure::Io { path, source: e })
    }

    /// Creates (if needed) and returns the directory of the named layer.
    ///
    /// # Errors
    ///
    /// Returns [`BuildpackFailure::Io`] if the directory cannot be created.
    pub fn layer(&self, name: &str) -> Result<PathBuf, BuildpackFailure> {
        let path = self.layers_dir.join(name);
        std::fs::create_dir_all(&path).map_err(|e| BuildpackFailure::Io {
            path: path.clone(),
            source: e,
        })?;
        Ok(path)
    }

    /// Appends an informational line to the combined output.
    pub fn log(&mut self, message: impl AsRef<str>) {
        self.output.push_str(message.as_ref());
        self.output.push('\n');
    }

    /// Appends a warning line to the combined output.
    pub fn warn(&mut self, message: impl AsRef<str>) {
        self.output.push_str("Warning: ");
        self.log(message);
    }

    /// Runs an external command through the mock executor.
    ///
    /// The joined command line is recorded before the command runs. The
    /// registry reaches the executor only through the child's environment,
    /// and the child runs inside the app directory.
    ///
    /// # Errors
    ///
    /// Returns [`BuildpackFailure::Command`] on a non-zero exit status and
    /// [`BuildpackFailure::Harness`] if the executor cannot be spawned.
    pub fn exec<S: AsRef<str>>(&mut self, args: &[S]) -> Result<ExecOutput, BuildpackFailure> {
        let command_line = join_args(args);
        self.commands.push(command_line.clone());
        tracing::debug!(command = %command_line, "dispatching to mock executor");

        let output = Command::new(self.executor)
            .args(args.iter().map(AsRef::as_ref))
            .current_dir(&self.app_dir)
            .envs(self.env)
            .env(MOCK_PROCESS_MAP_ENV, self.registry_env)
            .output()
            .map_err(|e| BuildpackFailure::Harness {
                message: format!(
                    "failed to spawn mock executor {}: {e}",
                    self.executor.display()
                ),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        self.output.push_str(&stdout);
        self.output.push_str(&stderr);

        if output.status.success() {
            Ok(ExecOutput { stdout, stderr })
        } else {
            Err(BuildpackFailure::Command {
                command: command_line,
                exit_code: output.status.code().unwrap_or(-1),
                stderr,
            })
        }
    }

    pub(crate) fn into_parts(self) -> (String, Vec<String>) {
        (self.output, self.commands)
    }
}
