//! Unit-level runner for buildpack detect and build entry points.
//!
//! Each run gets a fresh temporary tree (`app/` and `layers/`), a
//! [`BuildContext`] wired to the `mockprocess` executor, and the run's mock
//! registry. The tree is deleted when the run returns, whatever the outcome.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use packtest_common::constants::{BUILD_SUCCESS_EXIT_CODE, MOCK_PROCESS_BIN_ENV};
use packtest_common::error::{PacktestError, Result};

use crate::context::{BuildContext, BuildpackFailure, DetectOutcome};
use crate::registry::{Mock, MockRegistry};

/// Everything observable about one entry-point run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    /// Lifecycle exit code of the phase.
    pub exit_code: i32,
    /// Combined textual output: log lines and the output of executed commands.
    pub output: String,
    /// Full command lines dispatched to the executor, in order.
    pub commands: Vec<String>,
}

impl RunResult {
    /// Returns whether any executed command line contains `substring`.
    #[must_use]
    pub fn command_executed(&self, substring: &str) -> bool {
        self.commands.iter().any(|c| c.contains(substring))
    }
}

/// Builder for an isolated detect or build run.
#[derive(Debug, Clone)]
pub struct BuildRunner {
    executor: PathBuf,
    test_name: String,
    files: BTreeMap<PathBuf, String>,
    env: BTreeMap<String, String>,
    mocks: MockRegistry,
}

impl BuildRunner {
    /// Creates a runner that dispatches commands to the given executor binary.
    #[must_use]
    pub fn new(executor: impl Into<PathBuf>) -> Self {
        Self {
            executor: executor.into(),
            test_name: String::from("buildpack"),
            files: BTreeMap::new(),
            env: BTreeMap::new(),
            mocks: MockRegistry::new(),
        }
    }

    /// Creates a runner using the executor named by `PACKTEST_MOCK_PROCESS`.
    ///
    /// # Errors
    ///
    /// Returns a setup error if the variable is not set.
    pub fn from_env() -> Result<Self> {
        let executor = std::env::var_os(MOCK_PROCESS_BIN_ENV).ok_or_else(|| {
            PacktestError::setup(format!("{MOCK_PROCESS_BIN_ENV} env var must be set"))
        })?;
        Ok(Self::new(executor))
    }

    /// Names the run; the name prefixes the temporary directory.
    #[must_use]
    pub fn with_test_name(mut self, name: impl Into<String>) -> Self {
        self.test_name = name.into();
        self
    }

    /// Adds files, keyed by path relative to the app directory.
    #[must_use]
    pub fn with_files<P, C>(mut self, files: impl IntoIterator<Item = (P, C)>) -> Self
    where
        P: Into<PathBuf>,
        C: Into<String>,
    {
        self.files
            .extend(files.into_iter().map(|(p, c)| (p.into(), c.into())));
        self
    }

    /// Adds a single file relative to the app directory.
    #[must_use]
    pub fn with_file(mut self, path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        let _ = self.files.insert(path.into(), contents.into());
        self
    }

    /// Sets an environment variable visible to the entry point and its commands.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let _ = self.env.insert(key.into(), value.into());
        self
    }

    /// Appends mocks after any already registered.
    #[must_use]
    pub fn with_exec_mocks(mut self, mocks: impl IntoIterator<Item = Mock>) -> Self {
        self.mocks.extend(mocks);
        self
    }

    /// Runs a detect entry point.
    ///
    /// # Errors
    ///
    /// Returns an execution error if the synthetic tree cannot be prepared
    /// or the executor cannot be spawned.
    pub fn run_detect<F>(&self, detect: F) -> Result<RunResult>
    where
        F: FnOnce(&mut BuildContext<'_>) -> std::result::Result<DetectOutcome, BuildpackFailure>,
    {
        self.run_phase("detect", |ctx| {
            let outcome = detect(ctx)?;
            ctx.log(outcome.reason());
            Ok(outcome.exit_code())
        })
    }

    /// Runs a build entry point.
    ///
    /// # Errors
    ///
    /// Returns an execution error if the synthetic tree cannot be prepared
    /// or the executor cannot be spawned.
    pub fn run_build<F>(&self, build: F) -> Result<RunResult>
    where
        F: FnOnce(&mut BuildContext<'_>) -> std::result::Result<(), BuildpackFailure>,
    {
        self.run_phase("build", |ctx| {
            build(ctx)?;
            Ok(BUILD_SUCCESS_EXIT_CODE)
        })
    }

    fn run_phase<F>(&self, phase: &str, entry: F) -> Result<RunResult>
    where
        F: FnOnce(&mut BuildContext<'_>) -> std::result::Result<i32, BuildpackFailure>,
    {
        let root = tempfile::Builder::new()
            .prefix(&format!("{}-", self.test_name))
            .tempdir()
            .map_err(|e| PacktestError::Io {
                path: std::env::temp_dir(),
                source: e,
            })?;
        let app_dir = root.path().join("app");
        let layers_dir = root.path().join("layers");
        create_dir(&app_dir)?;
        create_dir(&layers_dir)?;
        self.write_files(&app_dir)?;

        let registry_env = self.mocks.to_env_value()?;
        let mut ctx = BuildContext::new(
            app_dir,
            layers_dir,
            &self.executor,
            &registry_env,
            &self.env,
        );

        tracing::debug!(test = %self.test_name, phase, "running entry point");
        let exit_code = match entry(&mut ctx) {
            Ok(code) => code,
            Err(BuildpackFailure::Harness { message }) => {
                return Err(PacktestError::execution(message));
            }
            Err(failure) => {
                ctx.log(format!("ERROR: {failure}"));
                failure.exit_code()
            }
        };

        let (output, commands) = ctx.into_parts();
        tracing::debug!(test = %self.test_name, phase, exit_code, "entry point finished");
        Ok(RunResult {
            exit_code,
            output,
            commands,
        })
    }

    fn write_files(&self, app_dir: &Path) -> Result<()> {
        for (relative, contents) in &self.files {
            if !is_contained(relative) {
                return Err(PacktestError::setup(format!(
                    "file path {} must be relative and stay inside the app directory",
                    relative.display()
                )));
            }
            let path = app_dir.join(relative);
            if let Some(parent) = path.parent() {
                create_dir(parent)?;
            }
            std::fs::write(&path, contents).map_err(|e| PacktestError::Io { path, source: e })?;
        }
        Ok(())
    }
}

fn create_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| PacktestError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

fn is_contained(path: &Path) -> bool {
    path.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}
