//! Ordered registry of scripted command behaviors.
//!
//! The registry is serialized to a JSON array and handed to `mockprocess`
//! through [`MOCK_PROCESS_MAP_ENV`]. An array rather than a map keeps
//! declaration order, which decides which mock wins when several command
//! substrings match the same command line.

use std::path::PathBuf;

use packtest_common::constants::MOCK_PROCESS_MAP_ENV;
use packtest_common::error::{PacktestError, Result};
use serde::{Deserialize, Serialize};

/// Scripted behavior for every command line containing `command`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mock {
    /// Substring matched against the joined command line.
    pub command: String,
    /// Written verbatim to stdout.
    #[serde(default)]
    pub stdout: String,
    /// Written verbatim to stderr.
    #[serde(default)]
    pub stderr: String,
    /// Exit code of the mocked process.
    #[serde(default)]
    pub exit_code: i32,
    /// Files relocated before any output is written, in declaration order.
    #[serde(default)]
    pub move_paths: Vec<MovePath>,
}

/// A single `source` to `destination` relocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovePath {
    /// Path the file ends up at.
    pub destination: PathBuf,
    /// Path the file is taken from.
    pub source: PathBuf,
}

impl Mock {
    /// Creates a mock that succeeds silently for commands containing `command`.
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            stdout: String::new(),
            stderr: String::new(),
            exit_code: 0,
            move_paths: Vec::new(),
        }
    }

    /// Sets the text written to stdout.
    #[must_use]
    pub fn with_stdout(mut self, stdout: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self
    }

    /// Sets the text written to stderr.
    #[must_use]
    pub fn with_stderr(mut self, stderr: impl Into<String>) -> Self {
        self.stderr = stderr.into();
        self
    }

    /// Sets the exit code.
    #[must_use]
    pub const fn with_exit_code(mut self, exit_code: i32) -> Self {
        self.exit_code = exit_code;
        self
    }

    /// Moves `source` to `destination` when the mock is matched.
    #[must_use]
    pub fn with_move_path(
        mut self,
        destination: impl Into<PathBuf>,
        source: impl Into<PathBuf>,
    ) -> Self {
        self.move_paths.push(MovePath {
            destination: destination.into(),
            source: source.into(),
        });
        self
    }

    /// Returns whether this mock applies to the given command line.
    #[must_use]
    pub fn matches(&self, command_line: &str) -> bool {
        command_line.contains(&self.command)
    }
}

/// Ordered collection of mocks; the first match wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MockRegistry {
    mocks: Vec<Mock>,
}

impl MockRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self { mocks: Vec::new() }
    }

    /// Appends a mock after every previously registered one.
    pub fn register(&mut self, mock: Mock) {
        self.mocks.push(mock);
    }

    /// Returns the first mock, in declaration order, matching `command_line`.
    #[must_use]
    pub fn find(&self, command_line: &str) -> Option<&Mock> {
        self.mocks.iter().find(|mock| mock.matches(command_line))
    }

    /// Returns the registered mocks in declaration order.
    #[must_use]
    pub fn mocks(&self) -> &[Mock] {
        &self.mocks
    }

    /// Returns whether no mocks are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mocks.is_empty()
    }

    /// Serializes the registry into the value stored in [`MOCK_PROCESS_MAP_ENV`].
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_env_value(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parses a registry from the value stored in [`MOCK_PROCESS_MAP_ENV`].
    ///
    /// # Errors
    ///
    /// Returns a setup error if the value is empty or not a valid registry.
    pub fn from_env_value(value: &str) -> Result<Self> {
        if value.trim().is_empty() {
            return Err(PacktestError::setup(format!(
                "{MOCK_PROCESS_MAP_ENV} env var must be set"
            )));
        }
        serde_json::from_str(value).map_err(|e| {
            PacktestError::setup(format!(
                "unable to parse mock process map from JSON '{value}': {e}"
            ))
        })
    }

    /// Reads the registry from the current process environment.
    ///
    /// # Errors
    ///
    /// Returns a setup error if the variable is unset, empty, not valid
    /// unicode, or malformed.
    pub fn from_env() -> Result<Self> {
        let value = std::env::var(MOCK_PROCESS_MAP_ENV).map_err(|e| {
            PacktestError::setup(format!("{MOCK_PROCESS_MAP_ENV} env var must be set: {e}"))
        })?;
        Self::from_env_value(&value)
    }
}

impl FromIterator<Mock> for MockRegistry {
    fn from_iter<T: IntoIterator<Item = Mock>>(iter: T) -> Self {
        Self {
            mocks: iter.into_iter().collect(),
        }
    }
}

impl Extend<Mock> for MockRegistry {
    fn extend<T: IntoIterator<Item = Mock>>(&mut self, iter: T) {
        self.mocks.extend(iter);
    }
}
