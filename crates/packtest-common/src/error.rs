//! Unified error types for the packtest workspace.
//!
//! The variants follow the harness failure taxonomy. `Setup` and
//! `Provisioning` abort a whole run, while `Execution` only fails the case
//! that produced it. Assertion failures are not errors; they are recorded
//! as values in case reports.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum PacktestError {
    /// The harness was configured incorrectly and no case can run.
    #[error("setup error: {message}")]
    Setup {
        /// Description of the invalid configuration.
        message: String,
    },

    /// The shared builder/run image pair could not be provisioned.
    #[error("provisioning failed: {message}")]
    Provisioning {
        /// Description of the provisioning failure.
        message: String,
    },

    /// A single case could not be executed to completion.
    #[error("execution error: {message}")]
    Execution {
        /// Description of the execution failure.
        message: String,
    },

    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },

    /// A YAML suite manifest could not be parsed.
    #[error("manifest error: {source}")]
    Manifest {
        /// Underlying YAML error.
        #[from]
        source: serde_yaml::Error,
    },
}

impl PacktestError {
    /// Shorthand for a [`PacktestError::Setup`] error.
    pub fn setup(message: impl Into<String>) -> Self {
        Self::Setup {
            message: message.into(),
        }
    }

    /// Shorthand for a [`PacktestError::Execution`] error.
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
        }
    }

    /// Returns whether this error aborts the entire run rather than a single case.
    #[must_use]
    pub const fn is_fatal_for_run(&self) -> bool {
        matches!(self, Self::Setup { .. } | Self::Provisioning { .. })
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, PacktestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setup_and_provisioning_abort_the_run() {
        assert!(PacktestError::setup("bad constraint").is_fatal_for_run());
        assert!(
            PacktestError::Provisioning {
                message: "pack failed".into()
            }
            .is_fatal_for_run()
        );
        assert!(!PacktestError::execution("build failed").is_fatal_for_run());
    }

    #[test]
    fn display_includes_message() {
        let err = PacktestError::setup("invalid constraint \">= x\"");
        assert_eq!(err.to_string(), "setup error: invalid constraint \">= x\"");
    }
}
