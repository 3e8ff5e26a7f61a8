//! Suite manifests: test tables stored as JSON or YAML files.
//!
//! ```yaml
//! static_env:
//!   - X_GOOGLE_TARGET_PLATFORM=gae
//! cases:
//!   - app: yarn_lock
//!     must_use: [google.nodejs.yarn]
//!     must_not_use: [google.nodejs.npm]
//!   - app: yarn_two
//!     version_constraint: ">= 12.0.0"
//! ```

use std::path::Path;

use packtest_common::error::{PacktestError, Result};
use serde::{Deserialize, Serialize};

use crate::suite::AcceptanceSuite;
use crate::testcase::TestCase;
use crate::version::VersionFilter;

/// On-disk form of an acceptance suite.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SuiteManifest {
    /// `KEY=VALUE` entries appended to every case's environment.
    #[serde(default)]
    pub static_env: Vec<String>,
    /// Cases in declaration order.
    pub cases: Vec<TestCase>,
}

impl SuiteManifest {
    /// Loads a manifest, choosing the format from the file extension.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or a setup
    /// error if the extension is not `.json`, `.yaml` or `.yml`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| PacktestError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        let manifest = match extension.as_deref() {
            Some("json") => Self::from_json_str(&content)?,
            Some("yaml" | "yml") => Self::from_yaml_str(&content)?,
            _ => {
                return Err(PacktestError::setup(format!(
                    "unsupported manifest format: {} (expected .json, .yaml or .yml)",
                    path.display()
                )));
            }
        };
        tracing::debug!(
            manifest = %path.display(),
            cases = manifest.cases.len(),
            "loaded suite manifest"
        );
        Ok(manifest)
    }

    /// Parses a JSON manifest.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the document is invalid.
    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Parses a YAML manifest.
    ///
    /// # Errors
    ///
    /// Returns a manifest error if the document is invalid.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Builds the suite described by this manifest.
    #[must_use]
    pub fn into_suite(self, filter: VersionFilter) -> AcceptanceSuite {
        AcceptanceSuite::new(self.cases)
            .with_static_env(self.static_env)
            .with_version_filter(filter)
    }
}
