//! Declarative acceptance scenarios.

use std::collections::BTreeSet;

use packtest_common::constants::DEFAULT_PROBE_PATH;
use packtest_common::error::{PacktestError, Result};
use serde::{Deserialize, Serialize};

/// One acceptance scenario.
///
/// Empty collections mean "no assertion". Cached-output assertions are
/// checked only against a second, cache-warm build of the fixture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestCase {
    /// Case name, unique within a run. Defaults to `app`.
    #[serde(default)]
    pub name: String,
    /// Fixture directory name under the fixtures root.
    pub app: String,
    /// Path probed on the running container; `None` skips the container run.
    #[serde(default = "default_path")]
    pub path: Option<String>,
    /// Ordered `KEY=VALUE` build-time environment overrides.
    #[serde(default)]
    pub env: Vec<String>,
    /// Buildpacks that must participate in the build.
    #[serde(default)]
    pub must_use: BTreeSet<String>,
    /// Buildpacks that must not participate in the build.
    #[serde(default)]
    pub must_not_use: BTreeSet<String>,
    /// Substrings the cache-warm rebuild log must contain.
    #[serde(default)]
    pub must_output_cached: Vec<String>,
    /// Substrings the cache-warm rebuild log must not contain.
    #[serde(default)]
    pub must_not_output_cached: Vec<String>,
    /// Range expression of runtime versions this case applies to.
    #[serde(default)]
    pub version_constraint: String,
}

#[allow(clippy::unnecessary_wraps)]
fn default_path() -> Option<String> {
    Some(DEFAULT_PROBE_PATH.to_string())
}

impl TestCase {
    /// Creates a case for `app`, named after it, probing `/`.
    #[must_use]
    pub fn new(app: impl Into<String>) -> Self {
        let app = app.into();
        Self {
            name: app.clone(),
            app,
            path: default_path(),
            env: Vec::new(),
            must_use: BTreeSet::new(),
            must_not_use: BTreeSet::new(),
            must_output_cached: Vec::new(),
            must_not_output_cached: Vec::new(),
            version_constraint: String::new(),
        }
    }

    /// Overrides the case name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the probe path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Skips running a container for this case.
    #[must_use]
    pub fn without_probe(mut self) -> Self {
        self.path = None;
        self
    }

    /// Appends a `KEY=VALUE` environment entry.
    #[must_use]
    pub fn with_env(mut self, entry: impl Into<String>) -> Self {
        self.env.push(entry.into());
        self
    }

    /// Requires the given buildpacks to participate.
    #[must_use]
    pub fn must_use<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.must_use.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Forbids the given buildpacks from participating.
    #[must_use]
    pub fn must_not_use<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.must_not_use.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Requires the cache-warm rebuild log to contain each substring.
    #[must_use]
    pub fn must_output_cached<I, S>(mut self, substrings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.must_output_cached
            .extend(substrings.into_iter().map(Into::into));
        self
    }

    /// Forbids each substring in the cache-warm rebuild log.
    #[must_use]
    pub fn must_not_output_cached<I, S>(mut self, substrings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.must_not_output_cached
            .extend(substrings.into_iter().map(Into::into));
        self
    }

    /// Gates the case on a runtime version range.
    #[must_use]
    pub fn with_version_constraint(mut self, constraint: impl Into<String>) -> Self {
        self.version_constraint = constraint.into();
        self
    }

    /// Fills in the name from `app` when it is empty.
    pub fn apply_defaults(&mut self) {
        if self.name.trim().is_empty() {
            self.name.clone_from(&self.app);
        }
    }

    /// Returns whether a cache-warm rebuild is needed.
    #[must_use]
    pub fn needs_cached_rebuild(&self) -> bool {
        !self.must_output_cached.is_empty() || !self.must_not_output_cached.is_empty()
    }

    /// Returns the environment as ordered key/value pairs.
    ///
    /// # Errors
    ///
    /// Returns a setup error if an entry is not of the form `KEY=VALUE`.
    pub fn env_pairs(&self) -> Result<Vec<(String, String)>> {
        self.env
            .iter()
            .map(|entry| match entry.split_once('=') {
                Some((key, value)) if !key.trim().is_empty() => {
                    Ok((key.to_string(), value.to_string()))
                }
                _ => Err(PacktestError::setup(format!(
                    "case \"{}\": env entry \"{entry}\" must be KEY=VALUE",
                    self.name
                ))),
            })
            .collect()
    }

    /// Checks the case's internal consistency.
    ///
    /// # Errors
    ///
    /// Returns a setup error if the app is empty, the participation sets
    /// overlap, an environment entry is malformed, or the probe path is not
    /// absolute.
    pub fn validate(&self) -> Result<()> {
        if self.app.trim().is_empty() {
            return Err(PacktestError::setup(format!(
                "case \"{}\": app must not be empty",
                self.name
            )));
        }
        if let Some(id) = self.must_use.intersection(&self.must_not_use).next() {
            return Err(PacktestError::setup(format!(
                "case \"{}\": buildpack {id} is in both must_use and must_not_use",
                self.name
            )));
        }
        if let Some(path) = self.path.as_deref().filter(|p| !p.starts_with('/')) {
            return Err(PacktestError::setup(format!(
                "case \"{}\": probe path \"{path}\" must start with '/'",
                self.name
            )));
        }
        let _ = self.env_pairs()?;
        Ok(())
    }
}
