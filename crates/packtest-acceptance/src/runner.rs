//! Execution of a single acceptance case.
//!
//! Predicates are evaluated in a fixed order: required buildpacks,
//! forbidden buildpacks, required cached output, forbidden cached output,
//! then the HTTP probe. Every failing predicate is recorded. A build or
//! engine error stops the case, keeping the failures found so far.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use packtest_common::config::{HarnessConfig, ReadinessPolicy};
use packtest_common::constants::{APP_IMAGE_PREFIX, LOG_TAIL_LINES};
use packtest_common::error::{PacktestError, Result};
use packtest_common::types::ImageRef;
use serde::Serialize;
use thiserror::Error;

use crate::engine::{AppBuildRequest, BuildOutput, ImageEngine};
use crate::markers::{DetectGroupParser, ParticipationParser};
use crate::probe::{ProbeFailure, Prober};
use crate::provision::BuiltImagePair;
use crate::testcase::TestCase;
use crate::tracker::{ResourceTracker, TrackedResource};

/// A broken predicate of a case.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum AssertionFailure {
    /// A required buildpack did not participate.
    #[error("buildpack {id} must be used but did not participate; participants: {participants:?}")]
    MissingBuildpack {
        /// Required buildpack.
        id: String,
        /// Buildpacks that did participate.
        participants: Vec<String>,
    },

    /// A forbidden buildpack participated.
    #[error("buildpack {id} must not be used but participated")]
    UnexpectedBuildpack {
        /// Forbidden buildpack.
        id: String,
    },

    /// The cache-warm rebuild log lacks a required substring.
    #[error("cached rebuild log must contain {expected:?}")]
    MissingCachedOutput {
        /// Required substring.
        expected: String,
    },

    /// The cache-warm rebuild log contains a forbidden substring.
    #[error("cached rebuild log must not contain {unexpected:?}")]
    UnexpectedCachedOutput {
        /// Forbidden substring.
        unexpected: String,
    },

    /// The running application did not answer successfully.
    #[error("probe of {path} failed: {failure}")]
    Probe {
        /// Probed path.
        path: String,
        /// Why the probe failed.
        failure: ProbeFailure,
    },
}

/// Outcome of one case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaseReport {
    /// Case name.
    pub name: String,
    /// Broken predicates, in evaluation order.
    pub failures: Vec<AssertionFailure>,
    /// Error that stopped the case, if any.
    pub error: Option<String>,
    /// Wall-clock time spent on the case.
    pub elapsed: Duration,
}

impl CaseReport {
    /// Creates a report for a case that could not run at all.
    #[must_use]
    pub fn errored(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            failures: Vec::new(),
            error: Some(error.into()),
            elapsed: Duration::ZERO,
        }
    }

    /// Returns whether the case passed.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.failures.is_empty() && self.error.is_none()
    }
}

/// Runs cases against a provisioned image pair.
pub struct AcceptanceRunner {
    engine: Arc<dyn ImageEngine>,
    parser: Arc<dyn ParticipationParser>,
    tracker: ResourceTracker,
    fixtures_dir: PathBuf,
    probe_port: u16,
    readiness: ReadinessPolicy,
    keep_artifacts: bool,
}

impl AcceptanceRunner {
    /// Creates a runner using the default detect-group participation parser.
    #[must_use]
    pub fn new(engine: Arc<dyn ImageEngine>, config: &HarnessConfig) -> Self {
        Self {
            engine,
            parser: Arc::new(DetectGroupParser),
            tracker: ResourceTracker::new(),
            fixtures_dir: config.fixtures_dir.clone(),
            probe_port: config.probe_port,
            readiness: config.readiness,
            keep_artifacts: config.keep_artifacts,
        }
    }

    /// Replaces the participation parser.
    #[must_use]
    pub fn with_parser(mut self, parser: Arc<dyn ParticipationParser>) -> Self {
        self.parser = parser;
        self
    }

    /// Registers case resources in `tracker` instead of a private one.
    #[must_use]
    pub fn with_tracker(mut self, tracker: ResourceTracker) -> Self {
        self.tracker = tracker;
        self
    }

    /// Returns the tracker holding the resources of in-flight cases.
    #[must_use]
    pub const fn tracker(&self) -> &ResourceTracker {
        &self.tracker
    }

    /// Returns the directory fixtures are resolved against.
    #[must_use]
    pub fn fixtures_dir(&self) -> &Path {
        &self.fixtures_dir
    }

    /// Runs one case and reports every broken predicate.
    ///
    /// Resources the case created are removed before this returns, unless
    /// artifacts are kept.
    pub fn run_case(&self, images: &BuiltImagePair, case: &TestCase) -> CaseReport {
        let started = Instant::now();
        tracing::info!(case = %case.name, app = %case.app, "case started");

        let mut failures = Vec::new();
        let error = self
            .execute(images, case, &mut failures)
            .err()
            .map(|e| e.to_string());
        let report = CaseReport {
            name: case.name.clone(),
            failures,
            error,
            elapsed: started.elapsed(),
        };

        if report.passed() {
            tracing::info!(case = %report.name, elapsed = ?report.elapsed, "case passed");
        } else {
            tracing::warn!(
                case = %report.name,
                failures = report.failures.len(),
                error = report.error.as_deref().unwrap_or(""),
                "case failed"
            );
        }
        report
    }

    fn execute(
        &self,
        images: &BuiltImagePair,
        case: &TestCase,
        failures: &mut Vec<AssertionFailure>,
    ) -> Result<()> {
        let fixture = self.fixtures_dir.join(&case.app);
        let env = case.env_pairs()?;
        let image = ImageRef::unique(APP_IMAGE_PREFIX, &case.name);
        let _image_guard = self.tracker.guard(
            Arc::clone(&self.engine),
            TrackedResource::Image(image.clone()),
            self.keep_artifacts,
        );
        let request = AppBuildRequest {
            image: &image,
            fixture: &fixture,
            builder: &images.builder,
            run_image: &images.run,
            env: &env,
        };

        let first = self.build(case, &request, "initial")?;
        let participants = self.parser.participants(&first.log);
        tracing::debug!(case = %case.name, participants = ?participants, "participation");
        check_participation(case, &participants, failures);

        if case.needs_cached_rebuild() {
            let cached = self.build(case, &request, "cached")?;
            check_cached_output(case, &cached.log, failures);
        }

        if let Some(path) = &case.path {
            if let Some(failure) = self.probe(case, &image, path)? {
                failures.push(AssertionFailure::Probe {
                    path: path.clone(),
                    failure,
                });
            }
        }
        Ok(())
    }

    fn build(
        &self,
        case: &TestCase,
        request: &AppBuildRequest<'_>,
        phase: &str,
    ) -> Result<BuildOutput> {
        tracing::info!(case = %case.name, image = %request.image, phase, "building fixture");
        let output = self.engine.build_app(request)?;
        if output.success {
            Ok(output)
        } else {
            Err(PacktestError::execution(format!(
                "{phase} build of {} failed; last lines of the build log:\n{}",
                case.app,
                log_tail(&output.log, LOG_TAIL_LINES)
            )))
        }
    }

    fn probe(&self, case: &TestCase, image: &ImageRef, path: &str) -> Result<Option<ProbeFailure>> {
        let container = self.engine.start_container(image, self.probe_port, &[])?;
        let _container_guard = self.tracker.guard(
            Arc::clone(&self.engine),
            TrackedResource::Container(container.id.clone()),
            self.keep_artifacts,
        );

        let url = container.url(path);
        tracing::info!(case = %case.name, container = %container.id, url = %url, "probing");
        let prober = Prober::new(self.readiness)?;
        match prober.probe(&url) {
            Ok(_) => Ok(None),
            Err(failure) => {
                match self.engine.container_logs(&container.id) {
                    Ok(logs) => tracing::warn!(
                        case = %case.name,
                        container = %container.id,
                        logs = %log_tail(&logs, LOG_TAIL_LINES),
                        "probe failed"
                    ),
                    Err(e) => tracing::warn!(case = %case.name, error = %e, "probe failed, no logs"),
                }
                Ok(Some(failure))
            }
        }
    }
}

impl std::fmt::Debug for AcceptanceRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcceptanceRunner")
            .field("fixtures_dir", &self.fixtures_dir)
            .field("probe_port", &self.probe_port)
            .field("readiness", &self.readiness)
            .field("keep_artifacts", &self.keep_artifacts)
            .finish_non_exhaustive()
    }
}

fn check_participation(
    case: &TestCase,
    participants: &BTreeSet<String>,
    failures: &mut Vec<AssertionFailure>,
) {
    for id in case.must_use.iter().filter(|id| !participants.contains(*id)) {
        failures.push(AssertionFailure::MissingBuildpack {
            id: id.clone(),
            participants: participants.iter().cloned().collect(),
        });
    }
    for id in case.must_not_use.iter().filter(|id| participants.contains(*id)) {
        failures.push(AssertionFailure::UnexpectedBuildpack { id: id.clone() });
    }
}

fn check_cached_output(case: &TestCase, log: &str, failures: &mut Vec<AssertionFailure>) {
    for expected in case.must_output_cached.iter().filter(|s| !log.contains(s.as_str())) {
        failures.push(AssertionFailure::MissingCachedOutput {
            expected: expected.clone(),
        });
    }
    for unexpected in case.must_not_output_cached.iter().filter(|s| log.contains(s.as_str())) {
        failures.push(AssertionFailure::UnexpectedCachedOutput {
            unexpected: unexpected.clone(),
        });
    }
}

/// Returns the last `lines` lines of `log`.
#[must_use]
pub fn log_tail(log: &str, lines: usize) -> String {
    let all: Vec<&str> = log.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participants(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn yarn_fixture_satisfies_yarn_only_case() {
        let case = TestCase::new("yarn_lock")
            .must_use(["google.nodejs.yarn"])
            .must_not_use(["google.nodejs.npm"]);
        let mut failures = Vec::new();
        check_participation(
            &case,
            &participants(&["google.nodejs.runtime", "google.nodejs.yarn"]),
            &mut failures,
        );
        assert!(failures.is_empty(), "{failures:?}");
    }

    #[test]
    fn npm_case_fails_when_yarn_also_ran() {
        let case = TestCase::new("package_lock")
            .must_use(["google.nodejs.npm"])
            .must_not_use(["google.nodejs.yarn"]);
        let mut failures = Vec::new();
        check_participation(
            &case,
            &participants(&["google.nodejs.npm", "google.nodejs.yarn"]),
            &mut failures,
        );
        assert_eq!(
            failures,
            vec![AssertionFailure::UnexpectedBuildpack {
                id: "google.nodejs.yarn".into()
            }]
        );
    }

    #[test]
    fn every_broken_predicate_is_reported_in_order() {
        let case = TestCase::new("postinstall_npm")
            .must_use(["google.nodejs.npm"])
            .must_not_use(["google.nodejs.yarn"])
            .must_output_cached(["Already up-to-date."])
            .must_not_output_cached(["added 1 package"]);
        let mut failures = Vec::new();
        check_participation(&case, &participants(&["google.nodejs.yarn"]), &mut failures);
        check_cached_output(&case, "added 1 package in 2s", &mut failures);

        assert_eq!(failures.len(), 4);
        assert!(matches!(failures[0], AssertionFailure::MissingBuildpack { .. }));
        assert!(matches!(failures[1], AssertionFailure::UnexpectedBuildpack { .. }));
        assert!(matches!(failures[2], AssertionFailure::MissingCachedOutput { .. }));
        assert!(matches!(failures[3], AssertionFailure::UnexpectedCachedOutput { .. }));
    }

    #[test]
    fn failure_messages_carry_literals() {
        let failure = AssertionFailure::MissingCachedOutput {
            expected: "Already up-to-date.".into(),
        };
        assert_eq!(
            failure.to_string(),
            "cached rebuild log must contain \"Already up-to-date.\""
        );
    }

    #[test]
    fn log_tail_keeps_last_lines() {
        assert_eq!(log_tail("a\nb\nc\nd", 2), "c\nd");
        assert_eq!(log_tail("a", 5), "a");
        assert_eq!(log_tail("", 5), "");
    }

    #[test]
    fn errored_report_did_not_pass() {
        let report = CaseReport::errored("yarn_two", "case panicked");
        assert!(!report.passed());
    }
}
