//! Table-driven acceptance suites.
//!
//! [`AcceptanceSuite::prepare`] turns the declared cases into the set that
//! will run: static environment appended, names defaulted, every case
//! validated, version-gated cases filtered out. Any problem there is a
//! setup error and nothing runs. [`PreparedSuite::run`] then provisions the
//! shared images once and fans the cases out, one blocking task per case.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use packtest_common::constants::TARGET_PLATFORM_ENV;
use packtest_common::error::{PacktestError, Result};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};

use crate::provision::ImageProvisioner;
use crate::runner::{AcceptanceRunner, CaseReport};
use crate::testcase::TestCase;
use crate::version::VersionFilter;

/// Declared cases plus the options applied to all of them.
#[derive(Debug, Clone, Default)]
pub struct AcceptanceSuite {
    cases: Vec<TestCase>,
    static_env: Vec<String>,
    filter: VersionFilter,
}

impl AcceptanceSuite {
    /// Creates a suite from cases in declaration order.
    #[must_use]
    pub fn new(cases: impl IntoIterator<Item = TestCase>) -> Self {
        Self {
            cases: cases.into_iter().collect(),
            static_env: Vec::new(),
            filter: VersionFilter::unfiltered(),
        }
    }

    /// Appends `KEY=VALUE` entries to the environment of every case.
    #[must_use]
    pub fn with_static_env<I, S>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.static_env.extend(entries.into_iter().map(Into::into));
        self
    }

    /// Appends the deployment-target marker (e.g. `gae`) to every case.
    #[must_use]
    pub fn with_target_platform(self, platform: &str) -> Self {
        self.with_static_env([format!("{TARGET_PLATFORM_ENV}={platform}")])
    }

    /// Sets the runtime-version filter.
    #[must_use]
    pub fn with_version_filter(mut self, filter: VersionFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Returns the declared cases.
    #[must_use]
    pub fn cases(&self) -> &[TestCase] {
        &self.cases
    }

    /// Resolves the cases that will run.
    ///
    /// # Errors
    ///
    /// Returns a setup error if a case is invalid, two cases share a name,
    /// a version constraint is invalid, or a running case's fixture does
    /// not exist under `fixtures_dir`.
    pub fn prepare(&self, fixtures_dir: &Path) -> Result<PreparedSuite> {
        let mut names = BTreeSet::new();
        let mut cases = Vec::new();
        let mut skipped = Vec::new();

        for declared in &self.cases {
            let mut case = declared.clone();
            case.env.extend(self.static_env.iter().cloned());
            case.apply_defaults();
            case.validate()?;

            if !names.insert(case.name.clone()) {
                return Err(PacktestError::setup(format!(
                    "duplicate case name \"{}\"",
                    case.name
                )));
            }

            if !self.filter.should_test(&case.version_constraint)? {
                tracing::info!(
                    case = %case.name,
                    constraint = %case.version_constraint,
                    "skipping case outside runtime version range"
                );
                skipped.push(case.name);
                continue;
            }

            let fixture = fixtures_dir.join(&case.app);
            if !fixture.is_dir() {
                return Err(PacktestError::setup(format!(
                    "case \"{}\": fixture {} does not exist",
                    case.name,
                    fixture.display()
                )));
            }
            cases.push(case);
        }

        Ok(PreparedSuite { cases, skipped })
    }
}

/// Validated cases ready to run.
#[derive(Debug, Clone)]
pub struct PreparedSuite {
    cases: Vec<TestCase>,
    skipped: Vec<String>,
}

impl PreparedSuite {
    /// Returns the cases that will run, in declaration order.
    #[must_use]
    pub fn cases(&self) -> &[TestCase] {
        &self.cases
    }

    /// Returns the names of cases filtered out by runtime version.
    #[must_use]
    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }

    /// Provisions the shared images and runs every case in parallel.
    ///
    /// At most `parallelism` cases run at once when it is set. The
    /// provisioner is torn down after the last case finishes.
    ///
    /// # Errors
    ///
    /// Returns [`PacktestError::Provisioning`] if the shared images cannot
    /// be provisioned; no case runs in that event.
    pub async fn run(
        self,
        provisioner: Arc<ImageProvisioner>,
        runner: Arc<AcceptanceRunner>,
        parallelism: Option<usize>,
    ) -> Result<SuiteReport> {
        let started_at = Utc::now();
        let Self { cases, skipped } = self;
        if cases.is_empty() {
            tracing::info!(skipped = skipped.len(), "no cases to run");
            return Ok(SuiteReport {
                started_at,
                cases: Vec::new(),
                skipped,
            });
        }

        let images = {
            let provisioner = Arc::clone(&provisioner);
            tokio::task::spawn_blocking(move || provisioner.ensure())
                .await
                .map_err(|e| PacktestError::Provisioning {
                    message: describe_join_error(e),
                })
        };
        let images = match images.and_then(|r| r) {
            Ok(images) => images,
            Err(e) => {
                teardown(provisioner).await;
                return Err(e);
            }
        };
        tracing::info!(
            builder = %images.builder,
            run = %images.run,
            cases = cases.len(),
            "running cases"
        );

        let semaphore = parallelism.map(|n| Arc::new(Semaphore::new(n.max(1))));
        let names: Vec<String> = cases.iter().map(|c| c.name.clone()).collect();
        let mut set = JoinSet::new();
        for (index, case) in cases.into_iter().enumerate() {
            let runner = Arc::clone(&runner);
            let images = Arc::clone(&images);
            let semaphore = semaphore.clone();
            let _ = set.spawn(async move {
                let _permit = match semaphore {
                    Some(semaphore) => semaphore.acquire_owned().await.ok(),
                    None => None,
                };
                let name = case.name.clone();
                let report =
                    tokio::task::spawn_blocking(move || runner.run_case(&images, &case)).await;
                let report = report.unwrap_or_else(|e| {
                    let message = describe_join_error(e);
                    tracing::error!(case = %name, error = %message, "case aborted");
                    CaseReport::errored(name, message)
                });
                (index, report)
            });
        }

        let mut slots: Vec<Option<CaseReport>> = vec![None; names.len()];
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, report)) => slots[index] = Some(report),
                Err(e) => tracing::error!(error = %e, "case task failed"),
            }
        }
        teardown(provisioner).await;

        let cases = slots
            .into_iter()
            .zip(names)
            .map(|(slot, name)| {
                slot.unwrap_or_else(|| CaseReport::errored(name, "case task did not complete"))
            })
            .collect();
        Ok(SuiteReport {
            started_at,
            cases,
            skipped,
        })
    }
}

/// Aggregated outcome of a suite run.
#[derive(Debug, Clone, Serialize)]
pub struct SuiteReport {
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// One report per case that ran, in declaration order.
    pub cases: Vec<CaseReport>,
    /// Names of cases skipped by the version filter.
    pub skipped: Vec<String>,
}

impl SuiteReport {
    /// Returns whether every case that ran passed.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.cases.iter().all(CaseReport::passed)
    }

    /// Returns the reports of failed cases.
    pub fn failed(&self) -> impl Iterator<Item = &CaseReport> {
        self.cases.iter().filter(|c| !c.passed())
    }
}

async fn teardown(provisioner: Arc<ImageProvisioner>) {
    match tokio::task::spawn_blocking(move || provisioner.teardown()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(error = %e, "teardown failed"),
        Err(e) => tracing::warn!(error = %e, "teardown task failed"),
    }
}

fn describe_join_error(e: JoinError) -> String {
    if !e.is_panic() {
        return format!("task cancelled: {e}");
    }
    let payload = e.into_panic();
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    format!("panicked: {message}")
}
