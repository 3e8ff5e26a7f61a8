//! Configuration model for an acceptance run.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants;

/// Root configuration for the acceptance harness.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// `pack` CLI used to create builders and build fixtures.
    pub pack_bin: PathBuf,
    /// `docker` CLI used to run and remove containers and images.
    pub docker_bin: PathBuf,
    /// Directory containing one sub-directory per fixture application.
    pub fixtures_dir: PathBuf,
    /// Runtime version under test, used to filter version-gated cases.
    pub runtime_version: Option<String>,
    /// Leave builder, app images, and containers behind for debugging.
    pub keep_artifacts: bool,
    /// Maximum number of cases running at once (`None` = unbounded).
    pub parallelism: Option<usize>,
    /// Container port the application listens on.
    pub probe_port: u16,
    /// Retry policy for container readiness.
    pub readiness: ReadinessPolicy,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            pack_bin: PathBuf::from(constants::DEFAULT_PACK_BIN),
            docker_bin: PathBuf::from(constants::DEFAULT_DOCKER_BIN),
            fixtures_dir: PathBuf::from(constants::DEFAULT_FIXTURES_DIR),
            runtime_version: None,
            keep_artifacts: false,
            parallelism: None,
            probe_port: constants::DEFAULT_PROBE_PORT,
            readiness: ReadinessPolicy::default(),
        }
    }
}

/// Bounded exponential backoff used while waiting for a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessPolicy {
    /// Total number of attempts, including the first.
    pub attempts: u32,
    /// Delay after the first failed attempt, in milliseconds.
    pub initial_backoff_ms: u64,
    /// Upper bound on any single delay, in milliseconds.
    pub max_backoff_ms: u64,
}

impl ReadinessPolicy {
    /// Returns the delay to wait after the given failed attempt (0-based).
    ///
    /// The delay doubles with every attempt and is capped at
    /// `max_backoff_ms`.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1_u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let millis = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(millis)
    }
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            attempts: constants::DEFAULT_READINESS_ATTEMPTS,
            initial_backoff_ms: constants::DEFAULT_READINESS_BACKOFF_MS,
            max_backoff_ms: constants::DEFAULT_READINESS_MAX_BACKOFF_MS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_until_capped() {
        let policy = ReadinessPolicy {
            attempts: 6,
            initial_backoff_ms: 100,
            max_backoff_ms: 500,
        };
        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(400));
        assert_eq!(policy.backoff(3), Duration::from_millis(500));
        assert_eq!(policy.backoff(63), Duration::from_millis(500));
        assert_eq!(policy.backoff(200), Duration::from_millis(500));
    }

    #[test]
    fn partial_config_uses_defaults() {
        let config: HarnessConfig =
            serde_json::from_str(r#"{"keep_artifacts": true, "readiness": {"attempts": 3}}"#)
                .unwrap();
        assert!(config.keep_artifacts);
        assert_eq!(config.readiness.attempts, 3);
        assert_eq!(
            config.readiness.initial_backoff_ms,
            constants::DEFAULT_READINESS_BACKOFF_MS
        );
        assert_eq!(config.pack_bin, PathBuf::from("pack"));
        assert_eq!(config.probe_port, 8080);
    }
}
