//! Workspace-wide constants: environment channels, exit codes, and defaults.

/// Environment variable carrying the serialized mock registry into `mockprocess`.
pub const MOCK_PROCESS_MAP_ENV: &str = "PACKTEST_MOCK_PROCESS_MAP";

/// Environment variable pointing at the `mockprocess` binary.
pub const MOCK_PROCESS_BIN_ENV: &str = "PACKTEST_MOCK_PROCESS";

/// Exit code used by `mockprocess` when it cannot run at all.
pub const MOCK_PROCESS_FAILURE_EXIT_CODE: i32 = 70;

/// Detect exit code for a buildpack that participates.
pub const DETECT_PASS_EXIT_CODE: i32 = 0;

/// Detect exit code for a buildpack that opts out.
pub const DETECT_OPT_OUT_EXIT_CODE: i32 = 100;

/// Exit code for a build phase that completed.
pub const BUILD_SUCCESS_EXIT_CODE: i32 = 0;

/// Exit code for a failed detect or build phase.
pub const BUILDPACK_FAILURE_EXIT_CODE: i32 = 1;

/// Build-time variable naming the deployment target of a build.
pub const TARGET_PLATFORM_ENV: &str = "X_GOOGLE_TARGET_PLATFORM";

/// Prefix for builder images created by the provisioner.
pub const BUILDER_IMAGE_PREFIX: &str = "packtest-builder";

/// Prefix for per-case application images.
pub const APP_IMAGE_PREFIX: &str = "packtest-app";

/// Default `pack` CLI binary.
pub const DEFAULT_PACK_BIN: &str = "pack";

/// Default `docker` CLI binary.
pub const DEFAULT_DOCKER_BIN: &str = "docker";

/// Default directory holding fixture applications.
pub const DEFAULT_FIXTURES_DIR: &str = "testdata";

/// Port the application is told to listen on via `PORT`.
pub const DEFAULT_PROBE_PORT: u16 = 8080;

/// Default probe path when a case asks for a probe without one.
pub const DEFAULT_PROBE_PATH: &str = "/";

/// Number of readiness attempts before a container is declared unready.
pub const DEFAULT_READINESS_ATTEMPTS: u32 = 10;

/// Initial delay between readiness attempts, in milliseconds.
pub const DEFAULT_READINESS_BACKOFF_MS: u64 = 500;

/// Upper bound for the delay between readiness attempts, in milliseconds.
pub const DEFAULT_READINESS_MAX_BACKOFF_MS: u64 = 5_000;

/// Per-request timeout for the probe, in milliseconds.
pub const PROBE_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Number of trailing build log lines attached to a failed case.
pub const LOG_TAIL_LINES: usize = 40;
