//! `packtest run` — run an acceptance suite.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use packtest_acceptance::engine::{ImageEngine, PackEngine};
use packtest_acceptance::manifest::SuiteManifest;
use packtest_acceptance::provision::ImageProvisioner;
use packtest_acceptance::runner::AcceptanceRunner;
use packtest_acceptance::tracker::ResourceTracker;
use packtest_acceptance::version::VersionFilter;
use packtest_common::config::{HarnessConfig, ReadinessPolicy};
use packtest_common::constants::{
    DEFAULT_FIXTURES_DIR, DEFAULT_PROBE_PORT, DEFAULT_READINESS_ATTEMPTS,
    DEFAULT_READINESS_BACKOFF_MS, DEFAULT_READINESS_MAX_BACKOFF_MS,
};

use super::{BuilderArgs, ToolArgs};
use crate::output::{self, BOLD, DIM, RESET, YELLOW};

/// Exit code after an interrupted run has been cleaned up.
const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Suite manifest (`.json`, `.yaml` or `.yml`).
    pub manifest: PathBuf,

    /// Builder under test.
    #[command(flatten)]
    pub builder: BuilderArgs,

    /// Directory holding one sub-directory per fixture app.
    #[arg(long, env = "PACKTEST_FIXTURES_DIR", default_value = DEFAULT_FIXTURES_DIR)]
    pub fixtures_dir: PathBuf,

    /// Runtime version under test; cases outside their constraint are skipped.
    #[arg(long, env = "PACKTEST_RUNTIME_VERSION")]
    pub runtime_version: Option<String>,

    /// Deployment target passed to every build (e.g. `gae`).
    #[arg(long, env = "PACKTEST_TARGET_PLATFORM")]
    pub target_platform: Option<String>,

    /// Leave the builder, app images, and containers behind.
    #[arg(long, env = "PACKTEST_KEEP_ARTIFACTS")]
    pub keep_artifacts: bool,

    /// Maximum number of cases running at once.
    #[arg(long, env = "PACKTEST_PARALLELISM")]
    pub parallelism: Option<usize>,

    /// Port the application is told to listen on.
    #[arg(long, env = "PACKTEST_PROBE_PORT", default_value_t = DEFAULT_PROBE_PORT)]
    pub probe_port: u16,

    /// Readiness attempts before a container is declared unready.
    #[arg(long, env = "PACKTEST_READINESS_ATTEMPTS", default_value_t = DEFAULT_READINESS_ATTEMPTS)]
    pub readiness_attempts: u32,

    /// Initial delay between readiness attempts, in milliseconds.
    #[arg(long, env = "PACKTEST_READINESS_BACKOFF_MS", default_value_t = DEFAULT_READINESS_BACKOFF_MS)]
    pub readiness_backoff_ms: u64,

    /// Print the report as JSON on stdout.
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    fn harness_config(&self, tools: &ToolArgs) -> HarnessConfig {
        HarnessConfig {
            pack_bin: tools.pack_bin.clone(),
            docker_bin: tools.docker_bin.clone(),
            fixtures_dir: self.fixtures_dir.clone(),
            runtime_version: self.runtime_version.clone(),
            keep_artifacts: self.keep_artifacts,
            parallelism: self.parallelism,
            probe_port: self.probe_port,
            readiness: ReadinessPolicy {
                attempts: self.readiness_attempts,
                initial_backoff_ms: self.readiness_backoff_ms,
                max_backoff_ms: DEFAULT_READINESS_MAX_BACKOFF_MS.max(self.readiness_backoff_ms),
            },
        }
    }
}

/// Loads the manifest, runs every case, and prints the report.
///
/// # Errors
///
/// Returns an error if setup or provisioning fails, or if any case fails.
pub fn execute(args: RunArgs, tools: &ToolArgs) -> anyhow::Result<()> {
    let config = args.harness_config(tools);
    let filter = VersionFilter::new(config.runtime_version.as_deref())?;
    let manifest = SuiteManifest::load(&args.manifest)?;
    let mut suite = manifest.into_suite(filter);
    if let Some(platform) = &args.target_platform {
        suite = suite.with_target_platform(platform);
    }
    let prepared = suite.prepare(&config.fixtures_dir)?;

    eprintln!(
        "{BOLD}packtest run{RESET} {DIM}{} ({} cases, {} skipped){RESET}",
        args.manifest.display(),
        prepared.cases().len(),
        prepared.skipped().len()
    );
    for name in prepared.skipped() {
        eprintln!("  {YELLOW}-{RESET} {name} {DIM}(outside runtime version){RESET}");
    }

    let engine: Arc<dyn ImageEngine> = Arc::new(PackEngine::from_config(&config));
    if !prepared.cases().is_empty() && !engine.is_available() {
        anyhow::bail!(
            "{} and {} must be on PATH",
            config.pack_bin.display(),
            config.docker_bin.display()
        );
    }

    let tracker = ResourceTracker::new();
    let provisioner = Arc::new(
        ImageProvisioner::new(Arc::clone(&engine), args.builder.source()?)
            .with_keep_artifacts(config.keep_artifacts),
    );
    let runner = Arc::new(
        AcceptanceRunner::new(Arc::clone(&engine), &config).with_tracker(tracker.clone()),
    );
    install_abort_handler(engine, tracker, Arc::clone(&provisioner), config.keep_artifacts)?;

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    let report = runtime.block_on(prepared.run(provisioner, runner, config.parallelism))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    output::print_report(&report);

    let failed = report.failed().count();
    if failed > 0 {
        anyhow::bail!("{failed} of {} cases failed", report.cases.len());
    }
    Ok(())
}

/// Removes live containers and images when the run is interrupted.
fn install_abort_handler(
    engine: Arc<dyn ImageEngine>,
    tracker: ResourceTracker,
    provisioner: Arc<ImageProvisioner>,
    keep_artifacts: bool,
) -> anyhow::Result<()> {
    ctrlc::set_handler(move || {
        eprintln!("\n{YELLOW}interrupted{RESET}, cleaning up...");
        if !keep_artifacts {
            let removed = tracker.sweep(engine.as_ref());
            tracing::info!(removed, "swept live resources");
        }
        if let Err(e) = provisioner.teardown() {
            tracing::warn!(error = %e, "teardown after interrupt failed");
        }
        std::process::exit(INTERRUPTED_EXIT_CODE);
    })
    .map_err(|e| anyhow::anyhow!("failed to set Ctrl+C handler: {e}"))
}
