//! `packtest provision` — create the builder image pair and keep it.

use std::sync::Arc;

use clap::Args;
use packtest_acceptance::engine::{ImageEngine, PackEngine};
use packtest_acceptance::provision::ImageProvisioner;

use super::{BuilderArgs, ToolArgs};
use crate::output::{BOLD, DIM, GREEN, RESET, format_duration};

/// Arguments for the `provision` command.
#[derive(Args, Debug)]
pub struct ProvisionArgs {
    /// Builder under test.
    #[command(flatten)]
    pub builder: BuilderArgs,
}

/// Provisions the images and prints `builder` and `run` references.
///
/// The images are left in place so later `run --builder-image` invocations
/// can reuse them.
///
/// # Errors
///
/// Returns an error if the tools are missing or provisioning fails.
pub fn execute(args: ProvisionArgs, tools: &ToolArgs) -> anyhow::Result<()> {
    let engine: Arc<dyn ImageEngine> = Arc::new(PackEngine::new(&tools.pack_bin, &tools.docker_bin));
    if !engine.is_available() {
        anyhow::bail!(
            "{} and {} must be on PATH",
            tools.pack_bin.display(),
            tools.docker_bin.display()
        );
    }

    let started = std::time::Instant::now();
    eprintln!("{BOLD}packtest provision{RESET}");
    let provisioner = ImageProvisioner::new(engine, args.builder.source()?).with_keep_artifacts(true);
    let pair = provisioner.ensure()?;
    eprintln!(
        "  {GREEN}✓{RESET} provisioned {DIM}({}){RESET}",
        format_duration(started.elapsed())
    );

    println!("builder={}", pair.builder);
    println!("run={}", pair.run);
    Ok(())
}
