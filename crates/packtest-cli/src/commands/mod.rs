//! CLI command definitions and dispatch.

pub mod provision;
pub mod run;
pub mod should_test;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use packtest_acceptance::provision::BuilderSource;
use packtest_common::constants::{DEFAULT_DOCKER_BIN, DEFAULT_PACK_BIN};
use packtest_common::types::ImageRef;

/// packtest — acceptance harness for buildpacks.
#[derive(Parser, Debug)]
#[command(name = "packtest", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Tools used to build and run images.
    #[command(flatten)]
    pub tools: ToolArgs,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run an acceptance suite against a builder.
    Run(run::RunArgs),
    /// Create the builder image once and print the image pair.
    Provision(provision::ProvisionArgs),
    /// Check a runtime version against a case's version constraint.
    ShouldTest(should_test::ShouldTestArgs),
}

/// External CLIs the harness drives.
#[derive(Args, Debug, Clone)]
pub struct ToolArgs {
    /// `pack` binary.
    #[arg(long, global = true, env = "PACKTEST_PACK_BIN", default_value = DEFAULT_PACK_BIN)]
    pub pack_bin: PathBuf,

    /// `docker` binary.
    #[arg(long, global = true, env = "PACKTEST_DOCKER_BIN", default_value = DEFAULT_DOCKER_BIN)]
    pub docker_bin: PathBuf,
}

/// Where the builder under test comes from.
#[derive(Args, Debug, Clone)]
pub struct BuilderArgs {
    #[command(flatten)]
    choice: BuilderChoice,

    /// Run image paired with the builder.
    #[arg(long, env = "PACKTEST_RUN_IMAGE")]
    pub run_image: String,
}

#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
struct BuilderChoice {
    /// Builder configuration to create a temporary builder from.
    #[arg(long, env = "PACKTEST_BUILDER_CONFIG")]
    builder_config: Option<PathBuf>,

    /// Existing builder image to test as-is.
    #[arg(long, env = "PACKTEST_BUILDER_IMAGE")]
    builder_image: Option<String>,
}

impl BuilderArgs {
    /// Converts the flags into a [`BuilderSource`].
    ///
    /// # Errors
    ///
    /// Returns an error if neither a builder config nor an image was given.
    pub fn source(&self) -> anyhow::Result<BuilderSource> {
        let run = ImageRef::new(self.run_image.clone());
        match (&self.choice.builder_config, &self.choice.builder_image) {
            (Some(config), _) => Ok(BuilderSource::Config {
                config: config.clone(),
                run,
            }),
            (None, Some(image)) => Ok(BuilderSource::Prebuilt {
                builder: ImageRef::new(image.clone()),
                run,
            }),
            (None, None) => anyhow::bail!("one of --builder-config or --builder-image is required"),
        }
    }
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Run(args) => run::execute(args, &cli.tools),
        Command::Provision(args) => provision::execute(args, &cli.tools),
        Command::ShouldTest(args) => should_test::execute(&args),
    }
}
