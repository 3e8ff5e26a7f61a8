//! `packtest should-test` — evaluate a version constraint.

use clap::Args;

/// Arguments for the `should-test` command.
#[derive(Args, Debug)]
pub struct ShouldTestArgs {
    /// Constraint such as `>= 12.0.0` or `^14 || ^16`. Empty matches all.
    #[arg(default_value = "")]
    pub constraint: String,

    /// Runtime version under test (e.g. `12.1.0`, `v16`).
    #[arg(long, env = "PACKTEST_RUNTIME_VERSION")]
    pub runtime_version: String,
}

/// Prints `true` if a case with the constraint would run on the version.
///
/// # Errors
///
/// Returns an error if the version or the constraint cannot be parsed.
pub fn execute(args: &ShouldTestArgs) -> anyhow::Result<()> {
    let matches = packtest_acceptance::version::should_test(&args.runtime_version, &args.constraint)?;
    tracing::debug!(
        version = %args.runtime_version,
        constraint = %args.constraint,
        matches,
        "evaluated constraint"
    );
    println!("{matches}");
    Ok(())
}
