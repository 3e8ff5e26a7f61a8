//! # packtest-mock
//!
//! Deterministic fakes for the external tools a buildpack shells out to.
//!
//! - [`MockRegistry`](registry::MockRegistry): ordered command-substring to
//!   scripted-behavior records, carried to the executor through one
//!   environment variable.
//! - [`executor`]: the dispatch logic behind the `mockprocess` binary.
//! - [`BuildRunner`](runner::BuildRunner): runs a detect or build entry point
//!   in a throwaway filesystem with every external command routed through
//!   `mockprocess`.
//!
//! # Example
//!
//! ```rust,no_run
//! use packtest_mock::registry::Mock;
//! use packtest_mock::runner::BuildRunner;
//!
//! let result = BuildRunner::from_env()?
//!     .with_file("package.json", "{}")
//!     .with_exec_mocks([Mock::new("npm install").with_stdout("added 1 package")])
//!     .run_build(|ctx| {
//!         let _ = ctx.exec(&["npm", "install"])?;
//!         Ok(())
//!     })?;
//! assert!(result.command_executed("npm install"));
//! # Ok::<(), packtest_common::error::PacktestError>(())
//! ```

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod context;
pub mod executor;
pub mod registry;
pub mod runner;
