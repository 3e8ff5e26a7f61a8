//! # packtest-acceptance
//!
//! Acceptance-test orchestration for buildpacks.
//!
//! A run provisions one builder/run image pair through the
//! [`ImageProvisioner`](provision::ImageProvisioner), filters the declared
//! [`TestCase`](testcase::TestCase)s by runtime version, and drives every
//! surviving case in parallel through the
//! [`AcceptanceRunner`](runner::AcceptanceRunner). Each case builds its
//! fixture, checks which buildpacks participated, optionally rebuilds to
//! check cache-warm output, optionally probes a running container, and
//! removes everything it created.
//!
//! The image/container engine is abstracted behind
//! [`ImageEngine`](engine::ImageEngine); [`PackEngine`](engine::PackEngine)
//! drives the `pack` and `docker` CLIs.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod engine;
pub mod manifest;
pub mod markers;
pub mod probe;
pub mod provision;
pub mod runner;
pub mod suite;
pub mod testcase;
pub mod tracker;
pub mod version;
