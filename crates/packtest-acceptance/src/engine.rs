//! Image and container engine abstraction.
//!
//! The harness never talks to a container runtime directly; it goes through
//! [`ImageEngine`]. [`PackEngine`] implements it on top of the `pack` and
//! `docker` command-line tools.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use packtest_common::config::HarnessConfig;
use packtest_common::error::{PacktestError, Result};
use packtest_common::types::{ContainerId, ImageRef};

/// Everything needed to build a fixture into an application image.
#[derive(Debug, Clone, Copy)]
pub struct AppBuildRequest<'a> {
    /// Tag of the produced application image.
    pub image: &'a ImageRef,
    /// Fixture source directory.
    pub fixture: &'a Path,
    /// Builder image to build with.
    pub builder: &'a ImageRef,
    /// Run image the application is based on.
    pub run_image: &'a ImageRef,
    /// Ordered build-time environment.
    pub env: &'a [(String, String)],
}

/// Outcome of an application build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutput {
    /// Full textual build log.
    pub log: String,
    /// Whether the build produced an image.
    pub success: bool,
}

/// A started container and where to reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningContainer {
    /// Container identifier.
    pub id: ContainerId,
    /// `host:port` the application port is published on.
    pub endpoint: String,
}

impl RunningContainer {
    /// Returns the HTTP URL of `path` on this container.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.endpoint)
    }
}

/// Builds images and runs containers on behalf of the harness.
///
/// Implementations must be shareable across the parallel cases of a run.
pub trait ImageEngine: Send + Sync {
    /// Creates `image` as a builder from a builder configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the builder cannot be created.
    fn create_builder(&self, config: &Path, image: &ImageRef) -> Result<()>;

    /// Makes sure `image` is available locally, pulling it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the image is neither present nor pullable.
    fn ensure_image(&self, image: &ImageRef) -> Result<()>;

    /// Builds a fixture into an application image.
    ///
    /// A build that runs but fails is reported through
    /// [`BuildOutput::success`], not as an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the build cannot be started at all.
    fn build_app(&self, request: &AppBuildRequest<'_>) -> Result<BuildOutput>;

    /// Starts a container from `image` with `PORT` set to `port` and
    /// publishes that port on the loopback interface.
    ///
    /// # Errors
    ///
    /// Returns an error if the container cannot be started or its
    /// published port cannot be determined.
    fn start_container(
        &self,
        image: &ImageRef,
        port: u16,
        env: &[(String, String)],
    ) -> Result<RunningContainer>;

    /// Returns the combined output of a container.
    ///
    /// # Errors
    ///
    /// Returns an error if the logs cannot be retrieved.
    fn container_logs(&self, id: &ContainerId) -> Result<String>;

    /// Stops and removes a container.
    ///
    /// # Errors
    ///
    /// Returns an error if the container cannot be removed.
    fn remove_container(&self, id: &ContainerId) -> Result<()>;

    /// Removes an image.
    ///
    /// # Errors
    ///
    /// Returns an error if the image cannot be removed.
    fn remove_image(&self, image: &ImageRef) -> Result<()>;

    /// Returns whether the engine's tooling is installed.
    fn is_available(&self) -> bool;
}

/// [`ImageEngine`] backed by the `pack` and `docker` CLIs.
#[derive(Debug, Clone)]
pub struct PackEngine {
    pack_bin: PathBuf,
    docker_bin: PathBuf,
}

impl PackEngine {
    /// Creates an engine using the given binaries.
    #[must_use]
    pub fn new(pack_bin: impl Into<PathBuf>, docker_bin: impl Into<PathBuf>) -> Self {
        Self {
            pack_bin: pack_bin.into(),
            docker_bin: docker_bin.into(),
        }
    }

    /// Creates an engine from the harness configuration.
    #[must_use]
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self::new(&config.pack_bin, &config.docker_bin)
    }

    fn docker(&self, args: &[&str]) -> Result<String> {
        checked(&self.docker_bin, args)
    }
}

impl ImageEngine for PackEngine {
    fn create_builder(&self, config: &Path, image: &ImageRef) -> Result<()> {
        tracing::info!(builder = %image, config = %config.display(), "creating builder");
        let config = config.display().to_string();
        let _ = checked(
            &self.pack_bin,
            &[
                "builder",
                "create",
                image.as_str(),
                "--config",
                &config,
                "--pull-policy",
                "if-not-present",
            ],
        )?;
        Ok(())
    }

    fn ensure_image(&self, image: &ImageRef) -> Result<()> {
        if self.docker(&["image", "inspect", image.as_str()]).is_ok() {
            tracing::debug!(image = %image, "image present locally");
            return Ok(());
        }
        tracing::info!(image = %image, "pulling image");
        let _ = self.docker(&["pull", image.as_str()])?;
        Ok(())
    }

    fn build_app(&self, request: &AppBuildRequest<'_>) -> Result<BuildOutput> {
        let fixture = request.fixture.display().to_string();
        let env: Vec<String> = request
            .env
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect();

        let mut cmd = Command::new(&self.pack_bin);
        let _ = cmd
            .args(["build", request.image.as_str()])
            .args(["--builder", request.builder.as_str()])
            .args(["--run-image", request.run_image.as_str()])
            .args(["--path", &fixture])
            .args(["--pull-policy", "never", "--trust-builder", "--no-color"]);
        for entry in &env {
            let _ = cmd.args(["--env", entry]);
        }

        tracing::info!(image = %request.image, fixture = %fixture, "building application");
        let output = cmd.output().map_err(|e| PacktestError::Io {
            path: self.pack_bin.clone(),
            source: e,
        })?;

        let mut log = String::from_utf8_lossy(&output.stdout).into_owned();
        log.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(BuildOutput {
            log,
            success: output.status.success(),
        })
    }

    fn start_container(
        &self,
        image: &ImageRef,
        port: u16,
        env: &[(String, String)],
    ) -> Result<RunningContainer> {
        let port_env = format!("PORT={port}");
        let publish = format!("127.0.0.1::{port}");
        let env: Vec<String> = env.iter().map(|(k, v)| format!("{k}={v}")).collect();

        let mut args = vec!["run", "--detach", "--env", port_env.as_str()];
        for entry in &env {
            args.extend(["--env", entry.as_str()]);
        }
        args.extend(["--publish", publish.as_str(), image.as_str()]);

        let id = ContainerId::new(self.docker(&args)?.trim());
        tracing::info!(container = %id, image = %image, "container started");

        let mapping = format!("{port}/tcp");
        let endpoint = self
            .docker(&["port", id.as_str(), &mapping])
            .and_then(|out| {
                parse_port_mapping(&out).ok_or_else(|| {
                    PacktestError::execution(format!(
                        "container {id}: no host mapping for port {port} in {out:?}"
                    ))
                })
            });
        match endpoint {
            Ok(endpoint) => Ok(RunningContainer { id, endpoint }),
            Err(e) => {
                // The caller never learns the id, so clean up here.
                if let Err(rm) = self.remove_container(&id) {
                    tracing::warn!(container = %id, error = %rm, "failed to remove container");
                }
                Err(e)
            }
        }
    }

    fn container_logs(&self, id: &ContainerId) -> Result<String> {
        let output = run(&self.docker_bin, &["logs", id.as_str()])?;
        let mut logs = String::from_utf8_lossy(&output.stdout).into_owned();
        logs.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(logs)
    }

    fn remove_container(&self, id: &ContainerId) -> Result<()> {
        tracing::debug!(container = %id, "removing container");
        let _ = self.docker(&["rm", "--force", "--volumes", id.as_str()])?;
        Ok(())
    }

    fn remove_image(&self, image: &ImageRef) -> Result<()> {
        tracing::debug!(image = %image, "removing image");
        let _ = self.docker(&["rmi", "--force", image.as_str()])?;
        Ok(())
    }

    fn is_available(&self) -> bool {
        which::which(&self.pack_bin).is_ok() && which::which(&self.docker_bin).is_ok()
    }
}

/// Extracts `host:port` from `docker port` output, preferring IPv4.
///
/// `docker port` prints one mapping per line, e.g. `127.0.0.1:49153`.
fn parse_port_mapping(output: &str) -> Option<String> {
    let mappings: Vec<&str> = output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    mappings
        .iter()
        .find(|m| !m.starts_with('['))
        .or_else(|| mappings.first())
        .map(|m| (*m).to_string())
}

fn run(bin: &Path, args: &[&str]) -> Result<Output> {
    Command::new(bin)
        .args(args)
        .output()
        .map_err(|e| PacktestError::Io {
            path: bin.to_path_buf(),
            source: e,
        })
}

// Runs a command and returns its stdout, failing on a non-zero status.
fn checked(bin: &Path, args: &[&str]) -> Result<String> {
    let output = run(bin, args)?;
    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    } else {
        Err(PacktestError::execution(format!(
            "`{} {}` exited with {}: {}",
            bin.display(),
            args.join(" "),
            output.status.code().unwrap_or(-1),
            String::from_utf8_lossy(&output.stderr).trim()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_mapping_prefers_ipv4() {
        assert_eq!(
            parse_port_mapping("[::1]:49160\n127.0.0.1:49153\n").as_deref(),
            Some("127.0.0.1:49153")
        );
        assert_eq!(parse_port_mapping("127.0.0.1:32768").as_deref(), Some("127.0.0.1:32768"));
        assert_eq!(parse_port_mapping("[::1]:49160").as_deref(), Some("[::1]:49160"));
        assert_eq!(parse_port_mapping("\n"), None);
    }

    #[test]
    fn container_url_joins_path() {
        let container = RunningContainer {
            id: ContainerId::new("c1"),
            endpoint: "127.0.0.1:49153".into(),
        };
        assert_eq!(container.url("/index.txt"), "http://127.0.0.1:49153/index.txt");
    }

    #[test]
    fn missing_binary_is_an_io_error() {
        let result = checked(Path::new("/nonexistent/packtest-docker"), &["ps"]);
        assert!(matches!(result, Err(PacktestError::Io { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn failing_command_is_an_execution_error_with_stderr() {
        let result = checked(Path::new("sh"), &["-c", "echo boom >&2; exit 3"]);
        let err = result.unwrap_err().to_string();
        assert!(err.contains("exited with 3"), "{err}");
        assert!(err.contains("boom"), "{err}");
    }

    #[test]
    fn engine_without_tools_is_unavailable() {
        let engine = PackEngine::new("/nonexistent/pack", "/nonexistent/docker");
        assert!(!engine.is_available());
    }
}
