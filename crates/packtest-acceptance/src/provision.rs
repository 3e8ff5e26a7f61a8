//! One-time provisioning of the shared builder/run image pair.
//!
//! [`ImageProvisioner::ensure`] may be called from any number of cases at
//! once. The first caller provisions; everyone else blocks until that
//! finishes and then observes the same outcome, success or failure.
//! Provisioning is never retried within a run.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use packtest_common::constants::BUILDER_IMAGE_PREFIX;
use packtest_common::error::{PacktestError, Result};
use packtest_common::types::ImageRef;

use crate::engine::ImageEngine;

/// Where the builder image comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuilderSource {
    /// Use existing images. They are never removed by teardown.
    Prebuilt {
        /// Builder image.
        builder: ImageRef,
        /// Run image.
        run: ImageRef,
    },
    /// Create a uniquely tagged builder from a builder configuration file.
    /// The created builder is removed by teardown.
    Config {
        /// Builder configuration file.
        config: PathBuf,
        /// Run image referenced by the configuration.
        run: ImageRef,
    },
}

/// The images every case of a run builds with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltImagePair {
    /// Builder image.
    pub builder: ImageRef,
    /// Run image.
    pub run: ImageRef,
}

/// Memoizing provider of the [`BuiltImagePair`] for one run.
pub struct ImageProvisioner {
    engine: Arc<dyn ImageEngine>,
    source: BuilderSource,
    keep_artifacts: bool,
    outcome: OnceLock<std::result::Result<Arc<BuiltImagePair>, String>>,
    started: AtomicBool,
    torn_down: AtomicBool,
}

impl ImageProvisioner {
    /// Creates a provisioner; nothing is built until [`Self::ensure`].
    #[must_use]
    pub fn new(engine: Arc<dyn ImageEngine>, source: BuilderSource) -> Self {
        Self {
            engine,
            source,
            keep_artifacts: false,
            outcome: OnceLock::new(),
            started: AtomicBool::new(false),
            torn_down: AtomicBool::new(false),
        }
    }

    /// Leaves created images behind on teardown.
    #[must_use]
    pub const fn with_keep_artifacts(mut self, keep: bool) -> Self {
        self.keep_artifacts = keep;
        self
    }

    /// Returns the image pair, provisioning it on the first call.
    ///
    /// Concurrent callers block until the first call completes.
    ///
    /// # Errors
    ///
    /// Returns [`PacktestError::Provisioning`] with the same message to
    /// every caller if provisioning failed.
    pub fn ensure(&self) -> Result<Arc<BuiltImagePair>> {
        self.started.store(true, Ordering::SeqCst);
        self.outcome
            .get_or_init(|| {
                self.provision().map(Arc::new).map_err(|e| {
                    tracing::error!(error = %e, "provisioning failed");
                    e.to_string()
                })
            })
            .clone()
            .map_err(|message| PacktestError::Provisioning { message })
    }

    /// Returns the pair if provisioning already succeeded.
    #[must_use]
    pub fn provisioned(&self) -> Option<Arc<BuiltImagePair>> {
        self.outcome.get().and_then(|o| o.as_ref().ok().cloned())
    }

    /// Removes images this provisioner created.
    ///
    /// If provisioning is in flight, this blocks until it completes so the
    /// builder it creates is removed too. Only the first call after
    /// provisioning has started acts; calls before that are no-ops.
    ///
    /// # Errors
    ///
    /// Returns an error if the created builder cannot be removed.
    pub fn teardown(&self) -> Result<()> {
        if !self.started.load(Ordering::SeqCst) {
            return Ok(());
        }
        let outcome = self.outcome.wait();
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if !matches!(self.source, BuilderSource::Config { .. }) {
            return Ok(());
        }
        let Ok(pair) = outcome else {
            return Ok(());
        };
        if self.keep_artifacts {
            tracing::info!(builder = %pair.builder, "keeping builder image");
            return Ok(());
        }
        tracing::info!(builder = %pair.builder, "removing builder image");
        self.engine.remove_image(&pair.builder)
    }

    fn provision(&self) -> Result<BuiltImagePair> {
        match &self.source {
            BuilderSource::Prebuilt { builder, run } => {
                tracing::info!(builder = %builder, run = %run, "using prebuilt images");
                self.engine.ensure_image(run)?;
                self.engine.ensure_image(builder)?;
                Ok(BuiltImagePair {
                    builder: builder.clone(),
                    run: run.clone(),
                })
            }
            BuilderSource::Config { config, run } => {
                if !config.is_file() {
                    return Err(PacktestError::NotFound {
                        kind: "builder config",
                        id: config.display().to_string(),
                    });
                }
                self.engine.ensure_image(run)?;
                let builder = ImageRef::unique(BUILDER_IMAGE_PREFIX, "");
                tracing::info!(builder = %builder, run = %run, "provisioning builder");
                self.engine.create_builder(config, &builder)?;
                Ok(BuiltImagePair {
                    builder,
                    run: run.clone(),
                })
            }
        }
    }
}

impl std::fmt::Debug for ImageProvisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageProvisioner")
            .field("source", &self.source)
            .field("keep_artifacts", &self.keep_artifacts)
            .field("outcome", &self.outcome.get())
            .finish_non_exhaustive()
    }
}
