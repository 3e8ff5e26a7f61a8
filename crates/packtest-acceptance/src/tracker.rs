//! Tracking and scoped cleanup of per-case resources.
//!
//! Every app image and container a case creates is registered in a shared
//! [`ResourceTracker`] and held by a [`ResourceGuard`]. Dropping the guard
//! removes the resource, so cleanup happens on success, on assertion
//! failure, on error, and while unwinding from a panic. Whatever is still
//! registered when a run is interrupted can be removed with
//! [`ResourceTracker::sweep`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use packtest_common::types::{ContainerId, ImageRef};

use crate::engine::ImageEngine;

/// A resource owned by exactly one case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackedResource {
    /// A running or exited container.
    Container(ContainerId),
    /// An application image.
    Image(ImageRef),
}

impl TrackedResource {
    fn remove(&self, engine: &dyn ImageEngine) {
        let result = match self {
            Self::Container(id) => engine.remove_container(id),
            Self::Image(image) => engine.remove_image(image),
        };
        if let Err(e) = result {
            tracing::warn!(resource = %self, error = %e, "cleanup failed");
        }
    }
}

impl fmt::Display for TrackedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Container(id) => write!(f, "container {id}"),
            Self::Image(image) => write!(f, "image {image}"),
        }
    }
}

#[derive(Debug, Default)]
struct TrackerInner {
    next: AtomicU64,
    live: Mutex<BTreeMap<u64, TrackedResource>>,
}

/// Registry of resources that are alive right now, shared by all cases.
#[derive(Debug, Clone, Default)]
pub struct ResourceTracker {
    inner: Arc<TrackerInner>,
}

impl ResourceTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a resource and returns the guard that owns it.
    #[must_use]
    pub fn guard(
        &self,
        engine: Arc<dyn ImageEngine>,
        resource: TrackedResource,
        keep: bool,
    ) -> ResourceGuard {
        let token = self.inner.next.fetch_add(1, Ordering::Relaxed);
        let _ = self.lock().insert(token, resource.clone());
        tracing::debug!(resource = %resource, "tracking resource");
        ResourceGuard {
            engine,
            tracker: self.clone(),
            resource,
            token,
            keep,
        }
    }

    /// Returns the resources currently registered, in registration order.
    #[must_use]
    pub fn live(&self) -> Vec<TrackedResource> {
        self.lock().values().cloned().collect()
    }

    /// Returns the number of resources currently registered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Removes every registered resource, containers before images, and
    /// returns how many were swept.
    pub fn sweep(&self, engine: &dyn ImageEngine) -> usize {
        let drained = std::mem::take(&mut *self.lock());
        let (containers, images): (Vec<_>, Vec<_>) = drained
            .into_values()
            .partition(|r| matches!(r, TrackedResource::Container(_)));
        let count = containers.len() + images.len();
        for resource in containers.iter().chain(&images) {
            tracing::info!(resource = %resource, "sweeping resource");
            resource.remove(engine);
        }
        count
    }

    fn release(&self, token: u64) -> bool {
        self.lock().remove(&token).is_some()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<u64, TrackedResource>> {
        self.inner.live.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Owns one tracked resource and removes it when dropped.
pub struct ResourceGuard {
    engine: Arc<dyn ImageEngine>,
    tracker: ResourceTracker,
    resource: TrackedResource,
    token: u64,
    keep: bool,
}

impl ResourceGuard {
    /// Returns the guarded resource.
    #[must_use]
    pub const fn resource(&self) -> &TrackedResource {
        &self.resource
    }
}

impl fmt::Debug for ResourceGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceGuard")
            .field("resource", &self.resource)
            .field("keep", &self.keep)
            .finish_non_exhaustive()
    }
}

impl Drop for ResourceGuard {
    fn drop(&mut self) {
        // A sweep may already have taken the resource.
        if !self.tracker.release(self.token) {
            return;
        }
        if self.keep {
            tracing::info!(resource = %self.resource, "keeping artifact");
            return;
        }
        self.resource.remove(self.engine.as_ref());
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use packtest_common::error::{PacktestError, Result};

    use super::*;
    use crate::engine::{AppBuildRequest, BuildOutput, RunningContainer};

    #[derive(Default)]
    struct RecordingEngine {
        removed: Mutex<Vec<String>>,
    }

    impl RecordingEngine {
        fn removed(&self) -> Vec<String> {
            self.removed.lock().unwrap().clone()
        }
    }

    impl ImageEngine for RecordingEngine {
        fn create_builder(&self, _: &Path, _: &ImageRef) -> Result<()> {
            Ok(())
        }
        fn ensure_image(&self, _: &ImageRef) -> Result<()> {
            Ok(())
        }
        fn build_app(&self, _: &AppBuildRequest<'_>) -> Result<BuildOutput> {
            Err(PacktestError::execution("unused"))
        }
        fn start_container(
            &self,
            _: &ImageRef,
            _: u16,
            _: &[(String, String)],
        ) -> Result<RunningContainer> {
            Err(PacktestError::execution("unused"))
        }
        fn container_logs(&self, _: &ContainerId) -> Result<String> {
            Ok(String::new())
        }
        fn remove_container(&self, id: &ContainerId) -> Result<()> {
            self.removed.lock().unwrap().push(format!("container:{id}"));
            Ok(())
        }
        fn remove_image(&self, image: &ImageRef) -> Result<()> {
            self.removed.lock().unwrap().push(format!("image:{image}"));
            Ok(())
        }
        fn is_available(&self) -> bool {
            true
        }
    }

    #[test]
    fn guard_removes_on_drop() {
        let engine = Arc::new(RecordingEngine::default());
        let tracker = ResourceTracker::new();
        {
            let _guard = tracker.guard(
                engine.clone(),
                TrackedResource::Image(ImageRef::new("app-1")),
                false,
            );
            assert_eq!(tracker.len(), 1);
        }
        assert!(tracker.is_empty());
        assert_eq!(engine.removed(), vec!["image:app-1"]);
    }

    #[test]
    fn guard_removes_while_unwinding() {
        let engine = Arc::new(RecordingEngine::default());
        let tracker = ResourceTracker::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = tracker.guard(
                engine.clone(),
                TrackedResource::Container(ContainerId::new("c1")),
                false,
            );
            panic!("case blew up");
        }));
        assert!(result.is_err());
        assert!(tracker.is_empty());
        assert_eq!(engine.removed(), vec!["container:c1"]);
    }

    #[test]
    fn kept_artifacts_are_released_but_not_removed() {
        let engine = Arc::new(RecordingEngine::default());
        let tracker = ResourceTracker::new();
        drop(tracker.guard(
            engine.clone(),
            TrackedResource::Image(ImageRef::new("app-1")),
            true,
        ));
        assert!(tracker.is_empty());
        assert!(engine.removed().is_empty());
    }

    #[test]
    fn sweep_removes_containers_before_images_once() {
        let engine = Arc::new(RecordingEngine::default());
        let tracker = ResourceTracker::new();
        let image = tracker.guard(
            engine.clone(),
            TrackedResource::Image(ImageRef::new("app-1")),
            false,
        );
        let container = tracker.guard(
            engine.clone(),
            TrackedResource::Container(ContainerId::new("c1")),
            false,
        );

        assert_eq!(tracker.sweep(engine.as_ref()), 2);
        drop(container);
        drop(image);

        assert_eq!(engine.removed(), vec!["container:c1", "image:app-1"]);
    }
}
