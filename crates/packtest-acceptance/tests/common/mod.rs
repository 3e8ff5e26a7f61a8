//! Shared fakes for acceptance integration tests.

#![allow(dead_code, clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use packtest_acceptance::engine::{AppBuildRequest, BuildOutput, ImageEngine, RunningContainer};
use packtest_common::error::{PacktestError, Result};
use packtest_common::types::{ContainerId, ImageRef};

/// Renders a pack-style detect section listing `ids`.
pub fn detect_log(ids: &[&str], extra: &str) -> String {
    let mut log = String::from("===> DETECTING\n");
    log.push_str(&format!("[detector] {} of 6 buildpacks participating\n", ids.len()));
    for id in ids {
        log.push_str(&format!("[detector] {id} 1.0.0\n"));
    }
    log.push_str("===> BUILDING\n");
    log.push_str(extra);
    log
}

/// In-memory engine scripted per fixture name.
#[derive(Default)]
pub struct FakeEngine {
    /// Build logs per app, indexed by build number of the same image.
    scripts: Mutex<HashMap<String, Vec<String>>>,
    failing: Mutex<HashSet<String>>,
    panicking: Mutex<HashSet<String>>,
    endpoint: Mutex<Option<String>>,
    fail_provisioning: bool,
    pub builders_created: AtomicUsize,
    pub builds: Mutex<BTreeMap<String, usize>>,
    pub build_env: Mutex<HashMap<String, Vec<(String, String)>>>,
    pub containers_started: AtomicUsize,
    pub removed_images: Mutex<Vec<String>>,
    pub removed_containers: Mutex<Vec<String>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_provisioning() -> Self {
        Self {
            fail_provisioning: true,
            ..Self::default()
        }
    }

    pub fn script(self, app: &str, logs: &[String]) -> Self {
        let _ = self
            .scripts
            .lock()
            .unwrap()
            .insert(app.to_string(), logs.to_vec());
        self
    }

    pub fn fail_build(self, app: &str) -> Self {
        let _ = self.failing.lock().unwrap().insert(app.to_string());
        self
    }

    pub fn panic_on_build(self, app: &str) -> Self {
        let _ = self.panicking.lock().unwrap().insert(app.to_string());
        self
    }

    pub fn serve_at(self, endpoint: String) -> Self {
        *self.endpoint.lock().unwrap() = Some(endpoint);
        self
    }

    pub fn total_builds(&self) -> usize {
        self.builds.lock().unwrap().values().sum()
    }

    pub fn removed_images(&self) -> Vec<String> {
        self.removed_images.lock().unwrap().clone()
    }

    pub fn removed_containers(&self) -> Vec<String> {
        self.removed_containers.lock().unwrap().clone()
    }
}

fn app_of(fixture: &Path) -> String {
    fixture
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string()
}

impl ImageEngine for FakeEngine {
    fn create_builder(&self, _config: &Path, _image: &ImageRef) -> Result<()> {
        let _ = self.builders_created.fetch_add(1, Ordering::SeqCst);
        if self.fail_provisioning {
            return Err(PacktestError::execution("pack builder create exited with 1"));
        }
        Ok(())
    }

    fn ensure_image(&self, _image: &ImageRef) -> Result<()> {
        Ok(())
    }

    fn build_app(&self, request: &AppBuildRequest<'_>) -> Result<BuildOutput> {
        let app = app_of(request.fixture);
        if self.panicking.lock().unwrap().contains(&app) {
            panic!("engine exploded while building {app}");
        }
        let build_number = {
            let mut builds = self.builds.lock().unwrap();
            let count = builds.entry(request.image.to_string()).or_insert(0);
            *count += 1;
            *count
        };
        let _ = self
            .build_env
            .lock()
            .unwrap()
            .insert(app.clone(), request.env.to_vec());

        if self.failing.lock().unwrap().contains(&app) {
            let mut log = (1..=60).map(|i| format!("line {i}\n")).collect::<String>();
            log.push_str("ERROR: failed to build: exit status 1\n");
            return Ok(BuildOutput {
                log,
                success: false,
            });
        }

        let scripts = self.scripts.lock().unwrap();
        let logs = scripts
            .get(&app)
            .unwrap_or_else(|| panic!("no script for {app}"));
        let index = (build_number - 1).min(logs.len() - 1);
        Ok(BuildOutput {
            log: logs[index].clone(),
            success: true,
        })
    }

    fn start_container(
        &self,
        image: &ImageRef,
        _port: u16,
        _env: &[(String, String)],
    ) -> Result<RunningContainer> {
        let n = self.containers_started.fetch_add(1, Ordering::SeqCst);
        let endpoint = self
            .endpoint
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| PacktestError::execution(format!("cannot run {image}")))?;
        Ok(RunningContainer {
            id: ContainerId::new(format!("container-{n}")),
            endpoint,
        })
    }

    fn container_logs(&self, id: &ContainerId) -> Result<String> {
        Ok(format!("logs of {id}"))
    }

    fn remove_container(&self, id: &ContainerId) -> Result<()> {
        self.removed_containers.lock().unwrap().push(id.to_string());
        Ok(())
    }

    fn remove_image(&self, image: &ImageRef) -> Result<()> {
        self.removed_images.lock().unwrap().push(image.to_string());
        Ok(())
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// Serves every connection with the same canned response; returns `host:port`.
pub fn http_server(status_line: &'static str, body: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    let _ = std::thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { continue };
            let mut buf = [0_u8; 2048];
            let _ = stream.read(&mut buf);
            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(response.as_bytes());
        }
    });
    addr.to_string()
}

/// Creates one empty fixture directory per app.
pub fn fixtures(apps: &[&str]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    for app in apps {
        std::fs::create_dir_all(dir.path().join(app)).expect("fixture dir");
    }
    dir
}

/// Writes a builder configuration file into `dir`.
pub fn builder_config(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("builder.toml");
    std::fs::write(&path, "[[buildpacks]]\nuri = \"nodejs\"\n").expect("config");
    path
}
