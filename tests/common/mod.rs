//! Shared test fixtures: a scripted artifact factory, a recording
//! listener, and archive helpers.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use tempfile::TempDir;

use hangar::deploy::{ArchiveDeployer, DeployError, DeploymentListener, DomainArchiveDeployer};
use hangar::domain::{
    ArtifactDescriptor, ArtifactFactory, ArtifactStatus, DeployableArtifact, DeploymentProperties,
};

/// Per-artifact scripted behavior, keyed by artifact name
#[derive(Debug, Default, Clone)]
pub struct Script {
    pub fail_construct: bool,
    pub fail_start: bool,
    pub fail_stop: bool,
    pub start_delay: Option<Duration>,
}

/// Factory producing scripted artifacts and recording lifecycle calls
#[derive(Default)]
pub struct TestFactory {
    scripts: Mutex<HashMap<String, Script>>,
    /// Ordered log of "start:<name>" / "stop:<name>" calls
    pub log: Arc<Mutex<Vec<String>>>,
    /// Artifacts currently inside start()
    pub in_start: Arc<AtomicUsize>,
    /// High-water mark of concurrent start() calls
    pub peak_start: Arc<AtomicUsize>,
}

impl TestFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, name: &str, script: Script) {
        self.scripts.lock().unwrap().insert(name.to_string(), script);
    }

    pub fn log_entries(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn starts_of(&self, name: &str) -> usize {
        let needle = format!("start:{name}");
        self.log_entries().iter().filter(|e| **e == needle).count()
    }
}

#[async_trait]
impl ArtifactFactory for TestFactory {
    type Artifact = TestArtifact;

    async fn create_artifact(
        &self,
        location: &Path,
        _properties: Option<&DeploymentProperties>,
    ) -> anyhow::Result<Self::Artifact> {
        let descriptor = ArtifactDescriptor::load(location)?;
        let name = descriptor.resolved_name(location);

        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(&name)
            .cloned()
            .unwrap_or_default();
        if script.fail_construct {
            anyhow::bail!("scripted construction failure for '{name}'");
        }

        Ok(TestArtifact {
            name,
            location: location.to_path_buf(),
            descriptor,
            script,
            log: self.log.clone(),
            in_start: self.in_start.clone(),
            peak_start: self.peak_start.clone(),
            status: Mutex::new(ArtifactStatus::NotDeployed),
        })
    }
}

pub struct TestArtifact {
    name: String,
    location: PathBuf,
    descriptor: ArtifactDescriptor,
    script: Script,
    log: Arc<Mutex<Vec<String>>>,
    in_start: Arc<AtomicUsize>,
    peak_start: Arc<AtomicUsize>,
    status: Mutex<ArtifactStatus>,
}

#[async_trait]
impl DeployableArtifact for TestArtifact {
    fn name(&self) -> &str {
        &self.name
    }

    fn location(&self) -> &Path {
        &self.location
    }

    fn descriptor(&self) -> &ArtifactDescriptor {
        &self.descriptor
    }

    fn resource_files(&self) -> Vec<PathBuf> {
        self.descriptor.resource_files(&self.location)
    }

    fn status(&self) -> ArtifactStatus {
        *self.status.lock().unwrap()
    }

    async fn start(&self) -> anyhow::Result<()> {
        let now = self.in_start.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_start.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.script.start_delay {
            tokio::time::sleep(delay).await;
        }

        self.log.lock().unwrap().push(format!("start:{}", self.name));
        self.in_start.fetch_sub(1, Ordering::SeqCst);

        if self.script.fail_start {
            *self.status.lock().unwrap() = ArtifactStatus::DeploymentFailed;
            anyhow::bail!("scripted start failure for '{}'", self.name);
        }
        *self.status.lock().unwrap() = ArtifactStatus::Started;
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.log.lock().unwrap().push(format!("stop:{}", self.name));
        if self.script.fail_stop {
            anyhow::bail!("scripted stop failure for '{}'", self.name);
        }
        *self.status.lock().unwrap() = ArtifactStatus::Stopped;
        Ok(())
    }

    fn dispose(&self) {}
}

/// Listener recording every callback as "<event>:<name>"
#[derive(Default)]
pub struct RecordingListener {
    pub events: Mutex<Vec<String>>,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn count_of(&self, event: &str) -> usize {
        self.events().iter().filter(|e| *e == event).count()
    }

    fn record(&self, event: &str, name: &str) {
        self.events.lock().unwrap().push(format!("{event}:{name}"));
    }
}

impl DeploymentListener for RecordingListener {
    fn on_deployment_start(&self, name: &str) {
        self.record("deployment_start", name);
    }
    fn on_deployment_success(&self, name: &str) {
        self.record("deployment_success", name);
    }
    fn on_deployment_failure(&self, name: &str, _error: &DeployError) {
        self.record("deployment_failure", name);
    }
    fn on_undeployment_start(&self, name: &str) {
        self.record("undeployment_start", name);
    }
    fn on_undeployment_success(&self, name: &str) {
        self.record("undeployment_success", name);
    }
    fn on_undeployment_failure(&self, name: &str, _error: &DeployError) {
        self.record("undeployment_failure", name);
    }
    fn on_redeployment_start(&self, name: &str) {
        self.record("redeployment_start", name);
    }
    fn on_redeployment_success(&self, name: &str) {
        self.record("redeployment_success", name);
    }
    fn on_redeployment_failure(&self, name: &str, _error: &DeployError) {
        self.record("redeployment_failure", name);
    }
}

/// Listener whose on_deployment_start blocks until released; used to hold
/// the deployment lock open from inside an operation.
pub struct BlockingListener {
    gate: Mutex<Option<std::sync::mpsc::Receiver<()>>>,
}

impl BlockingListener {
    pub fn new() -> (Arc<Self>, std::sync::mpsc::Sender<()>) {
        let (tx, rx) = std::sync::mpsc::channel();
        (
            Arc::new(Self {
                gate: Mutex::new(Some(rx)),
            }),
            tx,
        )
    }
}

impl DeploymentListener for BlockingListener {
    fn on_deployment_start(&self, _name: &str) {
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            // block this (and only this) deployment until the test releases
            let _ = gate.recv_timeout(Duration::from_secs(10));
        }
    }
}

/// Write a gzipped tar archive with the given (path, content) entries
pub fn write_archive(path: &Path, entries: &[(&str, &str)]) {
    let file = std::fs::File::create(path).unwrap();
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (name, content) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, name, content.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap();
}

/// Write an application archive `<name>.tgz` whose descriptor optionally
/// depends on a domain
pub fn write_app_archive(dir: &Path, name: &str, domain: Option<&str>) -> PathBuf {
    let descriptor = match domain {
        Some(domain) => format!("name: {name}\ndomain: {domain}\n"),
        None => format!("name: {name}\n"),
    };
    let path = dir.join(format!("{name}.tgz"));
    write_archive(&path, &[("hangar-artifact.yaml", &descriptor)]);
    path
}

/// Write an exploded artifact directory with a descriptor
pub fn write_exploded(dir: &Path, name: &str, domain: Option<&str>) -> PathBuf {
    let location = dir.join(name);
    std::fs::create_dir_all(&location).unwrap();
    let descriptor = match domain {
        Some(domain) => format!("name: {name}\ndomain: {domain}\n"),
        None => format!("name: {name}\n"),
    };
    std::fs::write(location.join("hangar-artifact.yaml"), descriptor).unwrap();
    location
}

/// A deployment environment: one temp root with apps/domains/data dirs and
/// deployers wired over shared scripted factories.
pub struct TestHarness {
    pub root: TempDir,
    pub apps_factory: Arc<TestFactory>,
    pub domains_factory: Arc<TestFactory>,
    pub applications: Arc<ArchiveDeployer<Arc<TestFactory>>>,
    pub domains: Arc<ArchiveDeployer<Arc<TestFactory>>>,
    pub domain_deployer: Arc<DomainArchiveDeployer<Arc<TestFactory>, Arc<TestFactory>>>,
}

impl TestHarness {
    pub fn new() -> Self {
        let root = TempDir::new().unwrap();
        let apps_dir = root.path().join("apps");
        let domains_dir = root.path().join("domains");
        let data_dir = root.path().join("data");
        std::fs::create_dir_all(&apps_dir).unwrap();
        std::fs::create_dir_all(&domains_dir).unwrap();
        std::fs::create_dir_all(&data_dir).unwrap();

        let apps_factory = Arc::new(TestFactory::new());
        let domains_factory = Arc::new(TestFactory::new());

        let applications = Arc::new(ArchiveDeployer::new(
            apps_factory.clone(),
            &apps_dir,
            &data_dir,
        ));
        let domains = Arc::new(
            ArchiveDeployer::new(domains_factory.clone(), &domains_dir, &data_dir)
                .without_quarantine(),
        );
        let domain_deployer = Arc::new(DomainArchiveDeployer::new(
            domains.clone(),
            applications.clone(),
        ));

        Self {
            root,
            apps_factory,
            domains_factory,
            applications,
            domains,
            domain_deployer,
        }
    }

    pub fn apps_dir(&self) -> PathBuf {
        self.root.path().join("apps")
    }

    pub fn domains_dir(&self) -> PathBuf {
        self.root.path().join("domains")
    }
}
