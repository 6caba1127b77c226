//! The deployment directory watcher.
//!
//! A single scheduling task periodically snapshots the domain and
//! application deployment directories, diffs each listing against the
//! previously observed one, and turns the differences into undeploy /
//! deploy / redeploy calls. One async mutex (the deployment lock)
//! serializes a full cycle against any administrative operation, so a
//! manual deploy and the automatic sweep never race on the same directory.
//!
//! Within one held cycle the configured [`DeploymentStrategy`] may fan
//! independent application deploys out to a bounded pool; undeploys always
//! run sequentially because their ordering interacts with the domain
//! dependency cascade.

use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use tokio::sync::mpsc;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::deploy::{artifact_name_of, is_archive_name, ArchiveDeployer, DomainArchiveDeployer};
use crate::domain::{ArtifactDescriptor, ArtifactFactory};

use super::strategy::DeploymentStrategy;

/// Observed state of one file or directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: Option<SystemTime>,
    len: u64,
}

impl FileStamp {
    fn of(path: &Path) -> Self {
        let metadata = std::fs::metadata(path).ok();
        Self {
            modified: metadata.as_ref().and_then(|m| m.modified().ok()),
            len: metadata.map(|m| m.len()).unwrap_or(0),
        }
    }
}

/// Listing of one deployment directory: packaged archives and exploded
/// artifact directories, keyed by artifact name.
#[derive(Debug, Default, Clone)]
pub struct DirectorySnapshot {
    packaged: HashMap<String, (String, FileStamp)>,
    exploded: HashMap<String, FileStamp>,
}

impl DirectorySnapshot {
    /// List a deployment directory. Anchor files, hidden entries, and
    /// unrecognized files are ignored.
    pub fn scan(dir: &Path) -> io::Result<Self> {
        let mut snapshot = Self::default();
        if !dir.exists() {
            return Ok(snapshot);
        }

        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            let file_name = entry.file_name().to_string_lossy().to_string();
            if file_name.starts_with('.') {
                continue;
            }

            let file_type = entry.file_type()?;
            if file_type.is_file() && is_archive_name(&file_name) {
                if let Some(name) = artifact_name_of(&path) {
                    snapshot
                        .packaged
                        .insert(name, (file_name, FileStamp::of(&path)));
                }
            } else if file_type.is_dir() {
                // the descriptor is the change signal for an exploded
                // artifact; fall back to the directory itself
                let descriptor = ArtifactDescriptor::file_in(&path);
                let stamp = if descriptor.exists() {
                    FileStamp::of(&descriptor)
                } else {
                    FileStamp::of(&path)
                };
                snapshot.exploded.insert(file_name, stamp);
            }
        }
        Ok(snapshot)
    }

    fn diff_keys<V: PartialEq>(
        previous: &HashMap<String, V>,
        current: &HashMap<String, V>,
    ) -> EntryDiff {
        let mut diff = EntryDiff::default();
        for (name, stamp) in current {
            match previous.get(name) {
                None => diff.added.push(name.clone()),
                Some(old) if old != stamp => diff.changed.push(name.clone()),
                Some(_) => {}
            }
        }
        for name in previous.keys() {
            if !current.contains_key(name) {
                diff.removed.push(name.clone());
            }
        }
        diff.added.sort();
        diff.changed.sort();
        diff.removed.sort();
        diff
    }

    /// Classify entries against a previous snapshot
    pub fn diff(&self, previous: &Self) -> SnapshotDiff {
        SnapshotDiff {
            packaged: Self::diff_keys(&previous.packaged, &self.packaged),
            exploded: Self::diff_keys(&previous.exploded, &self.exploded),
        }
    }

    fn packaged_file_name(&self, name: &str) -> Option<&str> {
        self.packaged.get(name).map(|(file, _)| file.as_str())
    }

    /// Whether a packaged archive with this base name is present. The
    /// packaged form is authoritative: the exploded directory it installs
    /// is its output, not an independent deployment.
    pub fn has_packaged(&self, name: &str) -> bool {
        self.packaged.contains_key(name)
    }
}

/// New / changed / removed entry names
#[derive(Debug, Default, Clone)]
pub struct EntryDiff {
    pub added: Vec<String>,
    pub changed: Vec<String>,
    pub removed: Vec<String>,
}

impl EntryDiff {
    fn candidates(&self) -> Vec<String> {
        let mut names = self.added.clone();
        names.extend(self.changed.iter().cloned());
        names
    }
}

/// Diff of one deployment directory
#[derive(Debug, Default, Clone)]
pub struct SnapshotDiff {
    pub packaged: EntryDiff,
    pub exploded: EntryDiff,
}

/// Counts of operations attempted during one scan cycle
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleSummary {
    pub deployments: usize,
    pub undeployments: usize,
    pub redeployments: usize,
}

impl CycleSummary {
    pub fn is_quiet(&self) -> bool {
        *self == Self::default()
    }
}

/// The directory-watching scheduler
pub struct DeploymentDirectoryWatcher<DF: ArtifactFactory, AF: ArtifactFactory> {
    domain_deployer: Arc<DomainArchiveDeployer<DF, AF>>,
    applications: Arc<ArchiveDeployer<AF>>,
    strategy: Box<dyn DeploymentStrategy<AF>>,
    poll_interval: Duration,
    deployment_lock: Arc<AsyncMutex<()>>,
    state: Mutex<ObservedState>,
}

#[derive(Default)]
struct ObservedState {
    domains: DirectorySnapshot,
    applications: DirectorySnapshot,
}

impl<DF: ArtifactFactory, AF: ArtifactFactory> DeploymentDirectoryWatcher<DF, AF> {
    pub fn new(
        domain_deployer: Arc<DomainArchiveDeployer<DF, AF>>,
        strategy: Box<dyn DeploymentStrategy<AF>>,
        poll_interval: Duration,
    ) -> Self {
        let applications = domain_deployer.applications().clone();
        Self {
            domain_deployer,
            applications,
            strategy,
            poll_interval,
            deployment_lock: Arc::new(AsyncMutex::new(())),
            state: Mutex::new(ObservedState::default()),
        }
    }

    /// The lock serializing watcher cycles against administrative
    /// operations. Hold it for the duration of any manual deploy/undeploy/
    /// redeploy.
    pub fn deployment_lock(&self) -> Arc<AsyncMutex<()>> {
        self.deployment_lock.clone()
    }

    /// The domain-aware deployer administrative calls should go through
    pub fn domain_deployer(&self) -> &Arc<DomainArchiveDeployer<DF, AF>> {
        &self.domain_deployer
    }

    /// The application deployer
    pub fn applications(&self) -> &Arc<ArchiveDeployer<AF>> {
        &self.applications
    }

    /// Run one full scan cycle under the deployment lock
    pub async fn scan_once(&self) -> io::Result<CycleSummary> {
        let _guard = self.deployment_lock.lock().await;
        self.run_cycle().await
    }

    async fn run_cycle(&self) -> io::Result<CycleSummary> {
        let domains_dir = self.domain_deployer.domains().deployment_dir().to_path_buf();
        let apps_dir = self.applications.deployment_dir().to_path_buf();

        let current_domains = DirectorySnapshot::scan(&domains_dir)?;
        let current_apps = DirectorySnapshot::scan(&apps_dir)?;

        let (domain_diff, app_diff) = {
            let state = self.state.lock().expect("watcher state poisoned");
            (
                current_domains.diff(&state.domains),
                current_apps.diff(&state.applications),
            )
        };

        let mut summary = CycleSummary::default();

        // removals first: a removed domain cascades to its applications
        // before any new deployment runs
        self.undeploy_removed_domains(&current_domains, &domain_diff, &mut summary)
            .await;
        self.undeploy_removed_applications(&current_apps, &app_diff, &mut summary)
            .await;

        // domains deploy before the applications that may depend on them
        self.deploy_domains(&current_domains, &domain_diff, &mut summary).await;
        self.deploy_applications(&current_apps, &app_diff, &mut summary).await;

        {
            let mut state = self.state.lock().expect("watcher state poisoned");
            state.domains = current_domains;
            state.applications = current_apps;
        }

        if !summary.is_quiet() {
            info!(
                deployments = summary.deployments,
                undeployments = summary.undeployments,
                redeployments = summary.redeployments,
                "deployment scan cycle complete"
            );
        }
        Ok(summary)
    }

    async fn undeploy_removed_domains(
        &self,
        current: &DirectorySnapshot,
        diff: &SnapshotDiff,
        summary: &mut CycleSummary,
    ) {
        for name in removed_names(current, diff) {
            let domains = self.domain_deployer.domains();
            if domains.find_artifact(&name).is_none() && !domains.has_zombie(&name) {
                continue;
            }
            summary.undeployments += 1;
            if let Err(e) = self.domain_deployer.undeploy_artifact(&name).await {
                warn!(domain = %name, error = %e, "domain undeployment failed, continuing");
            }
        }
    }

    async fn undeploy_removed_applications(
        &self,
        current: &DirectorySnapshot,
        diff: &SnapshotDiff,
        summary: &mut CycleSummary,
    ) {
        for name in removed_names(current, diff) {
            if self.applications.find_artifact(&name).is_none()
                && !self.applications.has_zombie(&name)
            {
                continue;
            }
            summary.undeployments += 1;
            if let Err(e) = self.applications.undeploy_artifact(&name).await {
                warn!(application = %name, error = %e, "application undeployment failed, continuing");
            }
        }
    }

    async fn deploy_domains(
        &self,
        snapshot: &DirectorySnapshot,
        diff: &SnapshotDiff,
        summary: &mut CycleSummary,
    ) {
        let domains_dir = self.domain_deployer.domains().deployment_dir().to_path_buf();

        // domains never parallelize: applications may depend on them
        for name in diff.packaged.candidates() {
            let Some(file_name) = snapshot.packaged_file_name(&name) else {
                continue;
            };
            // an earlier undeploy this cycle may have consumed the entry
            if !domains_dir.join(file_name).is_file() {
                continue;
            }
            summary.deployments += 1;
            if let Err(e) = self
                .domain_deployer
                .deploy_packaged_artifact(file_name, None)
                .await
            {
                warn!(domain = %name, error = %e, "domain deployment failed, continuing");
            }
        }

        for name in diff.exploded.added.iter() {
            if snapshot.has_packaged(name) || !domains_dir.join(name).is_dir() {
                continue;
            }
            summary.deployments += 1;
            if let Err(e) = self
                .domain_deployer
                .deploy_exploded_artifact(name, None)
                .await
            {
                warn!(domain = %name, error = %e, "domain deployment failed, continuing");
            }
        }

        for name in diff.exploded.changed.iter() {
            if snapshot.has_packaged(name) || !domains_dir.join(name).is_dir() {
                continue;
            }
            if self.domain_deployer.domains().find_artifact(name).is_some() {
                summary.redeployments += 1;
                if let Err(e) = self.domain_deployer.redeploy(name, None).await {
                    warn!(domain = %name, error = %e, "domain redeployment failed, continuing");
                }
            } else {
                summary.deployments += 1;
                if let Err(e) = self
                    .domain_deployer
                    .deploy_exploded_artifact(name, None)
                    .await
                {
                    warn!(domain = %name, error = %e, "domain deployment failed, continuing");
                }
            }
        }
    }

    async fn deploy_applications(
        &self,
        snapshot: &DirectorySnapshot,
        diff: &SnapshotDiff,
        summary: &mut CycleSummary,
    ) {
        let apps_dir = self.applications.deployment_dir().to_path_buf();

        let packaged: Vec<String> = diff
            .packaged
            .candidates()
            .iter()
            .filter_map(|name| snapshot.packaged_file_name(name).map(str::to_string))
            .filter(|file_name| apps_dir.join(file_name).is_file())
            .collect();
        summary.deployments += packaged.len();
        self.strategy
            .deploy_packaged(&self.applications, &packaged)
            .await;

        // a changed exploded directory of a live artifact is an in-place
        // redeploy; everything else goes through the quarantine-gated
        // exploded deploy
        let mut exploded = Vec::new();
        let mut redeploys = Vec::new();
        for name in diff.exploded.candidates() {
            // skip install output of a packaged artifact, and entries
            // removed by an undeploy earlier in this cycle
            if snapshot.has_packaged(&name) || !apps_dir.join(&name).is_dir() {
                continue;
            }
            if self.applications.is_updated_zombie_artifact(&name) {
                exploded.push(name);
            } else if diff.exploded.changed.contains(&name)
                && self.applications.find_artifact(&name).is_some()
            {
                redeploys.push(name);
            } else {
                debug!(application = %name, "skipping quarantined or already-deployed artifact");
            }
        }

        summary.deployments += exploded.len();
        self.strategy
            .deploy_exploded(&self.applications, &exploded)
            .await;

        for name in redeploys {
            summary.redeployments += 1;
            if let Err(e) = self.applications.redeploy(&name, None).await {
                warn!(application = %name, error = %e, "application redeployment failed, continuing");
            }
        }
    }

    /// Spawn the watcher loop. The first tick fires immediately so
    /// artifacts present at startup deploy without waiting a full interval.
    pub fn start(self: &Arc<Self>) -> WatchHandle {
        let (stop_tx, mut stop_rx) = mpsc::channel::<()>(1);
        let watcher = self.clone();

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(watcher.poll_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(
                domains = %watcher.domain_deployer.domains().deployment_dir().display(),
                applications = %watcher.applications.deployment_dir().display(),
                "watching deployment directories"
            );

            loop {
                tokio::select! {
                    _ = stop_rx.recv() => {
                        info!("deployment watcher stopping");
                        break;
                    }
                    _ = interval.tick() => {
                        if let Err(e) = watcher.scan_once().await {
                            warn!(error = %e, "deployment scan failed");
                        }
                    }
                }
            }
        });

        WatchHandle { stop_tx, task }
    }
}

/// Names whose on-disk form disappeared. A vanished exploded directory is
/// not a removal while the authoritative archive is still present.
fn removed_names(current: &DirectorySnapshot, diff: &SnapshotDiff) -> Vec<String> {
    let mut names = diff.packaged.removed.clone();
    for name in &diff.exploded.removed {
        if !current.has_packaged(name) && !names.contains(name) {
            names.push(name.clone());
        }
    }
    names
}

/// Handle to control a running watcher
pub struct WatchHandle {
    stop_tx: mpsc::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

impl WatchHandle {
    /// Stop the watcher and wait for the loop to exit
    pub async fn stop(self) -> anyhow::Result<()> {
        let _ = self.stop_tx.send(()).await;
        self.task.await?;
        Ok(())
    }
}
