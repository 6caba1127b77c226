//! The per-kind lifecycle orchestrator.
//!
//! One [`ArchiveDeployer`] owns the full lifecycle for one artifact kind
//! (applications, domains): it installs packaged archives, builds instances
//! through the artifact factory, tracks them in the live registry, drives
//! start/stop, maintains the failure quarantine, and reports every
//! transition through the registered listeners.
//!
//! Callers are expected to serialize operations through the deployment lock
//! (see [`crate::watch`]); within one operation the deployer's internal
//! state is additionally guarded so independent artifacts may be deployed
//! concurrently by the parallel strategy.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{debug, error, info, instrument, warn};

use crate::domain::{
    should_start_on_deployment, ArtifactFactory, DeployableArtifact, DeploymentProperties,
};

use super::error::DeployError;
use super::installer::{artifact_name_of, ArchiveInstaller};
use super::listener::{CompositeDeploymentListener, DeploymentListener};
use super::registry::ArtifactRegistry;
use super::zombie::ZombieArtifact;

/// Drives one artifact instance through start/stop/dispose.
///
/// The orchestrator never reaches inside an artifact beyond this seam.
#[derive(Debug, Default, Clone, Copy)]
pub struct ArtifactDeployer;

impl ArtifactDeployer {
    pub async fn deploy<A: DeployableArtifact>(
        &self,
        artifact: &A,
        start: bool,
    ) -> Result<(), DeployError> {
        if start {
            artifact.start().await.map_err(|source| DeployError::Start {
                name: artifact.name().to_string(),
                source,
            })?;
        }
        Ok(())
    }

    pub async fn undeploy<A: DeployableArtifact>(&self, artifact: &A) -> Result<(), DeployError> {
        artifact.stop().await.map_err(|source| DeployError::Stop {
            name: artifact.name().to_string(),
            source,
        })?;
        artifact.dispose();
        Ok(())
    }
}

/// Lifecycle orchestrator for one artifact kind
pub struct ArchiveDeployer<F: ArtifactFactory> {
    factory: F,
    deployer: ArtifactDeployer,
    installer: ArchiveInstaller,
    registry: ArtifactRegistry<F::Artifact>,
    zombies: Mutex<HashMap<String, ZombieArtifact>>,
    listeners: CompositeDeploymentListener,
    data_dir: PathBuf,
    quarantine_enabled: bool,
}

impl<F: ArtifactFactory> ArchiveDeployer<F> {
    /// Create a deployer over one deployment directory.
    ///
    /// `data_dir` is the root under which each artifact gets a private data
    /// directory (`<data_dir>/<name>`), deleted on a full undeploy.
    pub fn new(
        factory: F,
        deployment_dir: impl Into<PathBuf>,
        data_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            factory,
            deployer: ArtifactDeployer,
            installer: ArchiveInstaller::new(deployment_dir),
            registry: ArtifactRegistry::new(),
            zombies: Mutex::new(HashMap::new()),
            listeners: CompositeDeploymentListener::new(),
            data_dir: data_dir.into(),
            quarantine_enabled: true,
        }
    }

    /// Disable failure quarantine for this kind. Used for domains, which
    /// must be retried on every cycle because their failure blocks all
    /// dependent applications.
    pub fn without_quarantine(mut self) -> Self {
        self.quarantine_enabled = false;
        self
    }

    /// The directory this deployer watches and installs into
    pub fn deployment_dir(&self) -> &Path {
        self.installer.deployment_dir()
    }

    /// The live-artifact registry for this kind
    pub fn registry(&self) -> &ArtifactRegistry<F::Artifact> {
        &self.registry
    }

    /// Snapshot of tracked artifacts
    pub fn artifacts(&self) -> Vec<Arc<F::Artifact>> {
        self.registry.snapshot()
    }

    /// Find a tracked artifact by name
    pub fn find_artifact(&self, name: &str) -> Option<Arc<F::Artifact>> {
        self.registry.find(name)
    }

    /// Register a lifecycle listener
    pub fn add_listener(&self, listener: Arc<dyn DeploymentListener>) {
        self.listeners.add_listener(listener);
    }

    /// Names and tracked files of current quarantine records
    pub fn zombie_resources(&self) -> HashMap<String, Vec<PathBuf>> {
        self.zombies
            .lock()
            .expect("zombie map poisoned")
            .iter()
            .map(|(name, z)| (name.clone(), z.resources()))
            .collect()
    }

    /// True when the name is eligible for a (re)deployment attempt: not a
    /// live tracked artifact, and not a quarantined failure whose files are
    /// unchanged.
    pub fn is_updated_zombie_artifact(&self, name: &str) -> bool {
        let zombies = self.zombies.lock().expect("zombie map poisoned");
        if !zombies.contains_key(name) && self.registry.contains(name) {
            return false;
        }
        if let Some(zombie) = zombies.get(name) {
            if !zombie.updated() {
                return false;
            }
        }
        true
    }

    /// Deploy a packaged artifact, given either a file name inside the
    /// deployment directory or an absolute archive path.
    ///
    /// Returns `Ok(None)` when the archive is quarantined and unchanged
    /// since its last failure. A name that is already tracked is routed
    /// through the redeploy path (undeploy-then-deploy), never deployed as
    /// a duplicate.
    #[instrument(skip(self, properties, archive))]
    pub async fn deploy_packaged_artifact(
        &self,
        archive: impl AsRef<Path>,
        properties: Option<&DeploymentProperties>,
    ) -> Result<Option<Arc<F::Artifact>>, DeployError> {
        let archive = archive.as_ref();
        let archive_path = if archive.is_absolute() {
            archive.to_path_buf()
        } else {
            self.deployment_dir().join(archive)
        };
        let name = artifact_name_of(&archive_path).ok_or_else(|| DeployError::Install {
            archive: archive_path.clone(),
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "not a recognized artifact archive (.tgz / .tar.gz)",
            ),
        })?;

        {
            let zombies = self.zombies.lock().expect("zombie map poisoned");
            if let Some(zombie) = zombies.get(&name) {
                if zombie.is_for(&archive_path) && !zombie.updated() {
                    // already failed with these exact bits; skip silently
                    debug!(artifact = %name, "archive unchanged since last failure, skipping");
                    return Ok(None);
                }
            }
        }

        let is_redeploy = self.registry.contains(&name);
        if !is_redeploy {
            return self
                .install_and_deploy(&archive_path, &name, properties)
                .await
                .map(Some);
        }

        info!(artifact = %name, "redeploying packaged artifact");
        self.listeners.on_redeployment_start(&name);

        if let Err(e) = self.undeploy_internal(&name, false).await {
            self.listeners.on_redeployment_failure(&name, &e);
            return Err(e);
        }

        match self
            .install_and_deploy(&archive_path, &name, properties)
            .await
        {
            Ok(artifact) => {
                self.listeners.on_redeployment_success(&name);
                Ok(Some(artifact))
            }
            Err(e) => {
                self.listeners.on_redeployment_failure(&name, &e);
                Err(e)
            }
        }
    }

    /// Deploy an already-unpacked artifact directory inside the deployment
    /// directory. Returns `Ok(None)` without error when the directory is a
    /// quarantined failure with unchanged files, or already live.
    #[instrument(skip(self, properties))]
    pub async fn deploy_exploded_artifact(
        &self,
        directory_name: &str,
        properties: Option<&DeploymentProperties>,
    ) -> Result<Option<Arc<F::Artifact>>, DeployError> {
        if !self.is_updated_zombie_artifact(directory_name) {
            return Ok(None);
        }

        debug!(artifact = directory_name, "deploying exploded artifact");
        let location = self.deployment_dir().join(directory_name);
        let artifact = match self.factory.create_artifact(&location, properties).await {
            Ok(artifact) => artifact,
            Err(source) => {
                let e = DeployError::Construction {
                    name: directory_name.to_string(),
                    source,
                };
                error!(artifact = directory_name, error = %e, "failed to deploy artifact");
                self.record_zombie_files(directory_name, &[location]);
                self.listeners.on_deployment_failure(directory_name, &e);
                return Err(e);
            }
        };

        self.deploy_artifact(artifact, properties).await.map(Some)
    }

    /// Track and start an artifact built by the caller.
    ///
    /// The artifact is tracked before it starts, replacing any prior entry
    /// with the same name, so an immediate failure cannot trigger a
    /// redeploy loop. On success an anchor file is created and any
    /// quarantine record for the name is cleared; on failure a quarantine
    /// record is captured over the artifact's resource files.
    pub async fn deploy_artifact(
        &self,
        artifact: F::Artifact,
        properties: Option<&DeploymentProperties>,
    ) -> Result<Arc<F::Artifact>, DeployError> {
        let name = artifact.name().to_string();
        let (artifact, _previous) = self.registry.track(artifact);

        self.listeners.on_deployment_start(&name);

        let result: Result<(), DeployError> = async {
            self.deployer
                .deploy(&*artifact, should_start_on_deployment(properties))
                .await?;
            self.installer.create_anchor(&name)?;
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                self.zombies
                    .lock()
                    .expect("zombie map poisoned")
                    .remove(&name);
                self.listeners.on_deployment_success(&name);
                info!(artifact = %name, "deployed artifact");
                Ok(artifact)
            }
            Err(e) => {
                error!(artifact = %name, error = %e, "failed to deploy artifact");
                self.record_zombie_artifact(&*artifact);
                self.listeners.on_deployment_failure(&name, &e);
                Err(e)
            }
        }
    }

    /// Undeploy a tracked artifact and remove its on-disk footprint,
    /// including its private data directory.
    ///
    /// Idempotent with respect to quarantined failures: a zombie whose
    /// files still exist is left alone; a zombie whose files are gone has
    /// its record dropped before the undeploy proceeds.
    #[instrument(skip(self))]
    pub async fn undeploy_artifact(&self, name: &str) -> Result<(), DeployError> {
        self.undeploy_internal(name, true).await
    }

    async fn undeploy_internal(&self, name: &str, remove_data: bool) -> Result<(), DeployError> {
        {
            let mut zombies = self.zombies.lock().expect("zombie map poisoned");
            if let Some(zombie) = zombies.get(name) {
                if zombie.exists() {
                    debug!(artifact = name, "unresolved quarantined artifact, nothing to undeploy");
                    return Ok(());
                }
                zombies.remove(name);
            }
        }

        let artifact = self
            .registry
            .find(name)
            .ok_or_else(|| DeployError::NotDeployed {
                name: name.to_string(),
            })?;

        info!(artifact = name, "undeploying artifact");
        self.listeners.on_undeployment_start(name);

        // drop the registry entry first so a concurrent status query or
        // redeploy never observes a half-stopped artifact
        self.registry.remove(name);

        let result: Result<(), DeployError> = async {
            self.deployer.undeploy(&*artifact).await?;
            if remove_data {
                self.installer.uninstall(name)?;
                self.remove_data_dir(name);
            } else {
                // mid-redeploy: the packaged archive stays, it is the
                // install source for the deploy that follows
                self.installer.uninstall_exploded(name)?;
            }
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                self.listeners.on_undeployment_success(name);
                info!(artifact = name, "undeployed artifact");
                Ok(())
            }
            Err(e) => {
                error!(artifact = name, error = %e, "failed to undeploy artifact");
                self.listeners.on_undeployment_failure(name, &e);
                Err(e)
            }
        }
    }

    /// Stop, rebuild, and restart a tracked artifact in place from its
    /// original install location.
    ///
    /// Fails fast when the name is not tracked. The stop leg is skipped for
    /// quarantined artifacts (there is nothing running to stop); a stop
    /// failure is reported but does not block the rebuild.
    #[instrument(skip(self, properties))]
    pub async fn redeploy(
        &self,
        name: &str,
        properties: Option<&DeploymentProperties>,
    ) -> Result<Arc<F::Artifact>, DeployError> {
        let artifact = self
            .registry
            .find(name)
            .ok_or_else(|| DeployError::NotDeployed {
                name: name.to_string(),
            })?;
        let location = artifact.location().to_path_buf();

        info!(artifact = name, "redeploying artifact");
        self.listeners.on_redeployment_start(name);

        let quarantined = self
            .zombies
            .lock()
            .expect("zombie map poisoned")
            .contains_key(name);
        if !quarantined {
            self.listeners.on_undeployment_start(name);
            match self.deployer.undeploy(&*artifact).await {
                Ok(()) => self.listeners.on_undeployment_success(name),
                Err(e) => {
                    warn!(artifact = name, error = %e, "stop failed during redeploy, continuing with deploy");
                    self.listeners.on_undeployment_failure(name, &e);
                    self.listeners.on_redeployment_failure(name, &e);
                }
            }
        }
        drop(artifact);

        self.listeners.on_deployment_start(name);

        let rebuilt = match self.factory.create_artifact(&location, properties).await {
            Ok(artifact) => artifact,
            Err(source) => {
                let e = DeployError::Construction {
                    name: name.to_string(),
                    source,
                };
                error!(artifact = name, error = %e, "failed to rebuild artifact");
                self.listeners.on_deployment_failure(name, &e);
                self.listeners.on_redeployment_failure(name, &e);
                return Err(e);
            }
        };

        let (rebuilt, _previous) = self.registry.track(rebuilt);

        let result: Result<(), DeployError> = async {
            self.deployer
                .deploy(&*rebuilt, should_start_on_deployment(properties))
                .await?;
            self.installer.create_anchor(name)?;
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                self.listeners.on_deployment_success(name);
                self.zombies
                    .lock()
                    .expect("zombie map poisoned")
                    .remove(name);
                self.listeners.on_redeployment_success(name);
                info!(artifact = name, "redeployed artifact");
                Ok(rebuilt)
            }
            Err(e) => {
                error!(artifact = name, error = %e, "failed to redeploy artifact");
                self.record_zombie_artifact(&*rebuilt);
                self.listeners.on_deployment_failure(name, &e);
                self.listeners.on_redeployment_failure(name, &e);
                Err(e)
            }
        }
    }

    async fn install_and_deploy(
        &self,
        archive_path: &Path,
        name: &str,
        properties: Option<&DeploymentProperties>,
    ) -> Result<Arc<F::Artifact>, DeployError> {
        let location = match self.installer.install(archive_path) {
            Ok(location) => location,
            Err(e) => {
                error!(artifact = name, error = %e, "failed to install archive");
                self.record_zombie_files(name, &[archive_path.to_path_buf()]);
                self.listeners.on_deployment_failure(name, &e);
                return Err(e);
            }
        };

        let artifact = match self.factory.create_artifact(&location, properties).await {
            Ok(artifact) => artifact,
            Err(source) => {
                let e = DeployError::Construction {
                    name: name.to_string(),
                    source,
                };
                error!(artifact = name, error = %e, "failed to construct artifact");
                self.record_zombie_files(name, &[location]);
                self.listeners.on_deployment_failure(name, &e);
                return Err(e);
            }
        };

        self.deploy_artifact(artifact, properties).await
    }

    /// Quarantine an artifact over its resource files; falls back to the
    /// install location when the artifact declares none, so a broken
    /// artifact is never retried hot on every cycle.
    fn record_zombie_artifact(&self, artifact: &F::Artifact) {
        let mut files = artifact.resource_files();
        if files.is_empty() {
            files.push(artifact.location().to_path_buf());
        }
        self.record_zombie_files(artifact.name(), &files);
    }

    /// Whether a quarantine record exists for the name
    pub fn has_zombie(&self, name: &str) -> bool {
        self.zombies
            .lock()
            .expect("zombie map poisoned")
            .contains_key(name)
    }

    fn record_zombie_files(&self, name: &str, files: &[PathBuf]) {
        if !self.quarantine_enabled {
            return;
        }
        match ZombieArtifact::capture(files) {
            Some(zombie) => {
                self.zombies
                    .lock()
                    .expect("zombie map poisoned")
                    .insert(name.to_string(), zombie);
            }
            None => {
                debug!(artifact = name, "could not capture quarantine record, artifact will be retried");
            }
        }
    }

    fn remove_data_dir(&self, name: &str) {
        let data_dir = self.data_dir.join(name);
        if !data_dir.exists() {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&data_dir) {
            warn!(
                artifact = name,
                path = %data_dir.display(),
                error = %e,
                "cannot delete artifact data directory, files may still be in use"
            );
        }
    }
}
