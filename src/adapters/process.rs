//! Process-backed artifacts.
//!
//! The built-in artifact factory: an artifact whose runtime instance is a
//! child process spawned from the descriptor's `start_command`. Descriptors
//! without a start command deploy as inert artifacts (status transitions
//! only), which keeps the orchestrator useful for pure-content artifacts.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::process::{Child, Command};
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::domain::{
    ArtifactDescriptor, ArtifactFactory, ArtifactStatus, DeployableArtifact, DeploymentProperties,
};

/// A deployable artifact backed by an optional child process
pub struct ProcessArtifact {
    name: String,
    location: PathBuf,
    descriptor: ArtifactDescriptor,
    properties: DeploymentProperties,
    created_at: DateTime<Utc>,
    status: Mutex<ArtifactStatus>,
    child: AsyncMutex<Option<Child>>,
}

impl ProcessArtifact {
    fn new(
        name: String,
        location: PathBuf,
        descriptor: ArtifactDescriptor,
        properties: DeploymentProperties,
    ) -> Self {
        Self {
            name,
            location,
            descriptor,
            properties,
            created_at: Utc::now(),
            status: Mutex::new(ArtifactStatus::NotDeployed),
            child: AsyncMutex::new(None),
        }
    }

    /// When this instance was constructed by the factory
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn set_status(&self, status: ArtifactStatus) {
        *self.status.lock().expect("status poisoned") = status;
    }

    /// Spawn the start command through the shell, rooted in the artifact
    /// directory, with the artifact identity and deployment properties
    /// exported as environment variables.
    async fn spawn(&self, command: &str) -> Result<Child> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .current_dir(&self.location)
            .stdin(Stdio::null())
            .env("HANGAR_ARTIFACT_NAME", &self.name)
            .env("HANGAR_ARTIFACT_LOCATION", &self.location);
        for (key, value) in &self.properties {
            cmd.env(format!("HANGAR_PROP_{}", key.to_ascii_uppercase()), value);
        }
        cmd.kill_on_drop(true);

        cmd.spawn()
            .with_context(|| format!("failed to spawn start command for artifact '{}'", self.name))
    }
}

#[async_trait]
impl DeployableArtifact for ProcessArtifact {
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
        *self.status.lock().expect("status poisoned")
    }

    async fn start(&self) -> Result<()> {
        self.set_status(ArtifactStatus::Deploying);

        let Some(command) = self.descriptor.start_command.clone() else {
            debug!(artifact = %self.name, "no start command, deploying as inert artifact");
            self.set_status(ArtifactStatus::Started);
            return Ok(());
        };

        match self.spawn(&command).await {
            Ok(child) => {
                *self.child.lock().await = Some(child);
                self.set_status(ArtifactStatus::Started);
                Ok(())
            }
            Err(e) => {
                self.set_status(ArtifactStatus::DeploymentFailed);
                Err(e)
            }
        }
    }

    async fn stop(&self) -> Result<()> {
        let child = self.child.lock().await.take();
        if let Some(mut child) = child {
            // the process has no graceful channel; terminate and reap,
            // bounded by the descriptor's stop timeout
            let _ = child.start_kill();
            let wait = timeout(
                Duration::from_secs(self.descriptor.stop_timeout_secs),
                child.wait(),
            )
            .await;
            match wait {
                Ok(status) => {
                    status.with_context(|| {
                        format!("failed to reap process for artifact '{}'", self.name)
                    })?;
                }
                Err(_) => {
                    warn!(artifact = %self.name, "process did not exit within stop timeout");
                }
            }
        }
        self.set_status(ArtifactStatus::Stopped);
        Ok(())
    }

    fn dispose(&self) {
        if let Ok(mut guard) = self.child.try_lock() {
            if let Some(mut child) = guard.take() {
                let _ = child.start_kill();
            }
        }
    }
}

/// Builds [`ProcessArtifact`]s by reading the descriptor at the installed
/// location
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessArtifactFactory;

#[async_trait]
impl ArtifactFactory for ProcessArtifactFactory {
    type Artifact = ProcessArtifact;

    async fn create_artifact(
        &self,
        location: &Path,
        properties: Option<&DeploymentProperties>,
    ) -> Result<Self::Artifact> {
        if !location.is_dir() {
            anyhow::bail!("artifact location {} is not a directory", location.display());
        }
        let descriptor = ArtifactDescriptor::load(location)?;
        let name = descriptor.resolved_name(location);

        Ok(ProcessArtifact::new(
            name,
            location.to_path_buf(),
            descriptor,
            properties.cloned().unwrap_or_default(),
        ))
    }
}
