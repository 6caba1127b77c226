//! The capability interface the orchestrator is generic over.
//!
//! The orchestrator never reaches inside a running artifact: it only needs a
//! name, a location, a descriptor, the resource files to watch, and the
//! start/stop/dispose lifecycle. Building a runtime instance from an
//! installed location is the factory's business.

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::descriptor::ArtifactDescriptor;

/// Per-operation key/value bag passed to deploy/redeploy.
///
/// Never persisted in the artifact itself; scoped to a single operation.
pub type DeploymentProperties = HashMap<String, String>;

/// Reserved property: set to `"false"` to deploy an artifact without
/// starting it.
pub const START_ON_DEPLOYMENT_PROPERTY: &str = "start_on_deployment";

/// Returns whether a deploy operation should start the artifact
pub fn should_start_on_deployment(properties: Option<&DeploymentProperties>) -> bool {
    properties
        .and_then(|p| p.get(START_ON_DEPLOYMENT_PROPERTY))
        .map(|v| v != "false")
        .unwrap_or(true)
}

/// Deployment status of an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactStatus {
    /// Tracked but never started
    NotDeployed,

    /// Start in progress
    Deploying,

    /// Running
    Started,

    /// The last deployment attempt failed
    DeploymentFailed,

    /// Stopped by an undeploy or an explicit stop
    Stopped,
}

/// A deployable unit managed by an [`ArchiveDeployer`](crate::deploy::ArchiveDeployer).
///
/// Implementations own their runtime state (child process, context, ...) and
/// maintain [`ArtifactStatus`] across start/stop; the orchestrator only
/// drives the transitions.
#[async_trait]
pub trait DeployableArtifact: Send + Sync + 'static {
    /// Unique name within the artifact's kind
    fn name(&self) -> &str;

    /// On-disk location of the exploded artifact
    fn location(&self) -> &Path;

    /// Parsed descriptor
    fn descriptor(&self) -> &ArtifactDescriptor;

    /// Files whose modification invalidates a failure quarantine record
    fn resource_files(&self) -> Vec<PathBuf>;

    /// Current status
    fn status(&self) -> ArtifactStatus;

    /// Start the artifact's runtime instance
    async fn start(&self) -> anyhow::Result<()>;

    /// Stop the artifact's runtime instance
    async fn stop(&self) -> anyhow::Result<()>;

    /// Release any remaining runtime resources. Called after stop on
    /// undeploy; must not fail.
    fn dispose(&self);
}

/// Builds artifact instances from installed locations.
///
/// Must be deterministic: the same on-disk location yields an equivalent
/// artifact.
#[async_trait]
pub trait ArtifactFactory: Send + Sync + 'static {
    type Artifact: DeployableArtifact;

    /// Construct an artifact from an exploded directory
    async fn create_artifact(
        &self,
        location: &Path,
        properties: Option<&DeploymentProperties>,
    ) -> anyhow::Result<Self::Artifact>;
}

#[async_trait]
impl<F: ArtifactFactory> ArtifactFactory for std::sync::Arc<F> {
    type Artifact = F::Artifact;

    async fn create_artifact(
        &self,
        location: &Path,
        properties: Option<&DeploymentProperties>,
    ) -> anyhow::Result<Self::Artifact> {
        (**self).create_artifact(location, properties).await
    }
}
