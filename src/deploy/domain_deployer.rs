//! Domain-aware deployment.
//!
//! A domain is an artifact kind that applications may declare a dependency
//! on. This wrapper composes the domain deployer with the application
//! deployer and adds exactly one behavior: undeploying a domain first
//! undeploys every application that depends on it. Deploys and redeploys
//! pass through; after a successful domain redeploy the watcher re-deploys
//! the undeployed applications on its next cycle.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::{ArtifactFactory, DeployableArtifact, DeploymentProperties};

use super::deployer::ArchiveDeployer;
use super::error::DeployError;

/// Deployer for domains that cascades undeploys to dependent applications
pub struct DomainArchiveDeployer<DF: ArtifactFactory, AF: ArtifactFactory> {
    domains: Arc<ArchiveDeployer<DF>>,
    applications: Arc<ArchiveDeployer<AF>>,
}

impl<DF: ArtifactFactory, AF: ArtifactFactory> DomainArchiveDeployer<DF, AF> {
    pub fn new(domains: Arc<ArchiveDeployer<DF>>, applications: Arc<ArchiveDeployer<AF>>) -> Self {
        Self {
            domains,
            applications,
        }
    }

    /// The wrapped domain deployer
    pub fn domains(&self) -> &Arc<ArchiveDeployer<DF>> {
        &self.domains
    }

    /// The application deployer undeploys cascade into
    pub fn applications(&self) -> &Arc<ArchiveDeployer<AF>> {
        &self.applications
    }

    /// Names of applications whose descriptor declares a dependency on the
    /// given domain. Computed on demand against the live registry, so the
    /// answer is always consistent with current deployment state.
    pub fn dependent_applications(&self, domain_name: &str) -> Vec<String> {
        self.applications
            .artifacts()
            .iter()
            .filter(|app| app.descriptor().domain.as_deref() == Some(domain_name))
            .map(|app| app.name().to_string())
            .collect()
    }

    /// Undeploy a domain, first undeploying every dependent application.
    ///
    /// A failing application undeploy does not prevent the remaining
    /// applications, nor the domain itself, from being undeployed; the
    /// first failure is returned after all attempts have been made.
    pub async fn undeploy_artifact(&self, domain_name: &str) -> Result<(), DeployError> {
        let dependents = self.dependent_applications(domain_name);
        if !dependents.is_empty() {
            info!(
                domain = domain_name,
                applications = dependents.len(),
                "undeploying applications that depend on domain"
            );
        }

        let mut first_failure = None;
        for application in dependents {
            if let Err(e) = self.applications.undeploy_artifact(&application).await {
                warn!(
                    domain = domain_name,
                    application = %application,
                    error = %e,
                    "failed to undeploy dependent application, continuing"
                );
                first_failure.get_or_insert(e);
            }
        }

        self.domains.undeploy_artifact(domain_name).await?;

        match first_failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Redeploy a domain in place. On failure, dependent applications that
    /// may already be stopped are left for the next watcher cycle.
    pub async fn redeploy(
        &self,
        domain_name: &str,
        properties: Option<&DeploymentProperties>,
    ) -> Result<Arc<DF::Artifact>, DeployError> {
        match self.domains.redeploy(domain_name, properties).await {
            Ok(artifact) => Ok(artifact),
            Err(e) => {
                warn!(
                    domain = domain_name,
                    "domain redeployment failed, dependent application deployment will be skipped"
                );
                Err(e)
            }
        }
    }

    pub async fn deploy_packaged_artifact(
        &self,
        archive: impl AsRef<Path>,
        properties: Option<&DeploymentProperties>,
    ) -> Result<Option<Arc<DF::Artifact>>, DeployError> {
        self.domains
            .deploy_packaged_artifact(archive, properties)
            .await
    }

    pub async fn deploy_exploded_artifact(
        &self,
        directory_name: &str,
        properties: Option<&DeploymentProperties>,
    ) -> Result<Option<Arc<DF::Artifact>>, DeployError> {
        self.domains
            .deploy_exploded_artifact(directory_name, properties)
            .await
    }

    pub async fn deploy_artifact(
        &self,
        artifact: DF::Artifact,
        properties: Option<&DeploymentProperties>,
    ) -> Result<Arc<DF::Artifact>, DeployError> {
        self.domains.deploy_artifact(artifact, properties).await
    }

    /// Domains do not participate in failure quarantine: a failing domain
    /// blocks all of its dependents, so it is retried on every cycle.
    pub fn is_updated_zombie_artifact(&self, _domain_name: &str) -> bool {
        true
    }
}
