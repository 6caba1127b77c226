//! The deployment orchestrator core.
//!
//! This module contains:
//! - Installer: archive unpacking and anchor files
//! - Registry: the ordered live-artifact collection
//! - Zombie: failure quarantine records keyed on file mtimes
//! - Deployer: the generic per-kind lifecycle orchestrator
//! - DomainArchiveDeployer: cascade of domain undeploys to dependent apps
//! - Listener: lifecycle notification fan-out

pub mod deployer;
pub mod domain_deployer;
pub mod error;
pub mod installer;
pub mod listener;
pub mod registry;
pub mod zombie;

// Re-export commonly used types
pub use deployer::{ArchiveDeployer, ArtifactDeployer};
pub use domain_deployer::DomainArchiveDeployer;
pub use error::DeployError;
pub use installer::{artifact_name_of, is_archive_name, ArchiveInstaller, ANCHOR_SUFFIX};
pub use listener::{CompositeDeploymentListener, DeploymentListener};
pub use registry::{ArtifactRegistry, RegistryChange};
pub use zombie::ZombieArtifact;
