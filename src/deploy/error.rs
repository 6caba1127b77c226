//! Deployment error taxonomy.
//!
//! Every public orchestrator operation that can fail returns a
//! [`DeployError`]. Failures are reported through listener callbacks before
//! the error is returned; callers (the watcher or the CLI) log and continue,
//! never halt the watcher loop.

use std::path::PathBuf;

use thiserror::Error;

use crate::domain::DescriptorError;

/// Errors raised by deploy/undeploy/redeploy operations
#[derive(Debug, Error)]
pub enum DeployError {
    /// The packaged archive could not be unpacked
    #[error("failed to install archive {archive}: {source}")]
    Install {
        archive: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The artifact descriptor could not be read or parsed
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    /// The artifact factory failed to build an instance
    #[error("failed to construct artifact '{name}': {source}")]
    Construction {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    /// The artifact failed to start
    #[error("artifact '{name}' failed to start: {source}")]
    Start {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    /// The artifact failed to stop
    #[error("artifact '{name}' failed to stop: {source}")]
    Stop {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    /// The named artifact is not currently tracked
    #[error("artifact '{name}' is not deployed")]
    NotDeployed { name: String },

    /// Filesystem failure outside archive installation
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DeployError {
    /// The artifact name the failure relates to, when one is known
    pub fn artifact_name(&self) -> Option<&str> {
        match self {
            Self::Construction { name, .. }
            | Self::Start { name, .. }
            | Self::Stop { name, .. }
            | Self::NotDeployed { name } => Some(name),
            _ => None,
        }
    }
}
