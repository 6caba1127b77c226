//! Artifact descriptors.
//!
//! Every deployable artifact carries a `hangar-artifact.yaml` descriptor at
//! the root of its exploded directory. The orchestrator reads only the
//! fields it needs for lifecycle decisions (domain dependency, redeployment
//! flag, resource files); everything else is the concern of the artifact
//! factory that builds the runtime instance.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// File name of the descriptor inside an exploded artifact directory.
pub const DESCRIPTOR_FILE_NAME: &str = "hangar-artifact.yaml";

/// Errors raised while loading a descriptor
#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("descriptor not found at {0}")]
    NotFound(PathBuf),

    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid descriptor {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Descriptor of a deployable artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactDescriptor {
    /// Artifact name; defaults to the directory or archive base name
    #[serde(default)]
    pub name: Option<String>,

    /// Name of the domain this application depends on (applications only)
    #[serde(default)]
    pub domain: Option<String>,

    /// Whether the artifact may be redeployed in place when its files change
    #[serde(default = "default_redeployment_enabled")]
    pub redeployment_enabled: bool,

    /// Command used to start the artifact (consumed by the process factory)
    #[serde(default)]
    pub start_command: Option<String>,

    /// Seconds to wait for the process to exit on stop before giving up
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_secs: u64,

    /// Extra files, relative to the artifact directory, tracked as resource
    /// files for change detection
    #[serde(default)]
    pub config_resources: Vec<String>,
}

fn default_redeployment_enabled() -> bool {
    true
}

fn default_stop_timeout() -> u64 {
    10
}

impl Default for ArtifactDescriptor {
    fn default() -> Self {
        Self {
            name: None,
            domain: None,
            redeployment_enabled: default_redeployment_enabled(),
            start_command: None,
            stop_timeout_secs: default_stop_timeout(),
            config_resources: Vec::new(),
        }
    }
}

impl ArtifactDescriptor {
    /// Path of the descriptor file inside an artifact directory
    pub fn file_in(artifact_dir: &Path) -> PathBuf {
        artifact_dir.join(DESCRIPTOR_FILE_NAME)
    }

    /// Load the descriptor from an exploded artifact directory.
    ///
    /// A missing descriptor is not an error: artifacts without one deploy
    /// with an all-default descriptor.
    pub fn load(artifact_dir: &Path) -> Result<Self, DescriptorError> {
        let path = Self::file_in(artifact_dir);
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_file(&path)
    }

    /// Load a descriptor from an explicit file path
    pub fn load_file(path: &Path) -> Result<Self, DescriptorError> {
        let raw = std::fs::read_to_string(path).map_err(|source| DescriptorError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| DescriptorError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Resolve the artifact name for a given on-disk location
    pub fn resolved_name(&self, location: &Path) -> String {
        self.name.clone().unwrap_or_else(|| {
            location
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default()
        })
    }

    /// Resource files of an artifact rooted at `location`: the descriptor
    /// file (when redeployment is enabled) plus any configured resources.
    pub fn resource_files(&self, location: &Path) -> Vec<PathBuf> {
        let mut files = Vec::new();
        let descriptor = Self::file_in(location);
        if self.redeployment_enabled && descriptor.exists() {
            files.push(descriptor);
        }
        for resource in &self.config_resources {
            files.push(location.join(resource));
        }
        files
    }
}
