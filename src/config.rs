//! Configuration for hangar directories and the watcher.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variable (HANGAR_HOME)
//! 2. Config file (<home>/hangar.yaml)
//! 3. Defaults (~/.hangar)
//!
//! Every field defaults individually, so a partial config file is fine.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variable overriding the hangar home directory
pub const HANGAR_HOME_ENV: &str = "HANGAR_HOME";

/// File name of the config file inside the hangar home
pub const CONFIG_FILE_NAME: &str = "hangar.yaml";

/// Resolve the hangar home directory
pub fn hangar_home() -> PathBuf {
    if let Ok(home) = std::env::var(HANGAR_HOME_ENV) {
        return PathBuf::from(home);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".hangar")
}

/// Deployment directory layout and watcher settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentConfig {
    /// Directory watched for application artifacts
    #[serde(default = "default_apps_dir")]
    pub apps_dir: PathBuf,

    /// Directory watched for domain artifacts
    #[serde(default = "default_domains_dir")]
    pub domains_dir: PathBuf,

    /// Root of per-artifact private data directories
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Seconds between watcher scan cycles (default: 5)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Deploy independent applications in parallel within one cycle
    #[serde(default)]
    pub parallel_deployment: bool,

    /// Cap on concurrent deployments when parallel (default: 20)
    #[serde(default = "default_max_parallel")]
    pub max_parallel_deploys: usize,
}

fn default_apps_dir() -> PathBuf {
    hangar_home().join("apps")
}

fn default_domains_dir() -> PathBuf {
    hangar_home().join("domains")
}

fn default_data_dir() -> PathBuf {
    hangar_home().join("data")
}

fn default_poll_interval() -> u64 {
    5
}

fn default_max_parallel() -> usize {
    crate::watch::MAX_PARALLEL_DEPLOYS
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            apps_dir: default_apps_dir(),
            domains_dir: default_domains_dir(),
            data_dir: default_data_dir(),
            poll_interval_secs: default_poll_interval(),
            parallel_deployment: false,
            max_parallel_deploys: default_max_parallel(),
        }
    }
}

impl DeploymentConfig {
    /// Load the config file from the hangar home, falling back to defaults
    /// when it does not exist
    pub fn load() -> Result<Self> {
        let path = hangar_home().join(CONFIG_FILE_NAME);
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        serde_yaml::from_str(&raw)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Create the deployment, domain, and data directories
    pub fn ensure_layout(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.apps_dir)?;
        std::fs::create_dir_all(&self.domains_dir)?;
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}
