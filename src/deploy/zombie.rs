//! Failure quarantine records.
//!
//! When a deployment attempt fails, the deployer captures the modification
//! times of the artifact's backing files. While those files are unchanged
//! the artifact is a "zombie" and redeployment attempts are suppressed,
//! which keeps an unchanged broken artifact from hot-looping through
//! deploy-then-fail on every watcher cycle. The record lives only in
//! process memory: after a restart every previously failed artifact is
//! re-attempted once.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Snapshot of an artifact's backing files taken at failure time
#[derive(Debug, Clone)]
pub struct ZombieArtifact {
    resources: Vec<(PathBuf, SystemTime)>,
}

impl ZombieArtifact {
    /// Capture modification times for the given files.
    ///
    /// Returns `None` unless every file exists and can be stat'ed: a record
    /// over files that are already gone could never be invalidated by a
    /// change and would quarantine the artifact forever.
    pub fn capture(files: &[PathBuf]) -> Option<Self> {
        if files.is_empty() {
            return None;
        }

        let mut resources = Vec::with_capacity(files.len());
        for file in files {
            let modified = std::fs::metadata(file).and_then(|m| m.modified()).ok()?;
            resources.push((file.clone(), modified));
        }
        Some(Self { resources })
    }

    /// True iff any tracked file's modification time changed, or a tracked
    /// file no longer exists. Updated zombies are eligible for retry.
    pub fn updated(&self) -> bool {
        self.resources.iter().any(|(path, recorded)| {
            std::fs::metadata(path)
                .and_then(|m| m.modified())
                .map(|current| current != *recorded)
                .unwrap_or(true)
        })
    }

    /// True iff every tracked file still exists
    pub fn exists(&self) -> bool {
        self.resources.iter().all(|(path, _)| path.exists())
    }

    /// Whether this record tracks the given path
    pub fn is_for(&self, path: &Path) -> bool {
        self.resources.iter().any(|(tracked, _)| tracked == path)
    }

    /// The tracked files
    pub fn resources(&self) -> Vec<PathBuf> {
        self.resources.iter().map(|(p, _)| p.clone()).collect()
    }
}
