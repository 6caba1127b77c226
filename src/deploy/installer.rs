//! Archive installation.
//!
//! Unpacks packaged artifacts (`<name>.tgz` / `<name>.tar.gz`) into the
//! deployment directory and removes an artifact's on-disk footprint on
//! undeploy. Purely file operations, no lifecycle semantics. Also owns the
//! `<name>.anchor` marker files external tooling uses to detect "fully
//! deployed" without querying the orchestrator.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;
use tracing::{debug, warn};

use super::error::DeployError;

/// Recognized packaged-artifact extensions
const ARCHIVE_SUFFIXES: [&str; 2] = [".tar.gz", ".tgz"];

/// Suffix of anchor marker files
pub const ANCHOR_SUFFIX: &str = ".anchor";

/// Derive the artifact name from an archive file name, stripping the
/// archive suffix case-insensitively. Returns `None` for non-archive names.
pub fn artifact_name_of(archive: &Path) -> Option<String> {
    let file_name = archive.file_name()?.to_str()?;
    let lower = file_name.to_ascii_lowercase();
    ARCHIVE_SUFFIXES
        .iter()
        .find(|suffix| lower.ends_with(*suffix))
        .map(|suffix| file_name[..file_name.len() - suffix.len()].to_string())
}

/// Whether a file name looks like a packaged artifact
pub fn is_archive_name(file_name: &str) -> bool {
    let lower = file_name.to_ascii_lowercase();
    ARCHIVE_SUFFIXES.iter().any(|suffix| lower.ends_with(suffix))
}

/// Installs and uninstalls packaged artifacts within one deployment directory
pub struct ArchiveInstaller {
    deployment_dir: PathBuf,
}

impl ArchiveInstaller {
    pub fn new(deployment_dir: impl Into<PathBuf>) -> Self {
        Self {
            deployment_dir: deployment_dir.into(),
        }
    }

    pub fn deployment_dir(&self) -> &Path {
        &self.deployment_dir
    }

    /// Unpack an archive into `<deployment_dir>/<name>`, replacing any
    /// previous directory. Entries that would escape the target directory
    /// are rejected.
    pub fn install(&self, archive: &Path) -> Result<PathBuf, DeployError> {
        let name = artifact_name_of(archive).ok_or_else(|| DeployError::Install {
            archive: archive.to_path_buf(),
            source: io::Error::new(
                io::ErrorKind::InvalidInput,
                "not a recognized artifact archive (.tgz / .tar.gz)",
            ),
        })?;
        let target = self.deployment_dir.join(&name);

        self.unpack(archive, &target).map_err(|source| {
            // leave no partial directory behind on a failed install
            let _ = std::fs::remove_dir_all(&target);
            DeployError::Install {
                archive: archive.to_path_buf(),
                source,
            }
        })?;

        debug!(artifact = %name, target = %target.display(), "installed archive");
        Ok(target)
    }

    fn unpack(&self, archive: &Path, target: &Path) -> io::Result<()> {
        if target.exists() {
            std::fs::remove_dir_all(target)?;
        }
        std::fs::create_dir_all(target)?;

        let file = File::open(archive)?;
        let mut tar = Archive::new(GzDecoder::new(file));
        for entry in tar.entries()? {
            let mut entry = entry?;
            // unpack_in refuses paths that escape the target directory
            if !entry.unpack_in(target)? {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "archive entry '{}' escapes the artifact directory",
                        entry.path()?.display()
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Remove an artifact's full on-disk footprint: exploded directory,
    /// anchor file, and any packaged archive.
    pub fn uninstall(&self, artifact_name: &str) -> io::Result<()> {
        self.uninstall_exploded(artifact_name)?;

        for suffix in ARCHIVE_SUFFIXES {
            let archive = self
                .deployment_dir
                .join(format!("{artifact_name}{suffix}"));
            if archive.exists() {
                std::fs::remove_file(&archive)?;
            }
        }
        Ok(())
    }

    /// Remove the exploded directory and anchor but keep any packaged
    /// archive: the archive is the install source during a redeploy.
    pub fn uninstall_exploded(&self, artifact_name: &str) -> io::Result<()> {
        let exploded = self.deployment_dir.join(artifact_name);
        if exploded.exists() {
            std::fs::remove_dir_all(&exploded)?;
        }
        self.delete_anchor(artifact_name);
        Ok(())
    }

    /// Path of the anchor marker for an artifact
    pub fn anchor_path(&self, artifact_name: &str) -> PathBuf {
        self.deployment_dir
            .join(format!("{artifact_name}{ANCHOR_SUFFIX}"))
    }

    /// Create the zero-byte anchor marking a fully deployed artifact
    pub fn create_anchor(&self, artifact_name: &str) -> io::Result<()> {
        File::create(self.anchor_path(artifact_name))?;
        Ok(())
    }

    /// Delete the anchor marker; missing anchors are ignored
    pub fn delete_anchor(&self, artifact_name: &str) {
        let anchor = self.anchor_path(artifact_name);
        if anchor.exists() {
            if let Err(e) = std::fs::remove_file(&anchor) {
                warn!(artifact = artifact_name, error = %e, "failed to delete anchor file");
            }
        }
    }
}
