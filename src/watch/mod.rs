//! Directory watching and per-cycle deployment scheduling.
//!
//! - Watcher: the snapshot/diff loop driving deploy, undeploy, and redeploy
//! - Strategy: sequential or bounded-parallel fan-out of a cycle's deploys

pub mod strategy;
pub mod watcher;

// Re-export key types
pub use strategy::{
    DeploymentStrategy, ParallelDeployment, SequentialDeployment, MAX_PARALLEL_DEPLOYS,
};
pub use watcher::{
    CycleSummary, DeploymentDirectoryWatcher, DirectorySnapshot, EntryDiff, SnapshotDiff,
    WatchHandle,
};
