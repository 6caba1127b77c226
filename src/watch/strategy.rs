//! Per-cycle deployment strategies.
//!
//! The watcher hands each cycle's batch of new/changed applications to a
//! strategy. The sequential strategy deploys them in order; the parallel
//! strategy fans independent deploys out across a bounded worker pool and
//! waits for the whole batch before the watcher moves on. Undeploys are
//! never parallelized: their ordering interacts with the domain dependency
//! cascade.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::deploy::ArchiveDeployer;
use crate::domain::ArtifactFactory;

/// Default cap on concurrent deployments in a parallel batch
pub const MAX_PARALLEL_DEPLOYS: usize = 20;

/// Deploys one cycle's batch of new/changed application artifacts
#[async_trait]
pub trait DeploymentStrategy<F: ArtifactFactory>: Send + Sync {
    /// Deploy a batch of packaged archives (file names inside the
    /// deployment directory). Failures are logged and never abort the batch.
    async fn deploy_packaged(&self, deployer: &Arc<ArchiveDeployer<F>>, archives: &[String]);

    /// Deploy a batch of exploded artifact directories, honoring the
    /// quarantine gate. Failures are logged and never abort the batch.
    async fn deploy_exploded(&self, deployer: &Arc<ArchiveDeployer<F>>, directories: &[String]);
}

/// In-order deployment, one artifact at a time
#[derive(Debug, Default, Clone, Copy)]
pub struct SequentialDeployment;

#[async_trait]
impl<F: ArtifactFactory> DeploymentStrategy<F> for SequentialDeployment {
    async fn deploy_packaged(&self, deployer: &Arc<ArchiveDeployer<F>>, archives: &[String]) {
        for archive in archives {
            if let Err(e) = deployer.deploy_packaged_artifact(archive, None).await {
                warn!(archive = %archive, error = %e, "packaged deployment failed, continuing");
            }
        }
    }

    async fn deploy_exploded(&self, deployer: &Arc<ArchiveDeployer<F>>, directories: &[String]) {
        for directory in directories {
            if !deployer.is_updated_zombie_artifact(directory) {
                continue;
            }
            if let Err(e) = deployer.deploy_exploded_artifact(directory, None).await {
                warn!(directory = %directory, error = %e, "exploded deployment failed, continuing");
            }
        }
    }
}

/// Bounded-concurrency deployment.
///
/// One task per artifact, gated by a semaphore created for the batch; the
/// batch completes only when every task has finished, success or failure. A
/// failing task never cancels its siblings.
#[derive(Debug, Clone, Copy)]
pub struct ParallelDeployment {
    max_concurrent: usize,
}

impl Default for ParallelDeployment {
    fn default() -> Self {
        Self {
            max_concurrent: MAX_PARALLEL_DEPLOYS,
        }
    }
}

impl ParallelDeployment {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
        }
    }

    async fn run_batch<T, F, Fut>(&self, items: Vec<T>, run: F)
    where
        F: Fn(T) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        if items.is_empty() {
            return;
        }

        // the pool lives for exactly one batch
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut handles = Vec::with_capacity(items.len());

        for item in items {
            let permit_source = semaphore.clone();
            let fut = run(item);
            handles.push(tokio::spawn(async move {
                let _permit = permit_source
                    .acquire()
                    .await
                    .expect("batch semaphore closed");
                fut.await;
            }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "parallel deployment task aborted");
            }
        }
    }
}

#[async_trait]
impl<F: ArtifactFactory> DeploymentStrategy<F> for ParallelDeployment {
    async fn deploy_packaged(&self, deployer: &Arc<ArchiveDeployer<F>>, archives: &[String]) {
        debug!(batch = archives.len(), "deploying packaged artifacts in parallel");
        self.run_batch(archives.to_vec(), |archive| {
            let deployer = deployer.clone();
            async move {
                if let Err(e) = deployer.deploy_packaged_artifact(&archive, None).await {
                    warn!(archive = %archive, error = %e, "packaged deployment failed, continuing");
                }
            }
        })
        .await;
    }

    async fn deploy_exploded(&self, deployer: &Arc<ArchiveDeployer<F>>, directories: &[String]) {
        let eligible: Vec<String> = directories
            .iter()
            .filter(|d| deployer.is_updated_zombie_artifact(d))
            .cloned()
            .collect();

        self.run_batch(eligible, |directory| {
            let deployer = deployer.clone();
            async move {
                if let Err(e) = deployer.deploy_exploded_artifact(&directory, None).await {
                    warn!(directory = %directory, error = %e, "exploded deployment failed, continuing");
                }
            }
        })
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_run_batch_respects_cap() {
        let strategy = ParallelDeployment::new(2);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let items: Vec<usize> = (0..8).collect();
        strategy
            .run_batch(items, |_| {
                let in_flight = in_flight.clone();
                let peak = peak.clone();
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                }
            })
            .await;

        assert_eq!(in_flight.load(Ordering::SeqCst), 0);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_run_batch_survives_panicking_task() {
        let strategy = ParallelDeployment::new(4);
        let completed = Arc::new(AtomicUsize::new(0));

        strategy
            .run_batch(vec![0usize, 1, 2, 3], |item| {
                let completed = completed.clone();
                async move {
                    if item == 1 {
                        panic!("task blew up");
                    }
                    completed.fetch_add(1, Ordering::SeqCst);
                }
            })
            .await;

        assert_eq!(completed.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_zero_cap_is_clamped() {
        let strategy = ParallelDeployment::new(0);
        let completed = Arc::new(AtomicUsize::new(0));

        strategy
            .run_batch(vec![0usize], |_| {
                let completed = completed.clone();
                async move {
                    completed.fetch_add(1, Ordering::SeqCst);
                }
            })
            .await;

        assert_eq!(completed.load(Ordering::SeqCst), 1);
    }
}
