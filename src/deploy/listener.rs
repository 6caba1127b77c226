//! Deployment lifecycle listeners.
//!
//! Listeners observe deploy/undeploy/redeploy transitions, keyed by artifact
//! name. They are invoked synchronously on the thread performing the
//! mutation, in registration order, with per-listener isolation: a listener
//! that panics is logged and the remaining listeners still run.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use tracing::error;

use super::error::DeployError;

/// Observer of artifact lifecycle transitions.
///
/// All callbacks default to no-ops so implementations override only the
/// events they care about. Callbacks must not re-enter deploy/undeploy/
/// redeploy operations synchronously; they run under the deployment lock.
pub trait DeploymentListener: Send + Sync {
    fn on_deployment_start(&self, _artifact_name: &str) {}
    fn on_deployment_success(&self, _artifact_name: &str) {}
    fn on_deployment_failure(&self, _artifact_name: &str, _error: &DeployError) {}

    fn on_undeployment_start(&self, _artifact_name: &str) {}
    fn on_undeployment_success(&self, _artifact_name: &str) {}
    fn on_undeployment_failure(&self, _artifact_name: &str, _error: &DeployError) {}

    fn on_redeployment_start(&self, _artifact_name: &str) {}
    fn on_redeployment_success(&self, _artifact_name: &str) {}
    fn on_redeployment_failure(&self, _artifact_name: &str, _error: &DeployError) {}
}

/// Ordered fan-out over registered listeners.
///
/// Each callback is dispatched to every listener in registration order; a
/// panicking listener aborts only its own dispatch.
#[derive(Default)]
pub struct CompositeDeploymentListener {
    listeners: Mutex<Vec<Arc<dyn DeploymentListener>>>,
}

impl CompositeDeploymentListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener at the end of the dispatch order
    pub fn add_listener(&self, listener: Arc<dyn DeploymentListener>) {
        self.listeners.lock().expect("listener list poisoned").push(listener);
    }

    /// Number of registered listeners
    pub fn len(&self) -> usize {
        self.listeners.lock().expect("listener list poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn dispatch(&self, event: &str, f: impl Fn(&dyn DeploymentListener)) {
        let snapshot: Vec<_> = self
            .listeners
            .lock()
            .expect("listener list poisoned")
            .clone();
        for listener in snapshot {
            if catch_unwind(AssertUnwindSafe(|| f(listener.as_ref()))).is_err() {
                error!(event, "deployment listener panicked, continuing with next listener");
            }
        }
    }
}

impl DeploymentListener for CompositeDeploymentListener {
    fn on_deployment_start(&self, name: &str) {
        self.dispatch("deployment_start", |l| l.on_deployment_start(name));
    }

    fn on_deployment_success(&self, name: &str) {
        self.dispatch("deployment_success", |l| l.on_deployment_success(name));
    }

    fn on_deployment_failure(&self, name: &str, err: &DeployError) {
        self.dispatch("deployment_failure", |l| l.on_deployment_failure(name, err));
    }

    fn on_undeployment_start(&self, name: &str) {
        self.dispatch("undeployment_start", |l| l.on_undeployment_start(name));
    }

    fn on_undeployment_success(&self, name: &str) {
        self.dispatch("undeployment_success", |l| l.on_undeployment_success(name));
    }

    fn on_undeployment_failure(&self, name: &str, err: &DeployError) {
        self.dispatch("undeployment_failure", |l| l.on_undeployment_failure(name, err));
    }

    fn on_redeployment_start(&self, name: &str) {
        self.dispatch("redeployment_start", |l| l.on_redeployment_start(name));
    }

    fn on_redeployment_success(&self, name: &str) {
        self.dispatch("redeployment_success", |l| l.on_redeployment_success(name));
    }

    fn on_redeployment_failure(&self, name: &str, err: &DeployError) {
        self.dispatch("redeployment_failure", |l| l.on_redeployment_failure(name, err));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Recording {
        starts: AtomicUsize,
    }

    impl DeploymentListener for Recording {
        fn on_deployment_start(&self, _name: &str) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Panicking;

    impl DeploymentListener for Panicking {
        fn on_deployment_start(&self, _name: &str) {
            panic!("listener blew up");
        }
    }

    #[test]
    fn test_dispatch_in_registration_order() {
        let composite = CompositeDeploymentListener::new();
        let first = Arc::new(Recording { starts: AtomicUsize::new(0) });
        let second = Arc::new(Recording { starts: AtomicUsize::new(0) });
        composite.add_listener(first.clone());
        composite.add_listener(second.clone());

        composite.on_deployment_start("app");

        assert_eq!(first.starts.load(Ordering::SeqCst), 1);
        assert_eq!(second.starts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_listener_does_not_stop_fanout() {
        let composite = CompositeDeploymentListener::new();
        let survivor = Arc::new(Recording { starts: AtomicUsize::new(0) });
        composite.add_listener(Arc::new(Panicking));
        composite.add_listener(survivor.clone());

        composite.on_deployment_start("app");

        assert_eq!(survivor.starts.load(Ordering::SeqCst), 1);
    }
}
