//! Live-artifact registry.
//!
//! An ordered collection of the artifacts currently tracked for one kind.
//! Mutated only by the orchestrator, read by status queries. At most one
//! entry per artifact name: tracking a name that is already present
//! atomically replaces the previous entry. Observers are notified
//! synchronously on every mutation, isolated from each other.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use tracing::error;

use crate::domain::DeployableArtifact;

/// A mutation of the registry, delivered to observers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryChange {
    Added(String),
    Removed(String),
}

type Observer = Box<dyn Fn(&RegistryChange) + Send + Sync>;

/// Ordered collection of tracked artifacts for one artifact kind
pub struct ArtifactRegistry<A> {
    artifacts: Mutex<Vec<Arc<A>>>,
    observers: Mutex<Vec<Observer>>,
}

impl<A> Default for ArtifactRegistry<A> {
    fn default() -> Self {
        Self {
            artifacts: Mutex::new(Vec::new()),
            observers: Mutex::new(Vec::new()),
        }
    }
}

impl<A: DeployableArtifact> ArtifactRegistry<A> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer invoked on every add/remove
    pub fn subscribe(&self, observer: impl Fn(&RegistryChange) + Send + Sync + 'static) {
        self.observers
            .lock()
            .expect("registry observers poisoned")
            .push(Box::new(observer));
    }

    /// Track an artifact, replacing any previous entry with the same name.
    ///
    /// Returns the replaced entry, if any.
    pub fn track(&self, artifact: A) -> (Arc<A>, Option<Arc<A>>) {
        let artifact = Arc::new(artifact);
        let name = artifact.name().to_string();

        let previous = {
            let mut artifacts = self.artifacts.lock().expect("registry poisoned");
            let previous = artifacts
                .iter()
                .position(|a| a.name() == name)
                .map(|idx| artifacts.remove(idx));
            artifacts.push(artifact.clone());
            previous
        };

        if previous.is_some() {
            self.notify(&RegistryChange::Removed(name.clone()));
        }
        self.notify(&RegistryChange::Added(name));
        (artifact, previous)
    }

    /// Remove the entry with the given name
    pub fn remove(&self, name: &str) -> Option<Arc<A>> {
        let removed = {
            let mut artifacts = self.artifacts.lock().expect("registry poisoned");
            artifacts
                .iter()
                .position(|a| a.name() == name)
                .map(|idx| artifacts.remove(idx))
        };

        if removed.is_some() {
            self.notify(&RegistryChange::Removed(name.to_string()));
        }
        removed
    }

    /// Find a tracked artifact by name
    pub fn find(&self, name: &str) -> Option<Arc<A>> {
        self.artifacts
            .lock()
            .expect("registry poisoned")
            .iter()
            .find(|a| a.name() == name)
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// Snapshot of tracked artifacts, in tracking order
    pub fn snapshot(&self) -> Vec<Arc<A>> {
        self.artifacts.lock().expect("registry poisoned").clone()
    }

    /// Names of tracked artifacts, in tracking order
    pub fn names(&self) -> Vec<String> {
        self.artifacts
            .lock()
            .expect("registry poisoned")
            .iter()
            .map(|a| a.name().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.artifacts.lock().expect("registry poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn notify(&self, change: &RegistryChange) {
        let observers = self.observers.lock().expect("registry observers poisoned");
        for observer in observers.iter() {
            if catch_unwind(AssertUnwindSafe(|| observer(change))).is_err() {
                error!(?change, "registry observer panicked, continuing");
            }
        }
    }
}
