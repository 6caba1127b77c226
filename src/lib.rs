//! hangar - artifact deployment orchestrator
//!
//! Manages the full lifecycle of deployable artifacts on a running host:
//! detecting new or changed packages on disk, installing them, starting
//! them, tearing them down, and re-installing them on change. No artifact
//! is ever concurrently deployed twice, and a persistently failing artifact
//! cannot spin the host into a redeploy loop.
//!
//! # Architecture
//!
//! - A watcher task periodically diffs the deployment directories against
//!   the previously observed listing and turns the differences into
//!   deploy/undeploy/redeploy calls, all under one deployment lock.
//! - One [`deploy::ArchiveDeployer`] per artifact kind owns the install /
//!   construct / start state machine, the live-artifact registry, and the
//!   failure quarantine ("zombie") records keyed on file mtimes.
//! - [`deploy::DomainArchiveDeployer`] composes the domain and application
//!   deployers so that undeploying a domain first undeploys every
//!   application depending on it.
//! - Independent application deploys can fan out across a bounded worker
//!   pool within a single watcher cycle.
//!
//! # Modules
//!
//! - `adapters`: concrete artifact implementations (process-backed)
//! - `config`: directory layout and watcher settings
//! - `deploy`: the orchestrator core
//! - `domain`: descriptors and the capability traits
//! - `watch`: the directory watcher and deployment strategies
//! - `cli`: command-line interface

pub mod adapters;
pub mod cli;
pub mod config;
pub mod deploy;
pub mod domain;
pub mod watch;

// Re-export main types at crate root for convenience
pub use config::DeploymentConfig;
pub use deploy::{
    ArchiveDeployer, DeployError, DeploymentListener, DomainArchiveDeployer, ZombieArtifact,
};
pub use domain::{
    ArtifactDescriptor, ArtifactFactory, ArtifactStatus, DeployableArtifact, DeploymentProperties,
};
pub use watch::{
    DeploymentDirectoryWatcher, ParallelDeployment, SequentialDeployment, WatchHandle,
};
