//! Command-line interface for hangar.
//!
//! Provides the watcher loop plus administrative deploy/undeploy/redeploy
//! and status commands. Administrative operations run under the same
//! deployment lock as the watcher so a manual operation and the automatic
//! sweep never race.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use crate::adapters::ProcessArtifactFactory;
use crate::config::DeploymentConfig;
use crate::deploy::{ArchiveDeployer, DeployError, DomainArchiveDeployer};
use crate::domain::DeployableArtifact;
use crate::watch::{
    DeploymentDirectoryWatcher, DeploymentStrategy, ParallelDeployment, SequentialDeployment,
};

type AppDeployer = ArchiveDeployer<ProcessArtifactFactory>;
type DomainDeployer = DomainArchiveDeployer<ProcessArtifactFactory, ProcessArtifactFactory>;
type Watcher = DeploymentDirectoryWatcher<ProcessArtifactFactory, ProcessArtifactFactory>;

/// hangar - artifact deployment orchestrator
#[derive(Parser, Debug)]
#[command(name = "hangar")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Watch the deployment directories until interrupted
    Watch {
        /// Deploy independent applications in parallel
        #[arg(long)]
        parallel: bool,

        /// Seconds between scan cycles
        #[arg(long)]
        interval: Option<u64>,

        /// Override the application directory
        #[arg(long)]
        apps_dir: Option<PathBuf>,

        /// Override the domain directory
        #[arg(long)]
        domains_dir: Option<PathBuf>,
    },

    /// Deploy a packaged archive or an exploded directory by name
    Deploy {
        /// Archive path (.tgz/.tar.gz) or the name of an entry already in
        /// the deployment directory
        artifact: String,

        /// Treat the artifact as a domain
        #[arg(long)]
        domain: bool,

        /// Install and track without starting
        #[arg(long)]
        no_start: bool,
    },

    /// Undeploy a tracked artifact and remove its on-disk footprint
    Undeploy {
        name: String,

        /// Treat the artifact as a domain (cascades to dependent apps)
        #[arg(long)]
        domain: bool,
    },

    /// Stop, rebuild, and restart a tracked artifact in place
    Redeploy {
        name: String,

        /// Treat the artifact as a domain
        #[arg(long)]
        domain: bool,
    },

    /// Show tracked artifacts and quarantine records
    Status {
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        let mut config = DeploymentConfig::load()?;

        match self.command {
            Commands::Watch {
                parallel,
                interval,
                apps_dir,
                domains_dir,
            } => {
                if let Some(secs) = interval {
                    config.poll_interval_secs = secs;
                }
                if let Some(dir) = apps_dir {
                    config.apps_dir = dir;
                }
                if let Some(dir) = domains_dir {
                    config.domains_dir = dir;
                }
                config.parallel_deployment = config.parallel_deployment || parallel;
                run_watch(config).await
            }
            Commands::Deploy {
                artifact,
                domain,
                no_start,
            } => run_deploy(config, artifact, domain, no_start).await,
            Commands::Undeploy { name, domain } => run_undeploy(config, name, domain).await,
            Commands::Redeploy { name, domain } => run_redeploy(config, name, domain).await,
            Commands::Status { json } => run_status(config, json).await,
        }
    }
}

/// Build the orchestrator: one deployer per kind, the domain-aware wrapper,
/// and the watcher with the configured strategy.
fn build_watcher(config: &DeploymentConfig) -> Arc<Watcher> {
    let applications = Arc::new(AppDeployer::new(
        ProcessArtifactFactory,
        &config.apps_dir,
        &config.data_dir,
    ));
    let domains = Arc::new(
        AppDeployer::new(ProcessArtifactFactory, &config.domains_dir, &config.data_dir)
            .without_quarantine(),
    );
    let domain_deployer = Arc::new(DomainDeployer::new(domains, applications));

    let strategy: Box<dyn DeploymentStrategy<ProcessArtifactFactory>> =
        if config.parallel_deployment {
            Box::new(ParallelDeployment::new(config.max_parallel_deploys))
        } else {
            Box::new(SequentialDeployment)
        };

    Arc::new(Watcher::new(
        domain_deployer,
        strategy,
        config.poll_interval(),
    ))
}

async fn run_watch(config: DeploymentConfig) -> Result<()> {
    config.ensure_layout()?;
    let watcher = build_watcher(&config);

    let handle = watcher.start();
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown requested");
    handle.stop().await?;
    Ok(())
}

async fn run_deploy(
    config: DeploymentConfig,
    artifact: String,
    domain: bool,
    no_start: bool,
) -> Result<()> {
    config.ensure_layout()?;
    let watcher = build_watcher(&config);
    let lock = watcher.deployment_lock();
    let _guard = lock.lock().await;

    let properties = no_start.then(|| {
        let mut props = crate::domain::DeploymentProperties::new();
        props.insert(
            crate::domain::START_ON_DEPLOYMENT_PROPERTY.to_string(),
            "false".to_string(),
        );
        props
    });

    let deployment_dir = if domain {
        &config.domains_dir
    } else {
        &config.apps_dir
    };

    let archive_path = PathBuf::from(&artifact);
    let deployed = if archive_path.is_file() {
        let absolute = archive_path
            .canonicalize()
            .with_context(|| format!("cannot resolve archive path {artifact}"))?;
        if domain {
            watcher
                .domain_deployer()
                .deploy_packaged_artifact(&absolute, properties.as_ref())
                .await?
                .map(|a| a.name().to_string())
        } else {
            watcher
                .applications()
                .deploy_packaged_artifact(&absolute, properties.as_ref())
                .await?
                .map(|a| a.name().to_string())
        }
    } else if deployment_dir.join(&artifact).is_dir() {
        if domain {
            watcher
                .domain_deployer()
                .deploy_exploded_artifact(&artifact, properties.as_ref())
                .await?
                .map(|a| a.name().to_string())
        } else {
            watcher
                .applications()
                .deploy_exploded_artifact(&artifact, properties.as_ref())
                .await?
                .map(|a| a.name().to_string())
        }
    } else {
        anyhow::bail!(
            "'{artifact}' is neither an archive file nor a directory in {}",
            deployment_dir.display()
        );
    };

    match deployed {
        Some(name) => println!("Deployed '{name}'"),
        None => println!("Skipped '{artifact}': unchanged since its last failed deployment"),
    }
    Ok(())
}

async fn run_undeploy(config: DeploymentConfig, name: String, domain: bool) -> Result<()> {
    config.ensure_layout()?;
    let watcher = build_watcher(&config);
    let lock = watcher.deployment_lock();
    let _guard = lock.lock().await;

    let result = if domain {
        watcher.domain_deployer().undeploy_artifact(&name).await
    } else {
        watcher.applications().undeploy_artifact(&name).await
    };

    match result {
        Ok(()) => {
            println!("Undeployed '{name}'");
            Ok(())
        }
        Err(DeployError::NotDeployed { .. }) => {
            // a fresh process tracks nothing; clean the on-disk footprint so
            // a running watcher observes the removal on its next cycle
            let deployment_dir = if domain {
                &config.domains_dir
            } else {
                &config.apps_dir
            };
            let mut removed = false;
            let exploded = deployment_dir.join(&name);
            if exploded.is_dir() {
                std::fs::remove_dir_all(&exploded)?;
                removed = true;
            }
            for suffix in [".tgz", ".tar.gz", ".anchor"] {
                let file = deployment_dir.join(format!("{name}{suffix}"));
                if file.is_file() {
                    std::fs::remove_file(&file)?;
                    removed = true;
                }
            }
            if removed {
                println!("Removed on-disk footprint of '{name}'");
                Ok(())
            } else {
                anyhow::bail!("artifact '{name}' is not deployed")
            }
        }
        Err(e) => Err(e.into()),
    }
}

async fn run_redeploy(config: DeploymentConfig, name: String, domain: bool) -> Result<()> {
    config.ensure_layout()?;
    let watcher = build_watcher(&config);
    let lock = watcher.deployment_lock();
    let _guard = lock.lock().await;

    if domain {
        watcher.domain_deployer().redeploy(&name, None).await?;
    } else {
        watcher.applications().redeploy(&name, None).await?;
    }
    println!("Redeployed '{name}'");
    Ok(())
}

async fn run_status(config: DeploymentConfig, json: bool) -> Result<()> {
    config.ensure_layout()?;
    let watcher = build_watcher(&config);

    // status is derived from the directory listing and anchor files, so it
    // is meaningful even from a fresh process
    let summary = kind_status(watcher.domain_deployer().domains());
    let apps = kind_status(watcher.applications());

    if json {
        let payload = serde_json::json!({
            "domains": summary,
            "applications": apps,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    print_kind("Domains", &config.domains_dir, &summary);
    print_kind("Applications", &config.apps_dir, &apps);
    Ok(())
}

fn kind_status<F: crate::domain::ArtifactFactory>(
    deployer: &Arc<ArchiveDeployer<F>>,
) -> serde_json::Value {
    let entries: Vec<serde_json::Value> = std::fs::read_dir(deployer.deployment_dir())
        .map(|dir| {
            dir.filter_map(|e| e.ok())
                .filter(|e| {
                    !e.file_name().to_string_lossy().starts_with('.')
                        && !e.file_name().to_string_lossy().ends_with(".anchor")
                })
                .map(|e| {
                    let name = e.file_name().to_string_lossy().to_string();
                    let anchored = deployer
                        .deployment_dir()
                        .join(format!(
                            "{}.anchor",
                            name.trim_end_matches(".tar.gz").trim_end_matches(".tgz")
                        ))
                        .exists();
                    serde_json::json!({ "entry": name, "anchored": anchored })
                })
                .collect()
        })
        .unwrap_or_default();

    let zombies: Vec<String> = deployer.zombie_resources().keys().cloned().collect();
    serde_json::json!({ "entries": entries, "quarantined": zombies })
}

fn print_kind(label: &str, dir: &std::path::Path, status: &serde_json::Value) {
    println!("{label} ({}):", dir.display());
    let entries = status["entries"].as_array().cloned().unwrap_or_default();
    if entries.is_empty() {
        println!("  (none)");
    }
    for entry in entries {
        let name = entry["entry"].as_str().unwrap_or("?");
        let anchored = entry["anchored"].as_bool().unwrap_or(false);
        let marker = if anchored { "deployed" } else { "pending" };
        println!("  {name:<40} {marker}");
    }
    if let Some(quarantined) = status["quarantined"].as_array() {
        for name in quarantined {
            if let Some(name) = name.as_str() {
                println!("  {name:<40} quarantined");
            }
        }
    }
}
