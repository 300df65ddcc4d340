//! Deployment orchestrator
//!
//! Runs one deploy of a stack end to end: diff against the last recorded
//! deployment, version assignment, one concurrent pipeline per targeted
//! resource, and rollback of everything when any pipeline fails.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::catalog::Catalog;
use crate::console::{self, LoggerFactory};
use crate::deploy::diff::{self, Confirm, Reconciliation};
use crate::deploy::images::ImageManager;
use crate::deploy::pipeline::{self, PipelineContext};
use crate::deploy::proxy::ProxyReconciler;
use crate::deploy::rollback::RollbackCoordinator;
use crate::deploy::status::StatusReporter;
use crate::deploy::version::assign_version;
use crate::errors::PilotError;
use crate::http::deployments::DeploymentStore;
use crate::models::deployment::{Deployment, DeploymentStatus, NewDeployment, ResourceRecord, ResourceStatus};
use crate::models::resource::{full_name, Resource};
use crate::runtime::ContainerRuntime;
use crate::storage::profiles::{DEFAULT_KEEP, DEFAULT_PROXY_NETWORK};
use crate::templates::TemplateRegistry;

/// Deploy-wide settings taken from the profile
#[derive(Debug, Clone)]
pub struct DeploySettings {
    /// Containers kept per resource
    pub keep: usize,

    /// Network shared with the proxy
    pub proxy_network: String,
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            keep: DEFAULT_KEEP,
            proxy_network: DEFAULT_PROXY_NETWORK.to_string(),
        }
    }
}

/// Result of a finished deploy
#[derive(Debug, Clone)]
pub struct DeployOutcome {
    /// Final deployment record
    pub deployment: Deployment,

    /// Resources whose pipeline failed
    pub failed: Vec<String>,

    /// Rollback actions that failed
    pub rollback_failures: usize,
}

impl DeployOutcome {
    pub fn succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Deploys stacks against one runtime, state store and proxy registrar
pub struct Deployer {
    runtime: Arc<dyn ContainerRuntime>,
    store: Arc<dyn DeploymentStore>,
    proxies: ProxyReconciler,
    confirm: Arc<dyn Confirm>,
    templates: TemplateRegistry,
    loggers: LoggerFactory,
    settings: DeploySettings,
}

impl Deployer {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        store: Arc<dyn DeploymentStore>,
        proxies: ProxyReconciler,
        confirm: Arc<dyn Confirm>,
    ) -> Self {
        Self {
            runtime,
            store,
            proxies,
            confirm,
            templates: TemplateRegistry::builtin(),
            loggers: LoggerFactory::new(),
            settings: DeploySettings::default(),
        }
    }

    pub fn with_templates(mut self, templates: TemplateRegistry) -> Self {
        self.templates = templates;
        self
    }

    pub fn with_settings(mut self, settings: DeploySettings) -> Self {
        self.settings = settings;
        self
    }

    fn images(&self) -> ImageManager {
        ImageManager::new(self.runtime.clone(), self.settings.proxy_network.clone())
    }

    /// Deploy `selected` resources of `catalog`, or all of them when empty
    pub async fn deploy(&self, catalog: Catalog, selected: &[String]) -> Result<DeployOutcome, PilotError> {
        catalog.check_selection(selected)?;
        let stack = catalog.stack.clone();

        let last = self.store.last(&stack).await?;
        let reconciliation = diff::reconcile(&catalog.names(), last.as_ref(), self.confirm.as_ref())?;

        let carried = self.handle_removals(&stack, &reconciliation).await;

        let targeted: HashSet<&str> = if selected.is_empty() {
            catalog.names().into_iter().collect()
        } else {
            selected.iter().map(String::as_str).collect()
        };

        let mut records = Vec::with_capacity(catalog.resources.len() + carried.len());
        let mut pipelines = Vec::new();
        for mut resource in catalog.resources.clone() {
            let history = reconciliation.history.get(&resource.name);
            if let Some(record) = history {
                resource.extra = record.extra.clone();
                resource.extra.rollback_target = None;
            }
            if let Some(old) = reconciliation.renames.get(&resource.name) {
                resource.previous_name = Some(old.clone());
                resource.extra.renamed_from = Some(old.clone());
            }

            if targeted.contains(resource.name.as_str()) {
                let last_version = reconciliation.last_version(&resource.name);
                resource.version = assign_version(self.runtime.as_ref(), &resource.full_name(), last_version).await?;
                info!("{} -> version {}", resource.full_name(), resource.version);

                records.push(ResourceRecord {
                    name: resource.name.clone(),
                    version: resource.version.to_string(),
                    status: ResourceStatus::Pending,
                    extra: resource.extra.clone(),
                    task_log: Vec::new(),
                });
                pipelines.push(resource);
            } else {
                records.push(skipped_record(&resource, history));
            }
        }
        records.extend(carried);

        let request = NewDeployment {
            status: DeploymentStatus::Processing,
            resources: records.clone(),
        };
        let mut deployment = self.store.create(&stack, &request).await?;
        if deployment.stack_name.is_empty() {
            deployment.stack_name = stack.clone();
        }
        if deployment.resources.is_empty() {
            deployment.resources = records;
        }
        info!("Created deployment {} of {}", deployment.id, stack);

        let status = Arc::new(StatusReporter::new(self.store.clone(), deployment));
        let rollback = Arc::new(RollbackCoordinator::new());
        let ctx = PipelineContext {
            runtime: self.runtime.clone(),
            images: self.images(),
            proxies: self.proxies.clone(),
            status: status.clone(),
            rollback: rollback.clone(),
            templates: self.templates.clone(),
            loggers: self.loggers.clone(),
            keep: self.settings.keep,
        };

        let failed = run_pipelines(&ctx, pipelines).await;

        let (final_status, rollback_failures) = if failed.is_empty() {
            (DeploymentStatus::Success, 0)
        } else {
            warn!("Deployment of {} failed ({}), rolling back", stack, failed.join(", "));
            (DeploymentStatus::Failed, roll_back(&rollback).await)
        };

        let deployment = match status.finish(final_status).await {
            Ok(deployment) => deployment,
            Err(e) => {
                // An unrecorded success is not a success
                if final_status == DeploymentStatus::Success {
                    error!("Could not record success of {}, rolling back", stack);
                    roll_back(&rollback).await;
                    let _ = status.finish(DeploymentStatus::Failed).await;
                }
                console::print_summary(&status.snapshot().await);
                return Err(PilotError::ServiceError(format!(
                    "could not record the final status of {}: {}",
                    stack, e
                )));
            }
        };
        console::print_summary(&deployment);

        Ok(DeployOutcome {
            deployment,
            failed,
            rollback_failures,
        })
    }

    /// Delete confirmed removals; declined ones come back as skipped records
    async fn handle_removals(&self, stack: &str, reconciliation: &Reconciliation) -> Vec<ResourceRecord> {
        if reconciliation.removed.is_empty() {
            return Vec::new();
        }

        if !reconciliation.remove_confirmed {
            return reconciliation
                .removed
                .iter()
                .map(|record| ResourceRecord {
                    status: ResourceStatus::Skipped,
                    task_log: Vec::new(),
                    ..record.clone()
                })
                .collect();
        }

        let images = self.images();
        for record in &reconciliation.removed {
            let name = full_name(&record.name, stack);
            let logger = self.loggers.get(&record.name);

            match images.clean(stack, &[format!("{}-", name)], 0).await {
                Ok(report) => logger.succeed(&format!("removed {} container(s)", report.removed.len())),
                Err(e) => logger.warn(&format!("could not remove containers: {}", e)),
            }
            if let Err(e) = self.proxies.remove(&name).await {
                logger.warn(&format!("could not remove proxy route: {}", e));
            }
        }
        Vec::new()
    }
}

/// Run every rollback action, returning how many failed
async fn roll_back(rollback: &RollbackCoordinator) -> usize {
    let failures = rollback.run().await;
    if failures > 0 {
        error!("{} rollback action(s) failed", failures);
    }
    failures
}

/// Record of a resource left out of this deploy, carrying its history verbatim
fn skipped_record(resource: &Resource, history: Option<&ResourceRecord>) -> ResourceRecord {
    match history {
        Some(record) => ResourceRecord {
            name: resource.name.clone(),
            status: ResourceStatus::Skipped,
            task_log: Vec::new(),
            ..record.clone()
        },
        None => ResourceRecord {
            name: resource.name.clone(),
            version: "0".to_string(),
            status: ResourceStatus::Skipped,
            extra: resource.extra.clone(),
            task_log: Vec::new(),
        },
    }
}

/// Run every pipeline concurrently and drain them all; returns the failed names
async fn run_pipelines(ctx: &PipelineContext, resources: Vec<Resource>) -> Vec<String> {
    let mut set = JoinSet::new();
    for resource in resources {
        let ctx = ctx.clone();
        set.spawn(async move {
            let name = resource.name.clone();
            let result = AssertUnwindSafe(pipeline::run(ctx, resource)).catch_unwind().await;
            (name, result)
        });
    }

    let mut failed = Vec::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((_, Ok(Ok(_)))) => {}
            Ok((name, Ok(Err(_)))) => failed.push(name),
            Ok((name, Err(_))) => {
                error!("Pipeline of {} panicked", name);
                if let Err(e) = ctx.status.fail(&name, "pipeline panicked").await {
                    warn!("Could not record failure of {}: {}", name, e);
                }
                failed.push(name);
            }
            Err(e) => {
                error!("Pipeline task failed: {}", e);
                failed.push("<unknown>".to_string());
            }
        }
    }
    failed.sort();
    failed
}
