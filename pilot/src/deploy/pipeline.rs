//! Per-resource deployment pipeline
//!
//! Stages run strictly in order for one resource: pre-deploy hook, build
//! context, image build, retention, container start and proxy route. Any
//! stage error marks the resource `ERROR` and ends its pipeline; compensation
//! is left to the orchestrator through the rollback action registered first.

use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, warn};

use crate::console::{LoggerFactory, ResourceLogger};
use crate::deploy::context;
use crate::deploy::fsm::StatusEvent;
use crate::deploy::hooks::run_pre_deploy;
use crate::deploy::images::ImageManager;
use crate::deploy::proxy::ProxyReconciler;
use crate::deploy::rollback::{RollbackAction, RollbackCoordinator};
use crate::deploy::status::StatusReporter;
use crate::errors::PilotError;
use crate::models::resource::Resource;
use crate::runtime::{ContainerRuntime, ContainerSummary};
use crate::templates::{Template, TemplateKind, TemplateRegistry};

/// Shared collaborators of every pipeline of one deployment
#[derive(Clone)]
pub struct PipelineContext {
    pub runtime: Arc<dyn ContainerRuntime>,
    pub images: ImageManager,
    pub proxies: ProxyReconciler,
    pub status: Arc<StatusReporter>,
    pub rollback: Arc<RollbackCoordinator>,
    pub templates: TemplateRegistry,
    pub loggers: LoggerFactory,

    /// Containers kept per resource after a deploy
    pub keep: usize,
}

/// Deploy one resource; returns it with its final extra metadata
pub async fn run(ctx: PipelineContext, mut resource: Resource) -> Result<Resource, PilotError> {
    let logger = ctx.loggers.get(&resource.name);
    logger.start(&format!("deploying version {}", resource.version));

    match run_stages(&ctx, &mut resource, &logger).await {
        Ok(()) => Ok(resource),
        Err(e) => {
            logger.fail(&e.to_string());
            if let Err(report_err) = ctx.status.report(&resource, StatusEvent::Error(e.to_string())).await {
                warn!("Could not record failure of {}: {}", resource.name, report_err);
            }
            Err(e)
        }
    }
}

async fn run_stages(ctx: &PipelineContext, resource: &mut Resource, logger: &ResourceLogger) -> Result<(), PilotError> {
    let template = ctx.templates.get(&resource.template)?;
    let prefixes = resource.container_prefixes();

    let previous = ctx.images.find_running(&resource.stack, &prefixes).await?;
    if let Some(previous) = &previous {
        debug!("Previous container of {} is {}", resource.name, previous.name);
    }
    ctx.rollback.push(
        resource.name.clone(),
        rollback_action(ctx, resource, previous),
    );

    ctx.status.report(resource, StatusEvent::Progress(None)).await?;

    if let Some(command) = resource.pre_deploy.clone() {
        logger.info(&format!("pre-deploy: {}", command));
        let output = run_pre_deploy(&command, &resource.folders.project, &resource.environment).await?;
        for line in output.combined().lines().filter(|l| !l.trim().is_empty()) {
            logger.line(line);
        }
        ctx.status
            .report(resource, StatusEvent::Progress(Some(format!("PRE-DEPLOY: {}", command))))
            .await?;
    }

    context::prepare(resource, template.as_ref()).await?;

    if template.kind() == TemplateKind::Task {
        let output = template.run_task(resource).await?;
        for line in output.lines().filter(|l| !l.trim().is_empty()) {
            logger.line(line);
        }
        ctx.status.report(resource, StatusEvent::Succeed).await?;
        logger.succeed("task finished");
        return Ok(());
    }

    let image = ctx.images.build(resource, template.as_ref(), logger).await?;
    logger.succeed(&format!("built {}", image));
    ctx.status
        .report(resource, StatusEvent::Progress(Some(format!("COMPILED: {}", image))))
        .await?;

    match ctx.images.clean(&resource.stack, &prefixes, ctx.keep).await {
        Ok(report) => {
            let line = format!("CLEANUP: kept {}, removed {}", report.kept.len(), report.removed.len());
            ctx.status.report(resource, StatusEvent::Progress(Some(line))).await?;
        }
        Err(e) => {
            warn!("Cleanup of {} failed: {}", resource.name, e);
            logger.warn(&format!("cleanup failed: {}", e));
        }
    }

    ctx.images.start(resource, template.as_ref(), &image).await?;
    logger.succeed(&format!("started {}", resource.container_name()));
    ctx.status
        .report(
            resource,
            StatusEvent::Progress(Some(format!("STARTED: {}", resource.container_name()))),
        )
        .await?;

    if resource.proxy {
        reconcile_proxy(ctx, resource, template.as_ref(), logger).await?;
    }

    ctx.status.report(resource, StatusEvent::Succeed).await?;
    logger.succeed(&format!("version {} is live", resource.version));
    Ok(())
}

/// Route `<fullName>` to the new container and drop the route of a previous name
async fn reconcile_proxy(
    ctx: &PipelineContext,
    resource: &mut Resource,
    template: &dyn Template,
    logger: &ResourceLogger,
) -> Result<(), PilotError> {
    let subdomain = resource.full_name();
    let target = match template.container_port(resource) {
        Some(port) => format!("{}:{}", resource.hostname(), port),
        None => resource.hostname(),
    };

    let outcome = ctx.proxies.reconcile(&subdomain, &target).await?;
    if let Some(url) = &outcome.url {
        resource.extra.proxy_url = Some(url.clone());
    }
    logger.info(&format!("proxy {} -> {} ({})", subdomain, target, outcome.change));
    ctx.status
        .report(
            resource,
            StatusEvent::Progress(Some(format!("PROXY: {} -> {} {}", subdomain, target, outcome.change))),
        )
        .await?;

    if let Some(old) = resource.previous_full_name() {
        match ctx.proxies.remove(&old).await {
            Ok(0) => {}
            Ok(n) => debug!("Removed {} proxy entries of {}", n, old),
            Err(e) => logger.warn(&format!("could not remove proxy route {}: {}", old, e)),
        }
    }
    Ok(())
}

/// Compensation for one resource: mark it, drop the new container, restart the previous one
fn rollback_action(ctx: &PipelineContext, resource: &Resource, previous: Option<ContainerSummary>) -> RollbackAction {
    let runtime = ctx.runtime.clone();
    let status = ctx.status.clone();
    let name = resource.name.clone();
    let new_container = resource.container_name();

    Box::new(move || {
        let runtime = runtime.clone();
        let status = status.clone();
        let name = name.clone();
        let new_container = new_container.clone();
        let previous = previous.clone();

        async move {
            let target = previous
                .as_ref()
                .map(|p| p.name.clone())
                .unwrap_or_else(|| "none".to_string());
            if let Err(e) = status.rollback(&name, &target).await {
                warn!("Could not record rollback of {}: {}", name, e);
            }

            let same_as_previous = previous.as_ref().is_some_and(|p| p.name == new_container);
            if !same_as_previous {
                match runtime.remove_container(&new_container, true).await {
                    Ok(()) | Err(PilotError::NotFound(_)) => {}
                    Err(e) => return Err(e),
                }
            }

            if let Some(previous) = previous {
                match runtime.start_container(&previous.id).await {
                    Ok(()) | Err(PilotError::NotModified(_)) => {}
                    Err(e) => return Err(e),
                }
            }
            Ok(())
        }
        .boxed()
    })
}
