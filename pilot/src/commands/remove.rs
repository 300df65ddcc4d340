//! `pilot remove`

use std::collections::BTreeSet;

use colored::Colorize;
use tracing::warn;

use crate::app::state::AppState;
use crate::cli::RemoveArgs;
use crate::console::{print_error, print_success, print_warning, LoggerFactory};
use crate::deploy::diff::{Confirm, TerminalConfirm};
use crate::deploy::proxy::ProxyReconciler;
use crate::deploy::version::parse_container_name;
use crate::errors::PilotError;
use crate::models::resource::full_name;
use crate::runtime::{ContainerFilter, ContainerRuntime, ContainerSummary};

/// Stop and delete one container and its image
async fn remove_container(runtime: &dyn ContainerRuntime, container: &ContainerSummary) -> Result<(), PilotError> {
    match runtime.stop_container(&container.id).await {
        Ok(()) | Err(PilotError::NotModified(_)) => {}
        Err(e) => return Err(e),
    }
    runtime.remove_container(&container.id, true).await?;
    if !container.image.is_empty() {
        if let Err(e) = runtime.remove_image(&container.image, true).await {
            warn!("Could not remove image {}: {}", container.image, e);
        }
    }
    Ok(())
}

pub async fn execute(state: &AppState, args: &RemoveArgs) -> Result<(), PilotError> {
    let stack = &state.stack.name;
    let containers = state.runtime.list_containers(&ContainerFilter::stack(stack)).await?;
    if containers.is_empty() {
        print_warning(&format!("No containers found for stack {}", stack));
        return Ok(());
    }

    println!("{}", format!("Containers of stack {}:", stack).bold());
    for container in &containers {
        println!("  {} ({})", container.name, container.state);
    }

    let prompt = format!("Remove {} container(s) with their images and proxy routes?", containers.len());
    if !args.yes && !TerminalConfirm.confirm(&prompt, false)? {
        print_warning("Nothing removed");
        return Ok(());
    }

    let loggers = LoggerFactory::new();
    let mut removed = 0;
    let mut failed = 0;
    for container in &containers {
        let logger = loggers.get(&container.name);
        match remove_container(state.runtime.as_ref(), container).await {
            Ok(()) => {
                removed += 1;
                logger.succeed("removed");
            }
            Err(e) => {
                failed += 1;
                logger.fail(&e.to_string());
            }
        }
    }

    let mut resources: BTreeSet<String> = state.stack.resources.iter().map(|(name, _)| name.clone()).collect();
    resources.extend(
        containers
            .iter()
            .filter_map(|c| parse_container_name(&c.name, stack))
            .map(|(name, _)| name),
    );
    let proxies = ProxyReconciler::new(state.service.clone());
    for resource in &resources {
        let subdomain = full_name(resource, stack);
        if let Err(e) = proxies.remove(&subdomain).await {
            warn!("Could not remove proxy route {}: {}", subdomain, e);
        }
    }

    if failed > 0 {
        print_error(&format!("Removed {}, failed {}", removed, failed));
        return Err(PilotError::RuntimeError(format!("{} container(s) could not be removed", failed)));
    }
    print_success(&format!("Removed {} container(s) of {}", removed, stack));
    Ok(())
}
