//! `pilot deploy`

use std::sync::Arc;

use tracing::info;

use crate::app::state::AppState;
use crate::catalog::Catalog;
use crate::cli::DeployArgs;
use crate::console::print_success;
use crate::deploy::bootstrap::ensure_service;
use crate::deploy::diff::{AssumeDefaults, Confirm, TerminalConfirm};
use crate::deploy::orchestrator::{DeploySettings, Deployer};
use crate::deploy::proxy::ProxyReconciler;
use crate::errors::PilotError;
use crate::templates::TemplateRegistry;

pub async fn execute(state: &AppState, args: &DeployArgs) -> Result<(), PilotError> {
    let templates = TemplateRegistry::builtin();
    let catalog = Catalog::resolve(&state.stack, &state.layout, &templates)?;
    catalog.check_selection(&args.resources)?;

    ensure_service(
        &state.options.bootstrap,
        state.service.as_ref(),
        state.runtime.as_ref(),
        &state.profile.service,
        tokio::time::sleep,
    )
    .await?;

    let confirm: Arc<dyn Confirm> = if args.yes {
        Arc::new(AssumeDefaults)
    } else {
        Arc::new(TerminalConfirm)
    };
    let settings = DeploySettings {
        keep: state.profile.keep(),
        proxy_network: state.profile.service.network().to_string(),
    };
    info!("Deploying {} (keep {})", catalog.stack, settings.keep);

    let deployer = Deployer::new(
        state.runtime.clone(),
        state.service.clone(),
        ProxyReconciler::new(state.service.clone()),
        confirm,
    )
    .with_templates(templates)
    .with_settings(settings);

    let outcome = deployer.deploy(catalog, &args.resources).await?;
    if !outcome.succeeded() {
        return Err(PilotError::DeploymentFailed(format!(
            "{} failed, changes rolled back",
            outcome.failed.join(", ")
        )));
    }

    print_success(&format!("Deployed {}", outcome.deployment.stack_name));
    Ok(())
}
