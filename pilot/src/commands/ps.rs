//! `pilot ps`

use std::collections::HashMap;

use chrono::DateTime;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};
use tracing::warn;

use crate::app::state::AppState;
use crate::cli::PsArgs;
use crate::console::print_warning;
use crate::deploy::version::parse_container_name;
use crate::errors::PilotError;
use crate::http::deployments::DeploymentStore;
use crate::runtime::{ContainerFilter, ContainerSummary};

#[derive(Tabled)]
struct ContainerRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Image")]
    image: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Created")]
    created: String,
    #[tabled(rename = "Networks")]
    networks: String,
    #[tabled(rename = "Proxy URL")]
    proxy_url: String,
}

fn format_created(created: i64) -> String {
    DateTime::from_timestamp(created, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Render stack containers; `proxy_urls` maps resource names to their route
pub fn container_table(stack: &str, containers: &[ContainerSummary], proxy_urls: &HashMap<String, String>) -> String {
    let rows: Vec<ContainerRow> = containers
        .iter()
        .map(|c| {
            let url = parse_container_name(&c.name, stack)
                .and_then(|(resource, _)| proxy_urls.get(&resource).cloned())
                .unwrap_or_else(|| "-".to_string());
            ContainerRow {
                id: c.short_id().to_string(),
                name: c.name.clone(),
                image: c.image.clone(),
                state: c.state.clone(),
                status: c.status.clone(),
                created: format_created(c.created),
                networks: if c.networks.is_empty() {
                    "-".to_string()
                } else {
                    c.networks.join(", ")
                },
                proxy_url: url,
            }
        })
        .collect();
    Table::new(rows).with(Style::rounded()).to_string()
}

/// Proxy URLs of the last deployment, empty when the store cannot be read
async fn proxy_urls(store: &dyn DeploymentStore, stack: &str) -> HashMap<String, String> {
    match store.last(stack).await {
        Ok(Some(deployment)) => deployment
            .resources
            .into_iter()
            .filter_map(|r| r.extra.proxy_url.map(|url| (r.name, url)))
            .collect(),
        Ok(None) => HashMap::new(),
        Err(e) => {
            warn!("Could not read the last deployment of {}: {}", stack, e);
            HashMap::new()
        }
    }
}

pub async fn execute(state: &AppState, args: &PsArgs) -> Result<(), PilotError> {
    let stack = &state.stack.name;
    let mut containers: Vec<ContainerSummary> = state
        .runtime
        .list_containers(&ContainerFilter::stack(stack))
        .await?
        .into_iter()
        .filter(|c| args.all || c.is_running())
        .collect();

    if containers.is_empty() {
        print_warning(&format!("No containers found for stack {}", stack));
        return Ok(());
    }
    containers.sort_by(|a, b| a.name.cmp(&b.name));

    let urls = proxy_urls(state.service.as_ref(), stack).await;
    println!("{}", format!("Stack {}", stack).bold());
    println!("{}", container_table(stack, &containers, &urls));
    Ok(())
}
