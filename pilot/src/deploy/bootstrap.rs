//! Management service bootstrap
//!
//! When the deployment store does not answer its health check and the
//! profile names a service image, the service container is started on the
//! proxy network and polled until it becomes ready.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::errors::PilotError;
use crate::http::deployments::DeploymentStore;
use crate::runtime::{ContainerFilter, ContainerRuntime, ContainerSpec, PortMapping, MANAGED_LABEL};
use crate::storage::profiles::ServiceSettings;

/// Bootstrap options
#[derive(Debug, Clone)]
pub struct Options {
    /// Readiness checks after starting the service
    pub attempts: u32,

    /// Delay between readiness checks
    pub interval: Duration,

    /// Name of the service container
    pub container_name: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            attempts: 3,
            interval: Duration::from_secs(5),
            container_name: "stackpilot-service".to_string(),
        }
    }
}

/// Make sure the management service answers, starting it when possible
pub async fn ensure_service<S, F>(
    options: &Options,
    store: &dyn DeploymentStore,
    runtime: &dyn ContainerRuntime,
    settings: &ServiceSettings,
    sleep_fn: S,
) -> Result<(), PilotError>
where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    if store.is_healthy().await {
        debug!("Management service is healthy");
        return Ok(());
    }

    let image = match settings.image.as_deref() {
        Some(image) if !image.trim().is_empty() => image,
        _ => {
            return Err(PilotError::ServiceUnavailable(
                "the management service is not reachable and the profile names no service image".to_string(),
            ))
        }
    };

    info!("Management service is down, starting {}", options.container_name);
    start_service(options, runtime, settings, image).await?;

    for attempt in 1..=options.attempts {
        sleep_fn(options.interval).await;
        if store.is_healthy().await {
            info!("Management service ready after {} check(s)", attempt);
            return Ok(());
        }
        warn!("Management service not ready ({}/{})", attempt, options.attempts);
    }

    Err(PilotError::ServiceUnavailable(format!(
        "{} did not become ready after {} checks",
        options.container_name, options.attempts
    )))
}

async fn start_service(
    options: &Options,
    runtime: &dyn ContainerRuntime,
    settings: &ServiceSettings,
    image: &str,
) -> Result<(), PilotError> {
    let network = settings.network();
    if !runtime.network_exists(network).await? {
        runtime.create_network(network).await?;
    }

    let existing = runtime
        .list_containers(&ContainerFilter::prefix(options.container_name.clone()))
        .await?
        .into_iter()
        .find(|c| c.name == options.container_name);

    let id = match existing {
        Some(container) if container.is_running() => return Ok(()),
        Some(container) => container.id,
        None => {
            let mut env = vec![format!("PORT={}", settings.port())];
            if let Some(proxy_host) = &settings.proxy_host {
                env.push(format!("PROXY_HOST={}", proxy_host));
            }
            let mut labels = BTreeMap::new();
            labels.insert(MANAGED_LABEL.to_string(), "true".to_string());

            let spec = ContainerSpec {
                name: options.container_name.clone(),
                image: image.to_string(),
                env,
                hostname: Some(options.container_name.clone()),
                port: Some(PortMapping {
                    container_port: settings.port(),
                    host_port: settings.port(),
                }),
                labels,
                network_mode: Some(network.to_string()),
                restart_policy: "unless-stopped".to_string(),
                ..Default::default()
            };
            runtime.create_container(&spec).await?
        }
    };

    match runtime.start_container(&id).await {
        Ok(()) | Err(PilotError::NotModified(_)) => Ok(()),
        Err(e) => Err(e),
    }
}
