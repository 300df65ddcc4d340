//! Image build, container start and retention of old versions

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::console::ResourceLogger;
use crate::deploy::context;
use crate::errors::PilotError;
use crate::models::resource::Resource;
use crate::runtime::{
    BuildRequest, ContainerFilter, ContainerRuntime, ContainerSpec, ContainerSummary, PortMapping, MANAGED_LABEL,
    STACK_LABEL,
};
use crate::templates::Template;

/// Label grouping containers the way compose does
const COMPOSE_PROJECT_LABEL: &str = "com.docker.compose.project";

const CPU_PERIOD: i64 = 100_000;

const DEFAULT_RESTART_POLICY: &str = "unless-stopped";

/// What a cleanup pass did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanupReport {
    /// Containers stopped before sorting
    pub stopped: usize,

    /// Names of the containers kept
    pub kept: Vec<String>,

    /// Names of the containers removed
    pub removed: Vec<String>,
}

/// Labels set on every image and container of a stack
pub fn management_labels(stack: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(MANAGED_LABEL.to_string(), "true".to_string());
    labels.insert(STACK_LABEL.to_string(), stack.to_string());
    labels.insert(COMPOSE_PROJECT_LABEL.to_string(), stack.to_string());
    labels
}

/// Whether a container belongs to any of `prefixes`
fn matches_prefix(container: &ContainerSummary, prefixes: &[String]) -> bool {
    prefixes.iter().any(|p| container.name.starts_with(p.as_str()))
}

/// Container creation settings for a resource, plus the networks to connect
/// after creation.
pub fn container_spec(
    resource: &Resource,
    template: &dyn Template,
    image: &str,
    proxy_network: &str,
) -> (ContainerSpec, Vec<String>) {
    let mut environment = resource.environment.clone();
    if let Some(port) = resource.spec.port {
        environment
            .entry("PORT".to_string())
            .or_insert_with(|| port.to_string());
    }
    let env = environment
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect();

    let port = match (template.container_port(resource), resource.spec.port) {
        (Some(container_port), Some(host_port)) => Some(PortMapping {
            container_port,
            host_port,
        }),
        _ => None,
    };

    let mut labels = resource.spec.labels.clone();
    labels.extend(management_labels(&resource.stack));

    let binds = template
        .volume()
        .map(|volume| vec![volume.replace("{volumeName}", &format!("{}-{}", resource.stack, resource.name))])
        .unwrap_or_default();

    let (cpu_period, cpu_quota) = match resource.spec.cpus {
        Some(cpus) if cpus > 0.0 => (Some(CPU_PERIOD), Some((cpus * CPU_PERIOD as f64) as i64)),
        _ => (None, None),
    };
    let memory = resource
        .spec
        .memory
        .filter(|mb| *mb > 0.0)
        .map(|mb| (mb * 1024.0 * 1024.0) as i64);

    let cmd = resource
        .spec
        .cmd
        .as_deref()
        .map(|cmd| cmd.split_whitespace().map(str::to_string).collect::<Vec<_>>())
        .filter(|parts| !parts.is_empty());

    let mut networks: Vec<String> = Vec::new();
    let wanted = resource
        .spec
        .networks
        .iter()
        .cloned()
        .chain(resource.proxy.then(|| proxy_network.to_string()));
    for network in wanted {
        if !network.is_empty() && !networks.contains(&network) {
            networks.push(network);
        }
    }
    let network_mode = if networks.is_empty() {
        None
    } else {
        Some(networks.remove(0))
    };

    let spec = ContainerSpec {
        name: resource.container_name(),
        image: image.to_string(),
        env,
        hostname: Some(resource.hostname()),
        port,
        labels,
        binds,
        network_mode,
        cpu_period,
        cpu_quota,
        memory,
        restart_policy: resource
            .spec
            .restart
            .clone()
            .unwrap_or_else(|| DEFAULT_RESTART_POLICY.to_string()),
        extra_hosts: resource.spec.add_host.clone(),
        cmd,
    };
    (spec, networks)
}

/// Builds images and manages the containers of a stack
#[derive(Clone)]
pub struct ImageManager {
    runtime: Arc<dyn ContainerRuntime>,
    proxy_network: String,
}

impl ImageManager {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, proxy_network: impl Into<String>) -> Self {
        Self {
            runtime,
            proxy_network: proxy_network.into(),
        }
    }

    pub fn proxy_network(&self) -> &str {
        &self.proxy_network
    }

    /// Build the image of a prepared resource and return its tag
    pub async fn build(
        &self,
        resource: &Resource,
        template: &dyn Template,
        logger: &ResourceLogger,
    ) -> Result<String, PilotError> {
        let dockerfile = context::render_dockerfile(template.dockerfile(), resource, template.container_port(resource));
        let archive = context::write_and_pack(&resource.folders.deploy, &dockerfile).await?;
        let tag = resource.image_name();
        debug!("Build context for {} is {} bytes", tag, archive.len());

        let request = BuildRequest {
            tag: tag.clone(),
            dockerfile: context::DOCKERFILE.to_string(),
            labels: management_labels(&resource.stack),
            no_cache: true,
            force_rm: true,
        };
        let events = self.runtime.build_image(&request, archive).await.map_err(|e| match e {
            PilotError::BuildError(msg) => PilotError::BuildError(msg),
            other => PilotError::BuildError(other.to_string()),
        })?;

        if let Some(error) = events.iter().find_map(|e| e.error.clone()) {
            for line in events.iter().filter_map(|e| e.stream.as_deref()) {
                let line = line.trim_end();
                if !line.is_empty() {
                    logger.line(line);
                }
            }
            return Err(PilotError::BuildError(error.trim().to_string()));
        }

        info!("Built image {}", tag);
        Ok(tag)
    }

    async fn ensure_network(&self, network: &str) -> Result<(), PilotError> {
        if !self.runtime.network_exists(network).await? {
            info!("Creating network {}", network);
            self.runtime.create_network(network).await?;
        }
        Ok(())
    }

    /// Create and start the container of `resource` from `image`; sets `extra.hostname`
    pub async fn start(&self, resource: &mut Resource, template: &dyn Template, image: &str) -> Result<String, PilotError> {
        let (spec, extra_networks) = container_spec(resource, template, image, &self.proxy_network);

        let start_error = |e: PilotError| PilotError::StartError(e.to_string());
        for network in spec.network_mode.iter().chain(extra_networks.iter()) {
            self.ensure_network(network).await.map_err(start_error)?;
        }

        let id = self.runtime.create_container(&spec).await.map_err(start_error)?;
        for network in &extra_networks {
            self.runtime.connect_network(network, &id).await.map_err(start_error)?;
        }
        self.runtime.start_container(&id).await.map_err(start_error)?;

        resource.extra.hostname = spec.hostname.clone();
        info!("Started container {}", spec.name);
        Ok(id)
    }

    /// Stack containers whose name starts with any of `prefixes`
    async fn matching(&self, stack: &str, prefixes: &[String]) -> Result<Vec<ContainerSummary>, PilotError> {
        let containers = self.runtime.list_containers(&ContainerFilter::stack(stack)).await?;
        Ok(containers
            .into_iter()
            .filter(|c| matches_prefix(c, prefixes))
            .collect())
    }

    /// Newest running container matching `prefixes`
    pub async fn find_running(&self, stack: &str, prefixes: &[String]) -> Result<Option<ContainerSummary>, PilotError> {
        let containers = self.matching(stack, prefixes).await?;
        Ok(containers
            .into_iter()
            .filter(ContainerSummary::is_running)
            .max_by_key(|c| c.created))
    }

    /// Stop every matching container and keep only the newest `keep`.
    ///
    /// Image removal is best effort. With `keep == 0` every matching
    /// container is removed.
    pub async fn clean(&self, stack: &str, prefixes: &[String], keep: usize) -> Result<CleanupReport, PilotError> {
        let mut containers = self.matching(stack, prefixes).await?;
        let mut report = CleanupReport::default();

        for container in containers.iter().filter(|c| c.is_running()) {
            match self.runtime.stop_container(&container.id).await {
                Ok(()) => report.stopped += 1,
                Err(PilotError::NotModified(_)) => {}
                Err(e) => return Err(e),
            }
        }

        containers.sort_by(|a, b| b.created.cmp(&a.created));
        let retired = if containers.len() > keep {
            containers.split_off(keep)
        } else {
            Vec::new()
        };
        report.kept = containers.into_iter().map(|c| c.name).collect();

        for container in retired {
            debug!("Removing container {}", container.name);
            match self.runtime.remove_container(&container.id, true).await {
                Ok(()) | Err(PilotError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
            if !container.image.is_empty() {
                if let Err(e) = self.runtime.remove_image(&container.image, true).await {
                    warn!("Could not remove image {}: {}", container.image, e);
                }
            }
            report.removed.push(container.name);
        }

        Ok(report)
    }
}
