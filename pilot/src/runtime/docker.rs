//! Docker Engine runtime

use std::collections::HashMap;

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, LogOutput, LogsOptions, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions,
};
use bollard::image::{BuildImageOptions, RemoveImageOptions};
use bollard::models::{
    ContainerSummary as DockerContainer, EndpointSettings, HostConfig, PortBinding, RestartPolicy,
    RestartPolicyNameEnum,
};
use bollard::network::{ConnectNetworkOptions, CreateNetworkOptions, ListNetworksOptions};
use bollard::{Docker, API_DEFAULT_VERSION};
use bytes::Bytes;
use futures::StreamExt;
use tracing::debug;

use crate::errors::PilotError;
use crate::runtime::{
    BuildEvent, BuildRequest, ContainerFilter, ContainerRuntime, ContainerSpec, ContainerSummary, LogChunk,
    LogStream,
};

/// Request timeout for engine calls, in seconds
const CLIENT_TIMEOUT_SECS: u64 = 120;

/// Default port of a plain-HTTP Docker endpoint
const DEFAULT_DOCKER_PORT: u16 = 2375;

/// Seconds the engine waits before killing a container on stop
const STOP_TIMEOUT_SECS: i64 = 10;

/// Where the container engine lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeEndpoint {
    /// Platform default socket or named pipe
    Local,

    /// Unix socket path
    Socket(String),

    /// `http://host:port`
    Http(String),
}

impl RuntimeEndpoint {
    /// Resolve the endpoint from a profile host/port pair
    pub fn from_profile(host: Option<&str>, port: Option<u16>) -> Result<Self, PilotError> {
        let host = match host.map(str::trim) {
            None | Some("") => return Ok(RuntimeEndpoint::Local),
            Some(host) => host,
        };

        if let Some(path) = host.strip_prefix("unix://") {
            return Ok(RuntimeEndpoint::Socket(path.to_string()));
        }
        if host.starts_with("ssh://") {
            return Err(PilotError::ConfigError(format!(
                "ssh endpoints are not supported, expose the engine over tcp instead: {}",
                host
            )));
        }

        let address = host
            .strip_prefix("tcp://")
            .or_else(|| host.strip_prefix("http://"))
            .unwrap_or(host);
        if address.contains(':') {
            Ok(RuntimeEndpoint::Http(format!("http://{}", address)))
        } else {
            Ok(RuntimeEndpoint::Http(format!(
                "http://{}:{}",
                address,
                port.unwrap_or(DEFAULT_DOCKER_PORT)
            )))
        }
    }
}

impl std::fmt::Display for RuntimeEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuntimeEndpoint::Local => write!(f, "local"),
            RuntimeEndpoint::Socket(path) => write!(f, "unix://{}", path),
            RuntimeEndpoint::Http(addr) => write!(f, "{}", addr),
        }
    }
}

/// Container runtime backed by the Docker Engine API
pub struct DockerRuntime {
    docker: Docker,
    endpoint: RuntimeEndpoint,
}

impl DockerRuntime {
    /// Connect to the engine. No request is made until the first call.
    pub fn connect(endpoint: RuntimeEndpoint) -> Result<Self, PilotError> {
        let docker = match &endpoint {
            RuntimeEndpoint::Local => Docker::connect_with_local_defaults()?,
            #[cfg(unix)]
            RuntimeEndpoint::Socket(path) => Docker::connect_with_unix(path, CLIENT_TIMEOUT_SECS, API_DEFAULT_VERSION)?,
            #[cfg(not(unix))]
            RuntimeEndpoint::Socket(path) => {
                return Err(PilotError::ConfigError(format!(
                    "unix sockets are not available on this platform: {}",
                    path
                )))
            }
            RuntimeEndpoint::Http(addr) => Docker::connect_with_http(addr, CLIENT_TIMEOUT_SECS, API_DEFAULT_VERSION)?,
        };
        debug!("Container runtime endpoint: {}", endpoint);
        Ok(Self { docker, endpoint })
    }
}

fn summary_from(container: DockerContainer) -> ContainerSummary {
    let name = container
        .names
        .as_ref()
        .and_then(|names| names.first())
        .map(|n| n.trim_start_matches('/').to_string())
        .unwrap_or_default();
    let networks = container
        .network_settings
        .and_then(|settings| settings.networks)
        .map(|networks| {
            let mut names: Vec<String> = networks.into_keys().collect();
            names.sort();
            names
        })
        .unwrap_or_default();

    ContainerSummary {
        id: container.id.unwrap_or_default(),
        name,
        image: container.image.unwrap_or_default(),
        state: container.state.unwrap_or_default(),
        status: container.status.unwrap_or_default(),
        created: container.created.unwrap_or_default(),
        labels: container.labels.unwrap_or_default().into_iter().collect(),
        networks,
    }
}

fn restart_policy_name(name: &str) -> RestartPolicyNameEnum {
    match name {
        "no" => RestartPolicyNameEnum::NO,
        "always" => RestartPolicyNameEnum::ALWAYS,
        "on-failure" => RestartPolicyNameEnum::ON_FAILURE,
        "" => RestartPolicyNameEnum::EMPTY,
        _ => RestartPolicyNameEnum::UNLESS_STOPPED,
    }
}

fn chunk_from(output: LogOutput) -> LogChunk {
    match output {
        LogOutput::StdErr { message } => LogChunk::Stderr(message.to_vec()),
        LogOutput::StdOut { message } | LogOutput::Console { message } | LogOutput::StdIn { message } => {
            LogChunk::Stdout(message.to_vec())
        }
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    fn endpoint(&self) -> String {
        self.endpoint.to_string()
    }

    async fn list_containers(&self, filter: &ContainerFilter) -> Result<Vec<ContainerSummary>, PilotError> {
        let mut filters: HashMap<String, Vec<String>> = HashMap::new();
        if let Some(prefix) = &filter.name_prefix {
            filters.insert("name".to_string(), vec![format!("^/{}", prefix)]);
        }
        let labels: Vec<String> = filter
            .labels
            .iter()
            .map(|(key, value)| match value {
                Some(value) => format!("{}={}", key, value),
                None => key.clone(),
            })
            .collect();
        if !labels.is_empty() {
            filters.insert("label".to_string(), labels);
        }

        let options = ListContainersOptions {
            all: filter.all,
            filters,
            ..Default::default()
        };
        let containers = self.docker.list_containers(Some(options)).await?;

        // The engine's name filter is a regex; re-check the literal prefix
        Ok(containers
            .into_iter()
            .map(summary_from)
            .filter(|c| filter.matches(c))
            .collect())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, PilotError> {
        let mut exposed_ports: HashMap<String, HashMap<(), ()>> = HashMap::new();
        let mut port_bindings = HashMap::new();
        if let Some(port) = spec.port {
            let key = format!("{}/tcp", port.container_port);
            exposed_ports.insert(key.clone(), HashMap::new());
            port_bindings.insert(
                key,
                Some(vec![PortBinding {
                    host_ip: None,
                    host_port: Some(port.host_port.to_string()),
                }]),
            );
        }

        let host_config = HostConfig {
            binds: (!spec.binds.is_empty()).then(|| spec.binds.clone()),
            port_bindings: Some(port_bindings),
            restart_policy: Some(RestartPolicy {
                name: Some(restart_policy_name(&spec.restart_policy)),
                maximum_retry_count: None,
            }),
            cpu_period: spec.cpu_period,
            cpu_quota: spec.cpu_quota,
            memory: spec.memory,
            extra_hosts: (!spec.extra_hosts.is_empty()).then(|| spec.extra_hosts.clone()),
            network_mode: spec.network_mode.clone(),
            ..Default::default()
        };

        let config = Config::<String> {
            image: Some(spec.image.clone()),
            env: Some(spec.env.clone()),
            hostname: spec.hostname.clone(),
            exposed_ports: Some(exposed_ports),
            labels: Some(spec.labels.clone().into_iter().collect()),
            host_config: Some(host_config),
            cmd: spec.cmd.clone(),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };
        let response = self.docker.create_container(Some(options), config).await?;
        Ok(response.id)
    }

    async fn start_container(&self, id_or_name: &str) -> Result<(), PilotError> {
        self.docker
            .start_container(id_or_name, None::<StartContainerOptions<String>>)
            .await?;
        Ok(())
    }

    async fn stop_container(&self, id_or_name: &str) -> Result<(), PilotError> {
        self.docker
            .stop_container(id_or_name, Some(StopContainerOptions { t: STOP_TIMEOUT_SECS }))
            .await?;
        Ok(())
    }

    async fn remove_container(&self, id_or_name: &str, force: bool) -> Result<(), PilotError> {
        let options = RemoveContainerOptions {
            force,
            ..Default::default()
        };
        self.docker.remove_container(id_or_name, Some(options)).await?;
        Ok(())
    }

    async fn remove_image(&self, image: &str, force: bool) -> Result<(), PilotError> {
        let options = RemoveImageOptions {
            force,
            ..Default::default()
        };
        self.docker.remove_image(image, Some(options), None).await?;
        Ok(())
    }

    async fn network_exists(&self, name: &str) -> Result<bool, PilotError> {
        let mut filters = HashMap::new();
        filters.insert("name", vec![name]);
        let networks = self
            .docker
            .list_networks(Some(ListNetworksOptions { filters }))
            .await?;
        Ok(networks.iter().any(|n| n.name.as_deref() == Some(name)))
    }

    async fn create_network(&self, name: &str) -> Result<(), PilotError> {
        let options = CreateNetworkOptions {
            name: name.to_string(),
            ..Default::default()
        };
        self.docker.create_network(options).await?;
        Ok(())
    }

    async fn connect_network(&self, network: &str, container_id: &str) -> Result<(), PilotError> {
        let options = ConnectNetworkOptions {
            container: container_id.to_string(),
            endpoint_config: EndpointSettings::default(),
        };
        self.docker.connect_network(network, options).await?;
        Ok(())
    }

    async fn build_image(&self, request: &BuildRequest, context: Vec<u8>) -> Result<Vec<BuildEvent>, PilotError> {
        let options = BuildImageOptions {
            dockerfile: request.dockerfile.clone(),
            t: request.tag.clone(),
            nocache: request.no_cache,
            forcerm: request.force_rm,
            rm: true,
            labels: request.labels.clone().into_iter().collect(),
            ..Default::default()
        };

        let mut stream = Box::pin(self.docker.build_image(options, None, Some(Bytes::from(context))));
        let mut events = Vec::new();
        while let Some(item) = stream.next().await {
            match item {
                Ok(info) => {
                    let error = info
                        .error
                        .or_else(|| info.error_detail.and_then(|detail| detail.message));
                    events.push(BuildEvent {
                        stream: info.stream,
                        error,
                    });
                }
                Err(e) => {
                    events.push(BuildEvent::failure(e.to_string()));
                    break;
                }
            }
        }
        Ok(events)
    }

    async fn logs(&self, id_or_name: &str, tail: usize) -> Result<Vec<LogChunk>, PilotError> {
        let options = LogsOptions::<String> {
            follow: false,
            stdout: true,
            stderr: true,
            tail: tail.to_string(),
            ..Default::default()
        };
        let mut stream = Box::pin(self.docker.logs(id_or_name, Some(options)));
        let mut chunks = Vec::new();
        while let Some(item) = stream.next().await {
            chunks.push(chunk_from(item?));
        }
        Ok(chunks)
    }

    fn follow_logs(&self, id_or_name: &str, tail: usize) -> LogStream {
        let options = LogsOptions::<String> {
            follow: true,
            stdout: true,
            stderr: true,
            tail: tail.to_string(),
            ..Default::default()
        };
        self.docker
            .logs(id_or_name, Some(options))
            .map(|item| item.map(chunk_from).map_err(PilotError::from))
            .boxed()
    }
}
