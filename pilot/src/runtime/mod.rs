//! Container runtime capability interface
//!
//! Everything the engine does against the container engine goes through
//! [`ContainerRuntime`]. [`docker::DockerRuntime`] is the production
//! implementation; tests drive the engine with in-memory runtimes.

pub mod docker;

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::errors::PilotError;

/// Label set on every container and image managed by stackpilot
pub const MANAGED_LABEL: &str = "stackpilot.managed";

/// Label holding the owning stack name
pub const STACK_LABEL: &str = "stack";

/// A container as reported by the runtime
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerSummary {
    pub id: String,

    /// Primary name, without the leading `/`
    pub name: String,

    pub image: String,

    /// Lifecycle state (`running`, `exited`, `created`, ...)
    pub state: String,

    /// Human readable status (`Up 3 minutes`)
    pub status: String,

    /// Creation time, seconds since the epoch
    pub created: i64,

    pub labels: BTreeMap<String, String>,

    pub networks: Vec<String>,
}

impl ContainerSummary {
    pub fn is_running(&self) -> bool {
        self.state == "running"
    }

    pub fn short_id(&self) -> &str {
        &self.id[..self.id.len().min(12)]
    }

    pub fn has_label(&self, key: &str, value: Option<&str>) -> bool {
        match (self.labels.get(key), value) {
            (Some(found), Some(expected)) => found == expected,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }
}

/// Container listing filter
#[derive(Debug, Clone, Default)]
pub struct ContainerFilter {
    /// Include stopped containers
    pub all: bool,

    /// Only containers whose name starts with this prefix
    pub name_prefix: Option<String>,

    /// Only containers carrying these labels (`None` value matches any value)
    pub labels: Vec<(String, Option<String>)>,
}

impl ContainerFilter {
    /// Every container, running or not, managed for `stack`
    pub fn stack(stack: &str) -> Self {
        Self {
            all: true,
            name_prefix: None,
            labels: vec![
                (MANAGED_LABEL.to_string(), None),
                (STACK_LABEL.to_string(), Some(stack.to_string())),
            ],
        }
    }

    /// Every container whose name starts with `prefix`, managed or not
    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self {
            all: true,
            name_prefix: Some(prefix.into()),
            labels: Vec::new(),
        }
    }

    /// Whether a container passes this filter
    pub fn matches(&self, container: &ContainerSummary) -> bool {
        if !self.all && !container.is_running() {
            return false;
        }
        if let Some(prefix) = &self.name_prefix {
            if !container.name.starts_with(prefix.as_str()) {
                return false;
            }
        }
        self.labels
            .iter()
            .all(|(key, value)| container.has_label(key, value.as_deref()))
    }
}

/// Published port mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMapping {
    pub container_port: u16,
    pub host_port: u16,
}

/// Everything needed to create a container
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub env: Vec<String>,
    pub hostname: Option<String>,
    pub port: Option<PortMapping>,
    pub labels: BTreeMap<String, String>,
    pub binds: Vec<String>,
    pub network_mode: Option<String>,
    pub cpu_period: Option<i64>,
    pub cpu_quota: Option<i64>,
    pub memory: Option<i64>,
    pub restart_policy: String,
    pub extra_hosts: Vec<String>,
    pub cmd: Option<Vec<String>>,
}

/// Image build request
#[derive(Debug, Clone, Default)]
pub struct BuildRequest {
    /// Tag of the resulting image
    pub tag: String,
    pub dockerfile: String,
    pub labels: BTreeMap<String, String>,
    pub no_cache: bool,
    pub force_rm: bool,
}

/// One progress entry of an image build
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildEvent {
    pub stream: Option<String>,
    pub error: Option<String>,
}

impl BuildEvent {
    pub fn progress(line: impl Into<String>) -> Self {
        Self {
            stream: Some(line.into()),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            stream: None,
            error: Some(error.into()),
        }
    }
}

/// A chunk of demultiplexed container output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogChunk {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
}

/// Stream of live container output
pub type LogStream = BoxStream<'static, Result<LogChunk, PilotError>>;

/// Container engine capabilities used by the engine
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Endpoint description for messages
    fn endpoint(&self) -> String;

    async fn list_containers(&self, filter: &ContainerFilter) -> Result<Vec<ContainerSummary>, PilotError>;

    /// Create a container and return its id
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, PilotError>;

    /// Start a container; an already running one yields [`PilotError::NotModified`]
    async fn start_container(&self, id_or_name: &str) -> Result<(), PilotError>;

    /// Stop a container; an already stopped one yields [`PilotError::NotModified`]
    async fn stop_container(&self, id_or_name: &str) -> Result<(), PilotError>;

    async fn remove_container(&self, id_or_name: &str, force: bool) -> Result<(), PilotError>;

    async fn remove_image(&self, image: &str, force: bool) -> Result<(), PilotError>;

    /// Whether a network with exactly this name exists
    async fn network_exists(&self, name: &str) -> Result<bool, PilotError>;

    async fn create_network(&self, name: &str) -> Result<(), PilotError>;

    async fn connect_network(&self, network: &str, container_id: &str) -> Result<(), PilotError>;

    /// Build an image from a tar archive, returning every progress entry
    async fn build_image(&self, request: &BuildRequest, context: Vec<u8>) -> Result<Vec<BuildEvent>, PilotError>;

    /// Captured output, bounded to the last `tail` lines
    async fn logs(&self, id_or_name: &str, tail: usize) -> Result<Vec<LogChunk>, PilotError>;

    /// Live output starting from the last `tail` lines
    fn follow_logs(&self, id_or_name: &str, tail: usize) -> LogStream;
}
