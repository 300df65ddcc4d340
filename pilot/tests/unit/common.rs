//! In-memory fakes shared by the engine tests

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;

use openapi_client::models::{ProxyEntry, ProxyRequest};
use stackpilot::catalog::Catalog;
use stackpilot::deploy::diff::Confirm;
use stackpilot::errors::PilotError;
use stackpilot::http::deployments::DeploymentStore;
use stackpilot::http::proxies::ProxyRegistry;
use stackpilot::models::deployment::{
    Deployment, DeploymentStatus, DeploymentUpdate, NewDeployment, ResourceRecord, ResourceStatus,
};
use stackpilot::models::resource::{Resource, ResourceExtra};
use stackpilot::runtime::{
    BuildEvent, BuildRequest, ContainerFilter, ContainerRuntime, ContainerSpec, ContainerSummary, LogChunk,
    LogStream, MANAGED_LABEL, STACK_LABEL,
};
use stackpilot::storage::layout::ProjectLayout;
use stackpilot::storage::stack::StackFile;
use stackpilot::templates::{Template, TemplateRegistry};

// --- container runtime ---

#[derive(Default)]
struct RuntimeState {
    containers: Vec<ContainerSummary>,
    networks: BTreeSet<String>,
    images: BTreeSet<String>,
    removed_images: Vec<String>,
    clock: i64,
    next_id: u64,
    fail_build: HashSet<String>,
    fail_start: HashSet<String>,
    fail_stop: HashSet<String>,
    logs: BTreeMap<String, Vec<LogChunk>>,
    hang_follow: bool,
}

/// Container engine held in memory
#[derive(Default)]
pub struct FakeRuntime {
    state: Mutex<RuntimeState>,
}

impl FakeRuntime {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RuntimeState> {
        self.state.lock().unwrap()
    }

    /// Add a managed container of `stack`
    pub fn add_container(&self, name: &str, stack: &str, state: &str) -> String {
        let mut s = self.lock();
        s.clock += 1;
        s.next_id += 1;
        let id = format!("{:064x}", s.next_id);
        let mut labels = BTreeMap::new();
        labels.insert(MANAGED_LABEL.to_string(), "true".to_string());
        labels.insert(STACK_LABEL.to_string(), stack.to_string());
        let image = match name.rsplit_once('-') {
            Some((base, version)) => format!("{}:{}", base, version),
            None => name.to_string(),
        };
        let created = s.clock;
        s.containers.push(ContainerSummary {
            id: id.clone(),
            name: name.to_string(),
            image,
            state: state.to_string(),
            status: state.to_string(),
            created,
            labels,
            networks: Vec::new(),
        });
        id
    }

    /// Builds of images starting with `prefix` report an error
    pub fn fail_build_of(&self, prefix: &str) {
        self.lock().fail_build.insert(prefix.to_string());
    }

    /// Starting containers whose name starts with `prefix` fails
    pub fn fail_start_of(&self, prefix: &str) {
        self.lock().fail_start.insert(prefix.to_string());
    }

    /// Stopping containers whose name starts with `prefix` fails
    pub fn fail_stop_of(&self, prefix: &str) {
        self.lock().fail_stop.insert(prefix.to_string());
    }

    pub fn set_logs(&self, name: &str, chunks: Vec<LogChunk>) {
        self.lock().logs.insert(name.to_string(), chunks);
    }

    /// Live streams stay open after their output until shutdown
    pub fn hang_follow(&self) {
        self.lock().hang_follow = true;
    }

    pub fn containers(&self) -> Vec<ContainerSummary> {
        self.lock().containers.clone()
    }

    pub fn container(&self, name: &str) -> Option<ContainerSummary> {
        self.lock().containers.iter().find(|c| c.name == name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().containers.iter().map(|c| c.name.clone()).collect();
        names.sort();
        names
    }

    pub fn images(&self) -> BTreeSet<String> {
        self.lock().images.clone()
    }

    pub fn removed_images(&self) -> Vec<String> {
        self.lock().removed_images.clone()
    }

    pub fn has_network(&self, name: &str) -> bool {
        self.lock().networks.contains(name)
    }
}

fn find<'a>(containers: &'a mut [ContainerSummary], id_or_name: &str) -> Option<&'a mut ContainerSummary> {
    containers.iter_mut().find(|c| c.id == id_or_name || c.name == id_or_name)
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    fn endpoint(&self) -> String {
        "memory".to_string()
    }

    async fn list_containers(&self, filter: &ContainerFilter) -> Result<Vec<ContainerSummary>, PilotError> {
        Ok(self.lock().containers.iter().filter(|c| filter.matches(c)).cloned().collect())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, PilotError> {
        let mut s = self.lock();
        if s.containers.iter().any(|c| c.name == spec.name) {
            return Err(PilotError::RuntimeError(format!("name {} is already in use", spec.name)));
        }
        s.clock += 1;
        s.next_id += 1;
        let id = format!("{:064x}", s.next_id);
        let created = s.clock;
        s.containers.push(ContainerSummary {
            id: id.clone(),
            name: spec.name.clone(),
            image: spec.image.clone(),
            state: "created".to_string(),
            status: "Created".to_string(),
            created,
            labels: spec.labels.clone(),
            networks: spec.network_mode.iter().cloned().collect(),
        });
        Ok(id)
    }

    async fn start_container(&self, id_or_name: &str) -> Result<(), PilotError> {
        let mut s = self.lock();
        let failing: Vec<String> = s.fail_start.iter().cloned().collect();
        let container = find(&mut s.containers, id_or_name)
            .ok_or_else(|| PilotError::NotFound(format!("No such container: {}", id_or_name)))?;
        if failing.iter().any(|p| container.name.starts_with(p.as_str())) {
            return Err(PilotError::RuntimeError("port is already allocated".to_string()));
        }
        if container.is_running() {
            return Err(PilotError::NotModified("container already started".to_string()));
        }
        container.state = "running".to_string();
        container.status = "Up".to_string();
        Ok(())
    }

    async fn stop_container(&self, id_or_name: &str) -> Result<(), PilotError> {
        let mut s = self.lock();
        let fail_stop = s.fail_stop.clone();
        let container = find(&mut s.containers, id_or_name)
            .ok_or_else(|| PilotError::NotFound(format!("No such container: {}", id_or_name)))?;
        if !container.is_running() {
            return Err(PilotError::NotModified("container already stopped".to_string()));
        }
        if fail_stop.iter().any(|prefix| container.name.starts_with(prefix.as_str())) {
            return Err(PilotError::RuntimeError(format!("cannot stop {}", container.name)));
        }
        container.state = "exited".to_string();
        container.status = "Exited (0)".to_string();
        Ok(())
    }

    async fn remove_container(&self, id_or_name: &str, force: bool) -> Result<(), PilotError> {
        let mut s = self.lock();
        let index = s
            .containers
            .iter()
            .position(|c| c.id == id_or_name || c.name == id_or_name)
            .ok_or_else(|| PilotError::NotFound(format!("No such container: {}", id_or_name)))?;
        if s.containers[index].is_running() && !force {
            return Err(PilotError::RuntimeError("cannot remove a running container".to_string()));
        }
        s.containers.remove(index);
        Ok(())
    }

    async fn remove_image(&self, image: &str, _force: bool) -> Result<(), PilotError> {
        let mut s = self.lock();
        s.images.remove(image);
        s.removed_images.push(image.to_string());
        Ok(())
    }

    async fn network_exists(&self, name: &str) -> Result<bool, PilotError> {
        Ok(self.lock().networks.contains(name))
    }

    async fn create_network(&self, name: &str) -> Result<(), PilotError> {
        self.lock().networks.insert(name.to_string());
        Ok(())
    }

    async fn connect_network(&self, network: &str, container_id: &str) -> Result<(), PilotError> {
        let mut s = self.lock();
        let container = find(&mut s.containers, container_id)
            .ok_or_else(|| PilotError::NotFound(format!("No such container: {}", container_id)))?;
        container.networks.push(network.to_string());
        Ok(())
    }

    async fn build_image(&self, request: &BuildRequest, context: Vec<u8>) -> Result<Vec<BuildEvent>, PilotError> {
        assert!(!context.is_empty(), "empty build context");
        let mut s = self.lock();
        if s.fail_build.iter().any(|p| request.tag.starts_with(p.as_str())) {
            return Ok(vec![
                BuildEvent::progress("Step 1/2 : FROM scratch\n"),
                BuildEvent::failure("failed to solve: missing entry point"),
            ]);
        }
        s.images.insert(request.tag.clone());
        Ok(vec![BuildEvent::progress(format!("Successfully tagged {}\n", request.tag))])
    }

    async fn logs(&self, id_or_name: &str, tail: usize) -> Result<Vec<LogChunk>, PilotError> {
        let mut s = self.lock();
        let name = find(&mut s.containers, id_or_name)
            .map(|c| c.name.clone())
            .ok_or_else(|| PilotError::NotFound(format!("No such container: {}", id_or_name)))?;
        let chunks = s.logs.get(&name).cloned().unwrap_or_default();
        let skip = chunks.len().saturating_sub(tail);
        Ok(chunks.into_iter().skip(skip).collect())
    }

    fn follow_logs(&self, id_or_name: &str, _tail: usize) -> LogStream {
        let mut s = self.lock();
        let name = find(&mut s.containers, id_or_name).map(|c| c.name.clone()).unwrap_or_default();
        let chunks = s.logs.get(&name).cloned().unwrap_or_default();
        let output = futures::stream::iter(chunks.into_iter().map(Ok));
        if s.hang_follow {
            output.chain(futures::stream::pending()).boxed()
        } else {
            output.boxed()
        }
    }
}

// --- deployment store ---

/// Deployment store held in memory
#[derive(Default)]
pub struct MemoryStore {
    deployments: Mutex<Vec<Deployment>>,
    unhealthy_checks: AtomicUsize,
    down: AtomicBool,
    reject_status: AtomicBool,
    updates: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Seed a finished deployment with `(name, version, extra)` records
    pub fn seed(&self, stack: &str, records: &[(&str, &str, ResourceExtra)]) {
        let mut deployments = self.deployments.lock().unwrap();
        let id = (deployments.len() + 1).to_string();
        deployments.push(Deployment {
            id,
            stack_name: stack.to_string(),
            status: DeploymentStatus::Success,
            created_at: None,
            resources: records
                .iter()
                .map(|(name, version, extra)| ResourceRecord {
                    name: name.to_string(),
                    version: version.to_string(),
                    status: ResourceStatus::Success,
                    extra: extra.clone(),
                    task_log: Vec::new(),
                })
                .collect(),
        });
    }

    pub fn deployments(&self) -> Vec<Deployment> {
        self.deployments.lock().unwrap().clone()
    }

    pub fn latest(&self) -> Deployment {
        self.deployments.lock().unwrap().last().cloned().expect("no deployment recorded")
    }

    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    /// Health checks fail until `checks` more have been answered
    pub fn unhealthy_for(&self, checks: usize) {
        self.unhealthy_checks.store(checks, Ordering::SeqCst);
    }

    /// Health checks always fail
    pub fn take_down(&self) {
        self.down.store(true, Ordering::SeqCst);
    }

    /// Updates that set the deployment status fail; resource updates still land
    pub fn reject_status_updates(&self) {
        self.reject_status.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl DeploymentStore for MemoryStore {
    async fn is_healthy(&self) -> bool {
        if self.down.load(Ordering::SeqCst) {
            return false;
        }
        let remaining = self.unhealthy_checks.load(Ordering::SeqCst);
        if remaining > 0 {
            self.unhealthy_checks.store(remaining - 1, Ordering::SeqCst);
            return false;
        }
        true
    }

    async fn last(&self, stack: &str) -> Result<Option<Deployment>, PilotError> {
        Ok(self
            .deployments
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|d| d.stack_name == stack)
            .cloned())
    }

    async fn create(&self, stack: &str, deployment: &NewDeployment) -> Result<Deployment, PilotError> {
        let mut deployments = self.deployments.lock().unwrap();
        let created = Deployment {
            id: (deployments.len() + 1).to_string(),
            stack_name: stack.to_string(),
            status: deployment.status,
            created_at: None,
            resources: deployment.resources.clone(),
        };
        deployments.push(created.clone());
        Ok(created)
    }

    async fn update(&self, update: &DeploymentUpdate) -> Result<(), PilotError> {
        // Let other pipelines run between the caller's read and this write
        tokio::task::yield_now().await;

        if update.status.is_some() && self.reject_status.load(Ordering::SeqCst) {
            return Err(PilotError::ServiceError("status write rejected".to_string()));
        }
        let mut deployments = self.deployments.lock().unwrap();
        let deployment = deployments
            .iter_mut()
            .find(|d| d.id == update.id)
            .ok_or_else(|| PilotError::ServiceError(format!("no deployment {}", update.id)))?;
        if let Some(status) = update.status {
            deployment.status = status;
        }
        if let Some(resources) = &update.resources {
            deployment.resources = resources.clone();
        }
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// --- proxy registrar ---

/// Proxy registrar held in memory; lookups match substrings like the real service
#[derive(Default)]
pub struct MemoryProxies {
    entries: Mutex<Vec<ProxyEntry>>,
    next_id: AtomicUsize,
    pub creates: AtomicUsize,
    pub updates: AtomicUsize,
    pub deletes: AtomicUsize,
}

impl MemoryProxies {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, subdomain: &str, target: &str) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.entries.lock().unwrap().push(ProxyEntry {
            id: id.to_string(),
            subdomain: subdomain.to_string(),
            target: target.to_string(),
            url: Some(format!("https://{}.example.com", subdomain)),
        });
    }

    pub fn entries(&self) -> Vec<ProxyEntry> {
        self.entries.lock().unwrap().clone()
    }

    pub fn counts(&self) -> (usize, usize, usize) {
        (
            self.creates.load(Ordering::SeqCst),
            self.updates.load(Ordering::SeqCst),
            self.deletes.load(Ordering::SeqCst),
        )
    }
}

#[async_trait]
impl ProxyRegistry for MemoryProxies {
    async fn find(&self, subdomain: &str) -> Result<Vec<ProxyEntry>, PilotError> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.subdomain.contains(subdomain))
            .cloned()
            .collect())
    }

    async fn create(&self, request: &ProxyRequest) -> Result<Option<ProxyEntry>, PilotError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.insert(&request.subdomain, &request.target);
        Ok(self.entries.lock().unwrap().last().cloned())
    }

    async fn update(&self, id: &str, request: &ProxyRequest) -> Result<Option<ProxyEntry>, PilotError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        let mut entries = self.entries.lock().unwrap();
        let entry = entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| PilotError::ServiceError(format!("no proxy entry {}", id)))?;
        entry.subdomain = request.subdomain.clone();
        entry.target = request.target.clone();
        Ok(Some(entry.clone()))
    }

    async fn delete(&self, id: &str) -> Result<(), PilotError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.entries.lock().unwrap().retain(|e| e.id != id);
        Ok(())
    }
}

// --- prompts ---

/// Answers from a script, falling back to each question's default
#[derive(Default)]
pub struct ScriptedConfirm {
    answers: Mutex<VecDeque<bool>>,
    asked: Mutex<Vec<String>>,
}

impl ScriptedConfirm {
    pub fn new(answers: &[bool]) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(answers.iter().copied().collect()),
            asked: Mutex::new(Vec::new()),
        })
    }

    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().unwrap().clone()
    }
}

impl Confirm for ScriptedConfirm {
    fn confirm(&self, prompt: &str, default: bool) -> Result<bool, PilotError> {
        self.asked.lock().unwrap().push(prompt.to_string());
        Ok(self.answers.lock().unwrap().pop_front().unwrap_or(default))
    }
}

// --- templates ---

/// Service template that only needs a Dockerfile
pub struct StaticTemplate;

#[async_trait]
impl Template for StaticTemplate {
    fn name(&self) -> &'static str {
        "static"
    }

    fn dockerfile(&self) -> &'static str {
        "FROM scratch\nCOPY app/ /srv/\n"
    }

    fn copies_code(&self) -> bool {
        false
    }

    async fn prepare(&self, resource: &mut Resource) -> Result<(), PilotError> {
        tokio::fs::write(resource.folders.deploy.join("index.html"), resource.name.as_bytes()).await?;
        Ok(())
    }
}

/// Template whose preparation panics
pub struct ExplodingTemplate;

#[async_trait]
impl Template for ExplodingTemplate {
    fn name(&self) -> &'static str {
        "exploding"
    }

    fn copies_code(&self) -> bool {
        false
    }

    async fn prepare(&self, _resource: &mut Resource) -> Result<(), PilotError> {
        panic!("template exploded");
    }
}

/// Built-in templates plus the test ones
pub fn templates() -> TemplateRegistry {
    let mut registry = TemplateRegistry::builtin();
    registry.register(Arc::new(StaticTemplate));
    registry.register(Arc::new(ExplodingTemplate));
    registry
}

/// Resolve a stack file written in `root`
pub fn catalog(root: &Path, stack_yaml: &str) -> Catalog {
    let stack_file = root.join("stack.yaml");
    std::fs::write(&stack_file, stack_yaml).unwrap();
    let stack = StackFile::parse(stack_yaml).unwrap();
    Catalog::resolve(&stack, &ProjectLayout::for_stack_file(&stack_file), &templates()).unwrap()
}

/// A stack of `static` resources
pub fn static_stack(names: &[&str]) -> String {
    let mut yaml = String::from("name: shop\nresources:\n");
    for name in names {
        yaml.push_str(&format!("  {}:\n    template: static\n", name));
    }
    yaml
}

pub fn no_wait(_: Duration) -> std::future::Ready<()> {
    std::future::ready(())
}
