//! Build-context generators, one per template kind
//!
//! A template writes the files its Dockerfile expects into the resource's
//! deploy folder. Task templates run once on the deploying machine instead
//! of producing an image.

pub mod mongodb;
pub mod nginx;
pub mod node;
pub mod python;
pub mod script;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::PilotError;
use crate::models::resource::Resource;

/// How a template's resource is deployed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    /// Built into an image and run as a long-lived container
    Service,

    /// Run once; no image, no container
    Task,
}

#[async_trait]
pub trait Template: Send + Sync {
    fn name(&self) -> &'static str;

    fn kind(&self) -> TemplateKind {
        TemplateKind::Service
    }

    /// Port the process listens on when the resource sets none
    fn default_port(&self) -> Option<u16> {
        None
    }

    /// Port the process listens on inside the container
    fn container_port(&self, resource: &Resource) -> Option<u16> {
        resource.spec.port.or(self.default_port())
    }

    /// Dockerfile with `{handler}`, `{port}` and `{imageName}` placeholders
    fn dockerfile(&self) -> &'static str {
        ""
    }

    /// Volume bind with a `{volumeName}` placeholder
    fn volume(&self) -> Option<&'static str> {
        None
    }

    /// Whether the resource's code tree is copied into the build context
    fn copies_code(&self) -> bool {
        true
    }

    /// Configuration checks run before anything is deployed
    fn validate(&self, _resource: &Resource) -> Result<(), PilotError> {
        Ok(())
    }

    /// Write generated files into the deploy folder and fill in defaults
    async fn prepare(&self, resource: &mut Resource) -> Result<(), PilotError>;

    /// Run a task resource, returning its output
    async fn run_task(&self, _resource: &Resource) -> Result<String, PilotError> {
        Err(PilotError::TemplateError(format!(
            "template '{}' is not a task",
            self.name()
        )))
    }
}

/// Templates known to the engine, by name
#[derive(Clone)]
pub struct TemplateRegistry {
    templates: BTreeMap<&'static str, Arc<dyn Template>>,
}

impl TemplateRegistry {
    /// A registry without any template
    pub fn empty() -> Self {
        Self {
            templates: BTreeMap::new(),
        }
    }

    /// Registry holding every built-in template
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(nginx::NginxTemplate));
        registry.register(Arc::new(node::NodeTemplate));
        registry.register(Arc::new(python::PythonTemplate));
        registry.register(Arc::new(mongodb::MongoTemplate));
        registry.register(Arc::new(script::ScriptTemplate));
        registry
    }

    pub fn register(&mut self, template: Arc<dyn Template>) {
        self.templates.insert(template.name(), template);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Template>, PilotError> {
        self.templates.get(name).cloned().ok_or_else(|| {
            PilotError::TemplateError(format!(
                "unknown template '{}', available: {}",
                name,
                self.names().join(", ")
            ))
        })
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.templates.keys().copied().collect()
    }
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Split a `file.function` handler
pub(crate) fn split_handler(resource: &Resource, example: &str) -> Result<(String, String), PilotError> {
    let handler = resource.handler.as_deref().unwrap_or_default();
    match handler.rsplit_once('.') {
        Some((file, function)) if !file.is_empty() && !function.is_empty() => {
            Ok((file.to_string(), function.to_string()))
        }
        _ => Err(PilotError::ConfigError(format!(
            "resource '{}' needs a handler of the form 'file.function' (e.g. {}), got '{}'",
            resource.name, example, handler
        ))),
    }
}

/// Fill a handler wrapper script
pub(crate) fn render_wrapper(source: &str, file: &str, function: &str) -> String {
    source
        .replace("{{FILENAME}}", file)
        .replace("{{HANDLER_NAME}}", function)
}

/// Default `PORT` to the container port
pub(crate) fn default_port_env(resource: &mut Resource, port: Option<u16>) {
    if let Some(port) = port {
        resource
            .environment
            .entry("PORT".to_string())
            .or_insert_with(|| port.to_string());
    }
}
