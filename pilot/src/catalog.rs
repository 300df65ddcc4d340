//! Resource catalog: resolves a stack file into deployable resources

use tracing::debug;

use crate::errors::PilotError;
use crate::models::deployment::ResourceStatus;
use crate::models::resource::{Resource, ResourceExtra, ResourceFolders};
use crate::storage::layout::ProjectLayout;
use crate::storage::stack::StackFile;
use crate::templates::TemplateRegistry;

/// Fully merged resources of one stack, in declaration order
#[derive(Debug, Clone)]
pub struct Catalog {
    pub stack: String,
    pub resources: Vec<Resource>,
}

impl Catalog {
    /// Resolve every resource of `stack`.
    ///
    /// Templates are looked up and validated here so configuration problems
    /// surface before anything is deployed.
    pub fn resolve(
        stack: &StackFile,
        layout: &ProjectLayout,
        templates: &TemplateRegistry,
    ) -> Result<Self, PilotError> {
        let mut resources = Vec::with_capacity(stack.resources.len());

        for (name, config) in &stack.resources {
            let template = templates.get(&config.template)?;

            let mut environment = stack.environment.clone();
            environment.extend(config.environment.clone());

            let code = match &config.code_uri {
                Some(uri) => layout.root.join(uri),
                None => layout.root.clone(),
            };

            let resource = Resource {
                name: name.clone(),
                stack: stack.name.clone(),
                template: config.template.clone(),
                handler: config.handler.clone(),
                description: config.description.clone(),
                spec: config.spec.clone(),
                environment,
                props: config.props.clone(),
                pre_deploy: config.pre_deploy.clone(),
                proxy: config.proxy,
                folders: ResourceFolders {
                    project: layout.root.clone(),
                    code: template.copies_code().then_some(code),
                    deploy: layout.deploy_dir(name).path().to_path_buf(),
                },
                version: 0,
                status: ResourceStatus::Pending,
                extra: ResourceExtra::default(),
                previous_name: None,
            };
            template.validate(&resource)?;

            debug!("Resolved resource {} ({})", resource.full_name(), resource.template);
            resources.push(resource);
        }

        Ok(Self {
            stack: stack.name.clone(),
            resources,
        })
    }

    pub fn names(&self) -> Vec<&str> {
        self.resources.iter().map(|r| r.name.as_str()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.name == name)
    }

    /// Check a user-selected subset; unknown names are a configuration error
    pub fn check_selection(&self, selected: &[String]) -> Result<(), PilotError> {
        let unknown: Vec<&str> = selected
            .iter()
            .filter(|name| self.get(name.as_str()).is_none())
            .map(String::as_str)
            .collect();
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(PilotError::ConfigError(format!(
                "unknown resource(s) in stack '{}': {}",
                self.stack,
                unknown.join(", ")
            )))
        }
    }
}
