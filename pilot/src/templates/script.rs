//! One-shot command run on the deploying machine

use async_trait::async_trait;
use tracing::info;

use crate::deploy::hooks::run_shell;
use crate::errors::PilotError;
use crate::models::resource::Resource;
use crate::templates::{Template, TemplateKind};

pub struct ScriptTemplate;

impl ScriptTemplate {
    /// `props.command`, else the handler
    fn command(resource: &Resource) -> Option<&str> {
        resource
            .prop("command")
            .or(resource.handler.as_deref())
            .filter(|c| !c.trim().is_empty())
    }
}

#[async_trait]
impl Template for ScriptTemplate {
    fn name(&self) -> &'static str {
        "script"
    }

    fn kind(&self) -> TemplateKind {
        TemplateKind::Task
    }

    fn copies_code(&self) -> bool {
        false
    }

    fn validate(&self, resource: &Resource) -> Result<(), PilotError> {
        match Self::command(resource) {
            Some(_) => Ok(()),
            None => Err(PilotError::ConfigError(format!(
                "task '{}' needs a command (props.command or handler)",
                resource.name
            ))),
        }
    }

    async fn prepare(&self, _resource: &mut Resource) -> Result<(), PilotError> {
        Ok(())
    }

    async fn run_task(&self, resource: &Resource) -> Result<String, PilotError> {
        self.validate(resource)?;
        let command = Self::command(resource).unwrap_or_default();
        let cwd = resource
            .folders
            .code
            .as_deref()
            .unwrap_or(&resource.folders.project);

        info!("Running task {}: {}", resource.name, command);
        let output = run_shell(command, cwd, &resource.environment).await?;
        if !output.success {
            return Err(PilotError::TemplateError(format!(
                "task '{}' failed: {}",
                resource.name,
                output.combined()
            )));
        }
        Ok(output.combined())
    }
}
