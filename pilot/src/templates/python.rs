//! Python function handler served through Flask

use async_trait::async_trait;

use crate::errors::PilotError;
use crate::filesys::dir::Dir;
use crate::models::resource::Resource;
use crate::templates::{default_port_env, render_wrapper, split_handler, Template};

const WRAPPER: &str = include_str!("../../assets/wrappers/python-handler.py");

const FLASK_REQUIREMENT: &str = "Flask==3.0.0";

const DOCKERFILE: &str = r#"FROM python:3.11-slim
WORKDIR /app
COPY app/requirements.txt ./
RUN pip install --no-cache-dir -r requirements.txt
COPY app .
EXPOSE {port}
CMD ["python", "serverless_wrapper.py"]
"#;

pub struct PythonTemplate;

#[async_trait]
impl Template for PythonTemplate {
    fn name(&self) -> &'static str {
        "python311"
    }

    fn default_port(&self) -> Option<u16> {
        Some(80)
    }

    fn dockerfile(&self) -> &'static str {
        DOCKERFILE
    }

    fn validate(&self, resource: &Resource) -> Result<(), PilotError> {
        split_handler(resource, "main.handler").map(|_| ())
    }

    async fn prepare(&self, resource: &mut Resource) -> Result<(), PilotError> {
        let (file, function) = split_handler(resource, "main.handler")?;
        let port = self.container_port(resource);
        default_port_env(resource, port);

        let deploy = Dir::new(&resource.folders.deploy);
        let requirements_file = deploy.file("requirements.txt");
        let mut requirements = if requirements_file.exists().await {
            requirements_file.read_string().await?
        } else {
            String::new()
        };
        if !requirements.to_lowercase().contains("flask") {
            if !requirements.is_empty() && !requirements.ends_with('\n') {
                requirements.push('\n');
            }
            requirements.push_str(FLASK_REQUIREMENT);
            requirements.push('\n');
        }
        requirements_file.write_string(&requirements).await?;

        deploy
            .file("serverless_wrapper.py")
            .write_string(&render_wrapper(WRAPPER, &file.replace('/', "."), &function))
            .await
    }
}
