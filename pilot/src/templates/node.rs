//! Node.js function handler wrapped in an HTTP server

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::errors::PilotError;
use crate::filesys::dir::Dir;
use crate::models::resource::Resource;
use crate::templates::{default_port_env, render_wrapper, split_handler, Template};

const WRAPPER: &str = include_str!("../../assets/wrappers/node-handler.js");

const WRAPPER_FILE: &str = "serverless-wrapper.js";

const DOCKERFILE: &str = r#"FROM node:22-alpine
WORKDIR /app
COPY app/package*.json ./
RUN npm install --production
COPY app .
EXPOSE {port}
CMD ["node", "serverless-wrapper.js"]
"#;

pub struct NodeTemplate;

#[async_trait]
impl Template for NodeTemplate {
    fn name(&self) -> &'static str {
        "node22"
    }

    fn default_port(&self) -> Option<u16> {
        Some(80)
    }

    fn dockerfile(&self) -> &'static str {
        DOCKERFILE
    }

    fn validate(&self, resource: &Resource) -> Result<(), PilotError> {
        split_handler(resource, "index.handler").map(|_| ())
    }

    async fn prepare(&self, resource: &mut Resource) -> Result<(), PilotError> {
        let (file, function) = split_handler(resource, "index.handler")?;
        let port = self.container_port(resource);
        default_port_env(resource, port);

        let deploy = Dir::new(&resource.folders.deploy);
        let package_file = deploy.file("package.json");

        // Keep the project's own name, version and dependencies
        let mut package = json!({
            "name": resource.name,
            "version": format!("{}.0.0", resource.version),
            "dependencies": {},
        });
        if package_file.exists().await {
            let local: Value = serde_json::from_str(&package_file.read_string().await?)?;
            for key in ["name", "version", "dependencies"] {
                if let Some(value) = local.get(key) {
                    package[key] = value.clone();
                }
            }
        }
        package["main"] = json!(WRAPPER_FILE);

        package_file
            .write_string(&serde_json::to_string_pretty(&package)?)
            .await?;
        deploy
            .file(WRAPPER_FILE)
            .write_string(&render_wrapper(WRAPPER, &file, &function))
            .await
    }
}
