//! MongoDB with a persistent volume

use async_trait::async_trait;
use tracing::warn;

use crate::errors::PilotError;
use crate::models::resource::Resource;
use crate::templates::Template;

const DOCKERFILE: &str = "FROM {imageName}\n";

const DEFAULT_IMAGE: &str = "mongo:latest";

const MONGO_PORT: u16 = 27017;

const USER_VAR: &str = "MONGO_INITDB_ROOT_USERNAME";
const PASSWORD_VAR: &str = "MONGO_INITDB_ROOT_PASSWORD";

pub struct MongoTemplate;

#[async_trait]
impl Template for MongoTemplate {
    fn name(&self) -> &'static str {
        "mongodb"
    }

    fn default_port(&self) -> Option<u16> {
        Some(MONGO_PORT)
    }

    /// mongod always listens on its own port; `spec.port` only picks the host side
    fn container_port(&self, _resource: &Resource) -> Option<u16> {
        Some(MONGO_PORT)
    }

    fn dockerfile(&self) -> &'static str {
        DOCKERFILE
    }

    fn volume(&self) -> Option<&'static str> {
        Some("{volumeName}:/data/db")
    }

    fn copies_code(&self) -> bool {
        false
    }

    async fn prepare(&self, resource: &mut Resource) -> Result<(), PilotError> {
        resource
            .environment
            .entry(USER_VAR.to_string())
            .or_insert_with(|| "root".to_string());

        if !resource.environment.contains_key(PASSWORD_VAR) {
            // Only applied by mongod when the volume is first initialized
            warn!(
                "{} has no {}; generating one. Set it in the stack file to keep it known.",
                resource.name, PASSWORD_VAR
            );
            resource
                .environment
                .insert(PASSWORD_VAR.to_string(), uuid::Uuid::new_v4().simple().to_string());
        }

        resource
            .props
            .entry("imageName".to_string())
            .or_insert_with(|| serde_json::json!(DEFAULT_IMAGE));
        Ok(())
    }
}
