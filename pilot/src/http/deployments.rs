//! Deployment state store

use async_trait::async_trait;
use tracing::info;

use crate::errors::PilotError;
use crate::http::client::HttpClient;
use crate::models::deployment::{Deployment, DeploymentUpdate, NewDeployment};

/// Persists deployment records
#[async_trait]
pub trait DeploymentStore: Send + Sync {
    /// Whether the store is reachable
    async fn is_healthy(&self) -> bool;

    /// Latest deployment of `stack`, if any
    async fn last(&self, stack: &str) -> Result<Option<Deployment>, PilotError>;

    /// Create a deployment record; the store assigns its id
    async fn create(&self, stack: &str, deployment: &NewDeployment) -> Result<Deployment, PilotError>;

    /// Merge fields into an existing record
    async fn update(&self, update: &DeploymentUpdate) -> Result<(), PilotError>;
}

#[async_trait]
impl DeploymentStore for HttpClient {
    async fn is_healthy(&self) -> bool {
        self.health().await
    }

    async fn last(&self, stack: &str) -> Result<Option<Deployment>, PilotError> {
        let path = format!("/api/deploy/{}?last", stack);
        self.get(&path).await
    }

    async fn create(&self, stack: &str, deployment: &NewDeployment) -> Result<Deployment, PilotError> {
        let path = format!("/api/deploy/{}", stack);
        let created: Option<Deployment> = self.post(&path, deployment).await?;
        let created = created.ok_or_else(|| {
            PilotError::ServiceError(format!("deployment store returned no record for stack '{}'", stack))
        })?;
        info!("Created deployment {} for stack {}", created.id, stack);
        Ok(created)
    }

    async fn update(&self, update: &DeploymentUpdate) -> Result<(), PilotError> {
        let path = format!("/api/deploy/{}/{}", update.stack_name, update.id);
        let _: Option<serde_json::Value> = self.put(&path, update).await?;
        Ok(())
    }
}
