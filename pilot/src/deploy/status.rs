//! Deployment record writer
//!
//! Every status change of every resource goes through one [`StatusReporter`].
//! The record lock is held across the state-machine check, the in-memory
//! update and the full-record write to the store, so concurrent pipelines
//! never overwrite each other's updates.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::deploy::fsm::{StatusEvent, StatusFsm};
use crate::errors::PilotError;
use crate::http::deployments::DeploymentStore;
use crate::models::deployment::{Deployment, DeploymentStatus, DeploymentUpdate, ResourceRecord, ResourceStatus};
use crate::models::resource::Resource;

struct Record {
    deployment: Deployment,
    machines: HashMap<String, StatusFsm>,
}

/// Single writer of one deployment record
pub struct StatusReporter {
    store: Arc<dyn DeploymentStore>,
    record: Mutex<Record>,
}

impl StatusReporter {
    pub fn new(store: Arc<dyn DeploymentStore>, deployment: Deployment) -> Self {
        let machines = deployment
            .resources
            .iter()
            .map(|r| (r.name.clone(), StatusFsm::from_state(r.status)))
            .collect();
        Self {
            store,
            record: Mutex::new(Record { deployment, machines }),
        }
    }

    /// Apply `event` to `resource`, copying its version and extra into the record
    pub async fn report(&self, resource: &Resource, event: StatusEvent) -> Result<ResourceStatus, PilotError> {
        let version = resource.version.to_string();
        let extra = resource.extra.clone();
        self.apply(&resource.name, event, move |entry| {
            entry.version = version;
            entry.extra = extra;
        })
        .await
    }

    /// Mark a resource as rolling back towards `target`
    pub async fn rollback(&self, name: &str, target: &str) -> Result<ResourceStatus, PilotError> {
        let target = target.to_string();
        self.apply(name, StatusEvent::Rollback, move |entry| {
            entry.extra.rollback_target = Some(target);
        })
        .await
    }

    /// Mark a resource as failed without a stage error of its own
    pub async fn fail(&self, name: &str, reason: &str) -> Result<ResourceStatus, PilotError> {
        self.apply(name, StatusEvent::Fail(reason.to_string()), |_| {}).await
    }

    async fn apply<F>(&self, name: &str, event: StatusEvent, update: F) -> Result<ResourceStatus, PilotError>
    where
        F: FnOnce(&mut ResourceRecord),
    {
        let mut record = self.record.lock().await;
        let Record { deployment, machines } = &mut *record;

        let machine = machines.get_mut(name).ok_or_else(|| {
            PilotError::Internal(format!("resource '{}' is not part of deployment {}", name, deployment.id))
        })?;
        let status = machine
            .process(&event)
            .map_err(|e| PilotError::Internal(format!("{}: {}", name, e)))?;

        if let Some(entry) = deployment.resources.iter_mut().find(|r| r.name == name) {
            update(entry);
            entry.status = status;
            if let Some(line) = event.log_line() {
                entry.task_log.push(line.to_string());
            }
        }
        debug!("{} -> {}", name, status);

        let update = DeploymentUpdate {
            stack_name: deployment.stack_name.clone(),
            id: deployment.id.clone(),
            status: None,
            resources: Some(deployment.resources.clone()),
        };
        self.store.update(&update).await?;
        Ok(status)
    }

    /// Write the final deployment status along with every resource
    pub async fn finish(&self, status: DeploymentStatus) -> Result<Deployment, PilotError> {
        let mut record = self.record.lock().await;
        record.deployment.status = status;

        let update = DeploymentUpdate {
            stack_name: record.deployment.stack_name.clone(),
            id: record.deployment.id.clone(),
            status: Some(status),
            resources: Some(record.deployment.resources.clone()),
        };
        if let Err(e) = self.store.update(&update).await {
            warn!("Unable to record final status of deployment {}: {}", record.deployment.id, e);
            return Err(e);
        }
        Ok(record.deployment.clone())
    }

    /// Current state of the record
    pub async fn snapshot(&self) -> Deployment {
        self.record.lock().await.deployment.clone()
    }
}
