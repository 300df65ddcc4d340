//! Deployment models

use std::fmt;

use openapi_client::models::string_or_number;
use serde::{Deserialize, Serialize};

use crate::models::resource::ResourceExtra;

/// Status of one resource within a deployment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResourceStatus {
    #[default]
    Pending,
    Processing,
    Success,
    Error,
    Failed,
    Skipped,
    Rollback,
}

impl ResourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceStatus::Pending => "PENDING",
            ResourceStatus::Processing => "PROCESSING",
            ResourceStatus::Success => "SUCCESS",
            ResourceStatus::Error => "ERROR",
            ResourceStatus::Failed => "FAILED",
            ResourceStatus::Skipped => "SKIPPED",
            ResourceStatus::Rollback => "ROLLBACK",
        }
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a whole deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeploymentStatus {
    Processing,
    Success,
    Failed,
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeploymentStatus::Processing => "PROCESSING",
            DeploymentStatus::Success => "SUCCESS",
            DeploymentStatus::Failed => "FAILED",
        })
    }
}

/// One resource entry of a deployment record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub name: String,

    #[serde(deserialize_with = "string_or_number", default)]
    pub version: String,

    #[serde(default)]
    pub status: ResourceStatus,

    #[serde(default)]
    pub extra: ResourceExtra,

    #[serde(rename = "taskLog", default, skip_serializing_if = "Vec::is_empty")]
    pub task_log: Vec<String>,
}

impl ResourceRecord {
    /// Recorded version as a number, 0 when absent or malformed
    pub fn version_number(&self) -> u64 {
        self.version.trim().parse().unwrap_or(0)
    }
}

/// A deployment record held by the state store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,

    #[serde(rename = "stackName", default)]
    pub stack_name: String,

    pub status: DeploymentStatus,

    #[serde(rename = "createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,

    #[serde(default)]
    pub resources: Vec<ResourceRecord>,
}

impl Deployment {
    pub fn resource(&self, name: &str) -> Option<&ResourceRecord> {
        self.resources.iter().find(|r| r.name == name)
    }
}

/// Body of a deployment creation request
#[derive(Debug, Clone, Serialize)]
pub struct NewDeployment {
    pub status: DeploymentStatus,
    pub resources: Vec<ResourceRecord>,
}

/// Body of a deployment update request; absent fields are left untouched
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentUpdate {
    #[serde(rename = "stackName")]
    pub stack_name: String,

    pub id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<DeploymentStatus>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<Vec<ResourceRecord>>,
}
