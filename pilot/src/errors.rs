//! Error types for stackpilot

use thiserror::Error;

/// Main error type for stackpilot
#[derive(Error, Debug)]
pub enum PilotError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Container runtime error: {0}")]
    RuntimeError(String),

    /// The runtime answered 304: the container is already in the requested state
    #[error("Not modified: {0}")]
    NotModified(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Pre-deploy hook failed: {0}")]
    PreDeployError(String),

    #[error("Build error: {0}")]
    BuildError(String),

    #[error("Start error: {0}")]
    StartError(String),

    #[error("Template error: {0}")]
    TemplateError(String),

    #[error("Service error: {0}")]
    ServiceError(String),

    #[error("Management service unreachable: {0}")]
    ServiceUnavailable(String),

    #[error("Deployment failed: {0}")]
    DeploymentFailed(String),

    #[error("Prompt error: {0}")]
    PromptError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<bollard::errors::Error> for PilotError {
    fn from(err: bollard::errors::Error) -> Self {
        match err {
            bollard::errors::Error::DockerResponseServerError {
                status_code: 304,
                message,
            } => PilotError::NotModified(message),
            bollard::errors::Error::DockerResponseServerError {
                status_code: 404,
                message,
            } => PilotError::NotFound(message),
            other => PilotError::RuntimeError(other.to_string()),
        }
    }
}

impl From<dialoguer::Error> for PilotError {
    fn from(err: dialoguer::Error) -> Self {
        PilotError::PromptError(err.to_string())
    }
}

impl From<anyhow::Error> for PilotError {
    fn from(err: anyhow::Error) -> Self {
        PilotError::Internal(err.to_string())
    }
}

impl PilotError {
    /// Whether the error is a configuration problem detected before any side effect
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            PilotError::ConfigError(_) | PilotError::YamlError(_) | PilotError::TemplateError(_)
        )
    }

    /// Whether the error means the container engine could not be reached at all
    pub fn is_connection_refused(&self) -> bool {
        match self {
            PilotError::RuntimeError(msg) => {
                let msg = msg.to_lowercase();
                msg.contains("connection refused") || msg.contains("os error 111")
            }
            PilotError::IoError(e) => e.kind() == std::io::ErrorKind::ConnectionRefused,
            _ => false,
        }
    }
}
