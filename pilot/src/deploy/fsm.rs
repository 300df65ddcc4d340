//! Finite state machine for resource status within a deployment

use crate::models::deployment::ResourceStatus;

/// Status event applied to a resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    /// A pipeline stage started or finished; carries its task-log line
    Progress(Option<String>),

    /// Pipeline finished
    Succeed,

    /// A stage failed for a reason attributable to the resource
    Error(String),

    /// The resource was aborted without a stage error of its own
    Fail(String),

    /// Compensation started
    Rollback,

    /// Not targeted by this deployment
    Skip,
}

impl StatusEvent {
    /// Status reached by applying the event
    pub fn target(&self) -> ResourceStatus {
        match self {
            StatusEvent::Progress(_) => ResourceStatus::Processing,
            StatusEvent::Succeed => ResourceStatus::Success,
            StatusEvent::Error(_) => ResourceStatus::Error,
            StatusEvent::Fail(_) => ResourceStatus::Failed,
            StatusEvent::Rollback => ResourceStatus::Rollback,
            StatusEvent::Skip => ResourceStatus::Skipped,
        }
    }

    /// Task-log line carried by the event
    pub fn log_line(&self) -> Option<&str> {
        match self {
            StatusEvent::Progress(line) => line.as_deref(),
            StatusEvent::Error(line) | StatusEvent::Fail(line) => Some(line),
            _ => None,
        }
    }
}

/// Resource status FSM
#[derive(Debug, Clone)]
pub struct StatusFsm {
    state: ResourceStatus,
    error: Option<String>,
}

impl StatusFsm {
    /// Create a new FSM in pending state
    pub fn new() -> Self {
        Self::from_state(ResourceStatus::Pending)
    }

    /// Resume an FSM from a recorded status
    pub fn from_state(state: ResourceStatus) -> Self {
        Self { state, error: None }
    }

    /// Get current state
    pub fn state(&self) -> ResourceStatus {
        self.state
    }

    /// Get error message if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: &StatusEvent) -> Result<ResourceStatus, String> {
        use ResourceStatus::*;

        let new_state = match (self.state, event) {
            // Entering the pipeline, and re-entering once per stage
            (Pending | Processing, StatusEvent::Progress(_)) => Processing,

            (Processing, StatusEvent::Succeed) => Success,

            (Pending | Processing, StatusEvent::Error(err)) => {
                self.error = Some(err.clone());
                Error
            }
            (Pending | Processing, StatusEvent::Fail(err)) => {
                self.error = Some(err.clone());
                Failed
            }

            // Compensation may start from any targeted state and may be re-run
            (Pending | Processing | Success | Error | Failed | Rollback, StatusEvent::Rollback) => {
                Rollback
            }

            (Pending, StatusEvent::Skip) => Skipped,

            // Invalid transitions
            (state, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", state, event));
            }
        };

        self.state = new_state;
        Ok(new_state)
    }

    /// Whether the resource ended in a failure state
    pub fn is_failed(&self) -> bool {
        matches!(self.state, ResourceStatus::Error | ResourceStatus::Failed)
    }
}

impl Default for StatusFsm {
    fn default() -> Self {
        Self::new()
    }
}
