//! Compensating actions run when a deployment fails

use std::sync::Mutex;

use futures::future::BoxFuture;
use tracing::{error, info};

use crate::errors::PilotError;

/// A no-argument compensating action, safe to run more than once
pub type RollbackAction = Box<dyn Fn() -> BoxFuture<'static, Result<(), PilotError>> + Send + Sync>;

struct Entry {
    label: String,
    action: RollbackAction,
}

/// Append-only stack of rollback actions shared by every pipeline of a deployment
#[derive(Default)]
pub struct RollbackCoordinator {
    actions: Mutex<Vec<Entry>>,
}

impl RollbackCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an action; it stays registered for the whole deployment
    pub fn push(&self, label: impl Into<String>, action: RollbackAction) {
        let label = label.into();
        match self.actions.lock() {
            Ok(mut actions) => actions.push(Entry { label, action }),
            Err(poisoned) => poisoned.into_inner().push(Entry { label, action }),
        }
    }

    pub fn len(&self) -> usize {
        match self.actions.lock() {
            Ok(actions) => actions.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run every registered action in reverse push order.
    ///
    /// A failing action is logged and the rest still run. Returns the number
    /// of failed actions.
    pub async fn run(&self) -> usize {
        // Build the futures under the lock, await them without it
        let pending: Vec<(String, BoxFuture<'static, Result<(), PilotError>>)> = {
            let actions = match self.actions.lock() {
                Ok(actions) => actions,
                Err(poisoned) => poisoned.into_inner(),
            };
            actions
                .iter()
                .rev()
                .map(|entry| (entry.label.clone(), (entry.action)()))
                .collect()
        };

        let mut failures = 0;
        for (label, future) in pending {
            info!("Rolling back {}", label);
            if let Err(e) = future.await {
                failures += 1;
                error!("Rollback of {} failed: {}", label, e);
            }
        }
        failures
    }
}
