//! Desired-vs-recorded resource diff with interactive rename reconciliation

use std::collections::{BTreeMap, HashMap, HashSet};

use colored::Colorize;
use tracing::{debug, info};

use crate::errors::PilotError;
use crate::models::deployment::{Deployment, ResourceRecord};

/// Yes/no questions asked before anything is deployed
pub trait Confirm: Send + Sync {
    fn confirm(&self, prompt: &str, default: bool) -> Result<bool, PilotError>;
}

/// Prompts on the terminal
pub struct TerminalConfirm;

impl Confirm for TerminalConfirm {
    fn confirm(&self, prompt: &str, default: bool) -> Result<bool, PilotError> {
        let answer = dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(default)
            .interact()?;
        Ok(answer)
    }
}

/// Answers every question with its default
pub struct AssumeDefaults;

impl Confirm for AssumeDefaults {
    fn confirm(&self, prompt: &str, default: bool) -> Result<bool, PilotError> {
        debug!("{} -> {}", prompt, default);
        Ok(default)
    }
}

/// Outcome of comparing the catalog with the last deployment
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    /// Last known record of each current resource, keyed by its current name
    pub history: HashMap<String, ResourceRecord>,

    /// New name to old name
    pub renames: BTreeMap<String, String>,

    /// Recorded resources gone from the catalog and not renamed
    pub removed: Vec<ResourceRecord>,

    /// Whether the user agreed to delete the removed resources
    pub remove_confirmed: bool,
}

impl Reconciliation {
    /// Recorded version of a current resource, 0 when it has no history
    pub fn last_version(&self, name: &str) -> u64 {
        self.history.get(name).map(|r| r.version_number()).unwrap_or(0)
    }
}

/// Compare `current` (catalog order) with the last deployment and ask about
/// renames and removals.
///
/// Each new name is offered every still-unmapped missing name in record order
/// until one is accepted. Missing names left over are removals, confirmed
/// as one batch.
pub fn reconcile(
    current: &[&str],
    last: Option<&Deployment>,
    confirm: &dyn Confirm,
) -> Result<Reconciliation, PilotError> {
    let records: Vec<ResourceRecord> = last.map(|d| d.resources.clone()).unwrap_or_default();
    let current_set: HashSet<&str> = current.iter().copied().collect();
    let recorded: HashSet<&str> = records.iter().map(|r| r.name.as_str()).collect();

    let new: Vec<&str> = current
        .iter()
        .copied()
        .filter(|name| !recorded.contains(name))
        .collect();

    let mut missing: Vec<ResourceRecord> = Vec::new();
    let mut history = HashMap::new();
    for record in &records {
        if current_set.contains(record.name.as_str()) {
            history.insert(record.name.clone(), record.clone());
        } else {
            missing.push(record.clone());
        }
    }

    let mut renames = BTreeMap::new();
    if !missing.is_empty() && !new.is_empty() {
        println!("{}", "Resource names changed since the last deployment.".yellow());

        for name in &new {
            let mut accepted = None;
            for (index, old) in missing.iter().enumerate() {
                let prompt = format!("Is '{}' a rename of '{}'?", name, old.name);
                if confirm.confirm(&prompt, false)? {
                    accepted = Some(index);
                    break;
                }
            }

            if let Some(index) = accepted {
                let old = missing.remove(index);
                info!("Treating {} as a rename of {}", name, old.name);
                renames.insert(name.to_string(), old.name.clone());
                history.insert(
                    name.to_string(),
                    ResourceRecord {
                        name: name.to_string(),
                        ..old
                    },
                );
            }
            if missing.is_empty() {
                break;
            }
        }
    }

    let remove_confirmed = if missing.is_empty() {
        false
    } else {
        let names: Vec<&str> = missing.iter().map(|r| r.name.as_str()).collect();
        let prompt = format!(
            "Resources removed from the stack: {}. Delete their containers, images and proxy routes?",
            names.join(", ")
        );
        confirm.confirm(&prompt, true)?
    };

    Ok(Reconciliation {
        history,
        renames,
        removed: missing,
        remove_confirmed,
    })
}
