//! Proxy route reconciliation

use std::fmt;
use std::sync::Arc;

use openapi_client::models::{ProxyEntry, ProxyRequest};
use tracing::{debug, info};

use crate::errors::PilotError;
use crate::http::proxies::ProxyRegistry;

/// What a reconcile did to the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyChange {
    Created,
    Updated,
    Unchanged,
}

impl fmt::Display for ProxyChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProxyChange::Created => "added",
            ProxyChange::Updated => "updated",
            ProxyChange::Unchanged => "unchanged",
        })
    }
}

/// Result of reconciling one route
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyOutcome {
    pub change: ProxyChange,

    /// Public URL of the route, when the registrar reports one
    pub url: Option<String>,
}

/// Brings the registrar in line with the desired subdomain routes
#[derive(Clone)]
pub struct ProxyReconciler {
    registry: Arc<dyn ProxyRegistry>,
}

impl ProxyReconciler {
    pub fn new(registry: Arc<dyn ProxyRegistry>) -> Self {
        Self { registry }
    }

    async fn lookup(&self, subdomain: &str) -> Result<Vec<ProxyEntry>, PilotError> {
        let entries = self.registry.find(subdomain).await?;
        Ok(entries.into_iter().filter(|e| e.subdomain == subdomain).collect())
    }

    /// Route `subdomain` to `target`: create, update or leave the entry alone
    pub async fn reconcile(&self, subdomain: &str, target: &str) -> Result<ProxyOutcome, PilotError> {
        let request = ProxyRequest {
            subdomain: subdomain.to_string(),
            target: target.to_string(),
        };

        let existing = self.lookup(subdomain).await?;
        let (change, returned) = match existing.first() {
            None => (ProxyChange::Created, self.registry.create(&request).await?),
            Some(entry) if entry.target == target => (ProxyChange::Unchanged, Some(entry.clone())),
            Some(entry) => (ProxyChange::Updated, self.registry.update(&entry.id, &request).await?),
        };

        let url = match returned.and_then(|e| e.url) {
            Some(url) => Some(url),
            None if change != ProxyChange::Unchanged => {
                self.lookup(subdomain).await?.into_iter().find_map(|e| e.url)
            }
            None => None,
        };

        info!("Proxy {} -> {} {}", subdomain, target, change);
        Ok(ProxyOutcome { change, url })
    }

    /// Delete every entry of `subdomain`; returns how many were deleted
    pub async fn remove(&self, subdomain: &str) -> Result<usize, PilotError> {
        let entries = self.lookup(subdomain).await?;
        for entry in &entries {
            debug!("Deleting proxy entry {} ({})", entry.id, entry.subdomain);
            self.registry.delete(&entry.id).await?;
        }
        Ok(entries.len())
    }
}
