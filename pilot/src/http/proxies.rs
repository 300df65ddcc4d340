//! Proxy registrar

use async_trait::async_trait;
use openapi_client::models::{ProxyEntry, ProxyRequest};
use serde::Deserialize;

use crate::errors::PilotError;
use crate::http::client::HttpClient;

/// Subdomain to target routing entries
#[async_trait]
pub trait ProxyRegistry: Send + Sync {
    /// Entries registered for `subdomain`
    async fn find(&self, subdomain: &str) -> Result<Vec<ProxyEntry>, PilotError>;

    async fn create(&self, request: &ProxyRequest) -> Result<Option<ProxyEntry>, PilotError>;

    async fn update(&self, id: &str, request: &ProxyRequest) -> Result<Option<ProxyEntry>, PilotError>;

    async fn delete(&self, id: &str) -> Result<(), PilotError>;
}

/// The lookup answers either one entry or a list
#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    Many(Vec<ProxyEntry>),
    One(ProxyEntry),
}

#[async_trait]
impl ProxyRegistry for HttpClient {
    async fn find(&self, subdomain: &str) -> Result<Vec<ProxyEntry>, PilotError> {
        let found: Option<OneOrMany> = self
            .get_with_query("/api/proxy", &[("subdomain", subdomain)])
            .await?;
        Ok(match found {
            None => Vec::new(),
            Some(OneOrMany::One(entry)) => vec![entry],
            Some(OneOrMany::Many(entries)) => entries,
        })
    }

    async fn create(&self, request: &ProxyRequest) -> Result<Option<ProxyEntry>, PilotError> {
        self.post("/api/proxy", request).await
    }

    async fn update(&self, id: &str, request: &ProxyRequest) -> Result<Option<ProxyEntry>, PilotError> {
        let path = format!("/api/proxy/{}", id);
        self.put(&path, request).await
    }

    async fn delete(&self, id: &str) -> Result<(), PilotError> {
        let path = format!("/api/proxy/{}", id);
        HttpClient::delete(self, &path).await
    }
}
