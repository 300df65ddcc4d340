//! HTTP client implementation

use openapi_client::models::{ApiResponse, HealthResponse};
use reqwest::{Client, RequestBuilder};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error};

use crate::errors::PilotError;

/// HTTP client for the management service
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    base_url: String,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new(base_url: &str) -> Result<Self, PilotError> {
        url::Url::parse(base_url)
            .map_err(|e| PilotError::ConfigError(format!("invalid service URL '{}': {}", base_url, e)))?;

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Whether the service answers its health check
    pub async fn health(&self) -> bool {
        let url = self.url("/api/service/health");
        debug!("GET {}", url);
        match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => response
                .json::<HealthResponse>()
                .await
                .map(|health| health.success)
                .unwrap_or(false),
            Ok(response) => {
                debug!("Health check answered {}", response.status());
                false
            }
            Err(e) => {
                debug!("Health check failed: {}", e);
                false
            }
        }
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, PilotError> {
        let url = self.url(path);
        debug!("GET {}", url);
        self.send("GET", self.client.get(&url)).await
    }

    /// Make a GET request with query parameters
    pub async fn get_with_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Option<T>, PilotError> {
        let url = self.url(path);
        debug!("GET {} {:?}", url, query);
        self.send("GET", self.client.get(&url).query(query)).await
    }

    /// Make a POST request
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<Option<T>, PilotError> {
        let url = self.url(path);
        debug!("POST {}", url);
        self.send("POST", self.client.post(&url).json(body)).await
    }

    /// Make a PUT request
    pub async fn put<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<Option<T>, PilotError> {
        let url = self.url(path);
        debug!("PUT {}", url);
        self.send("PUT", self.client.put(&url).json(body)).await
    }

    /// Make a DELETE request
    pub async fn delete(&self, path: &str) -> Result<(), PilotError> {
        let url = self.url(path);
        debug!("DELETE {}", url);
        let _: Option<serde_json::Value> = self.send("DELETE", self.client.delete(&url)).await?;
        Ok(())
    }

    /// Send a request and unwrap the `{success, data, message}` envelope
    async fn send<T: DeserializeOwned>(&self, method: &str, request: RequestBuilder) -> Result<Option<T>, PilotError> {
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("HTTP {} failed: {} - {}", method, status, body);
            return Err(PilotError::ServiceError(format!("{}: {}", status, body)));
        }

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(None);
        }

        let envelope: ApiResponse<T> = serde_json::from_str(&text)?;
        if !envelope.success {
            let message = envelope.message.unwrap_or_else(|| "request was not successful".to_string());
            error!("HTTP {} rejected: {}", method, message);
            return Err(PilotError::ServiceError(message));
        }
        Ok(envelope.data)
    }
}
