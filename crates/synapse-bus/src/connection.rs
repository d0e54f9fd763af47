//! Transport connections.

use crate::error::BusError;
use async_trait::async_trait;
use std::time::Duration;
use synapse_types::component::{Message, ServiceEndpoint};
use tracing::debug;

/// Per-request timeout for HTTP transports.
const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// A live transport to one component. One-to-one with a
/// [`ServiceEndpoint`].
#[async_trait]
pub trait Connection: Send + Sync {
    /// Deliver a message and return the remote's reply payload.
    async fn send(&self, message: &Message) -> Result<serde_json::Value, BusError>;

    /// Probe liveness via the endpoint's health path.
    async fn health_check(&self) -> bool;
}

/// Request/response transport over HTTP. Messages are POSTed as JSON
/// envelopes; liveness is a GET against the endpoint's health path.
pub struct HttpConnection {
    client: reqwest::Client,
    endpoint: ServiceEndpoint,
}

impl HttpConnection {
    /// Build a connection for `endpoint`.
    pub fn new(endpoint: ServiceEndpoint) -> Result<Self, BusError> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BusError::Transport(e.to_string()))?;
        Ok(Self { client, endpoint })
    }

    fn health_url(&self) -> String {
        match &self.endpoint.health_path {
            Some(path) => format!(
                "{}/{}",
                self.endpoint.address.trim_end_matches('/'),
                path.trim_start_matches('/')
            ),
            None => self.endpoint.address.clone(),
        }
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.endpoint.auth {
            Some(auth) if auth.scheme.eq_ignore_ascii_case("bearer") => {
                request.bearer_auth(auth.token.clone().unwrap_or_default())
            }
            _ => request,
        }
    }
}

#[async_trait]
impl Connection for HttpConnection {
    async fn send(&self, message: &Message) -> Result<serde_json::Value, BusError> {
        let request = self.client.post(&self.endpoint.address).json(message);
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| BusError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(BusError::Transport(format!(
                "{} returned {}",
                self.endpoint.address,
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| BusError::Transport(e.to_string()))
    }

    async fn health_check(&self) -> bool {
        let url = self.health_url();
        let request = self.client.get(&url);
        match self.authorize(request).send().await {
            Ok(response) => {
                let healthy = response.status().is_success();
                debug!(url = %url, healthy, "Liveness probe");
                healthy
            }
            Err(e) => {
                debug!(url = %url, error = %e, "Liveness probe failed");
                false
            }
        }
    }
}
