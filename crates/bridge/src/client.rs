//! Client for the internal order-processing endpoint.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use domain::{OrderResponse, ProcessOrderRequest};
use reqwest::StatusCode;
use saga::OrderOrchestrator;

use crate::error::{BridgeError, Result};

/// Trait for handing an enriched order to the processing endpoint.
#[async_trait]
pub trait InternalApiClient: Send + Sync {
    async fn process_order(&self, request: &ProcessOrderRequest) -> Result<OrderResponse>;

    /// Returns false if the endpoint looks unreachable. Never fails.
    async fn is_healthy(&self) -> bool;
}

/// Configuration for [`HttpInternalApiClient`].
#[derive(Debug, Clone)]
pub struct ApiClientConfig {
    /// Base URL of the API, without a trailing path.
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for ApiClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Calls `POST {base_url}/orders/{id}` over HTTP.
pub struct HttpInternalApiClient {
    client: reqwest::Client,
    config: ApiClientConfig,
}

impl HttpInternalApiClient {
    pub fn new(config: ApiClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| BridgeError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.config.base_url.trim_end_matches('/'))
    }

    fn transport_error(&self, err: reqwest::Error) -> BridgeError {
        if err.is_timeout() {
            BridgeError::Timeout(self.config.timeout)
        } else {
            BridgeError::Transport(err.to_string())
        }
    }
}

/// Maps a non-success status to the error class the worker settles on.
fn status_error(status: StatusCode, body: String) -> BridgeError {
    match status {
        StatusCode::BAD_REQUEST => BridgeError::InvalidRequest(body),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BridgeError::Unauthorized(body),
        StatusCode::NOT_FOUND => BridgeError::NotFound(body),
        StatusCode::CONFLICT => BridgeError::Conflict(body),
        _ => BridgeError::Http {
            status: status.as_u16(),
            body,
        },
    }
}

#[async_trait]
impl InternalApiClient for HttpInternalApiClient {
    #[tracing::instrument(skip(self, request), fields(order_id = %request.order.id()))]
    async fn process_order(&self, request: &ProcessOrderRequest) -> Result<OrderResponse> {
        let url = self.url(&format!("orders/{}", request.order.id()));
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), body = %body, "processing endpoint rejected order");
            return Err(status_error(status, body));
        }

        response
            .json::<OrderResponse>()
            .await
            .map_err(|e| BridgeError::Malformed(format!("unreadable processing response: {e}")))
    }

    async fn is_healthy(&self) -> bool {
        match self.client.get(self.url("health")).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, "health check failed");
                false
            }
        }
    }
}

/// Calls the orchestrator in-process, for single-binary deployments.
#[derive(Clone)]
pub struct LocalApiClient {
    orchestrator: Arc<OrderOrchestrator>,
}

impl LocalApiClient {
    pub fn new(orchestrator: Arc<OrderOrchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl InternalApiClient for LocalApiClient {
    async fn process_order(&self, request: &ProcessOrderRequest) -> Result<OrderResponse> {
        Ok(self.orchestrator.process(request.clone()).await?)
    }

    async fn is_healthy(&self) -> bool {
        true
    }
}
