//! HTTP client for the evaluation backend.

use std::time::Duration;

use async_trait::async_trait;
use mlhub_core::ports::{EvaluateCreateRequest, EvaluateManager};
use mlhub_core::{MlHubError, Result};
use reqwest::Client;
use tracing::{debug, error};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpEvaluateManager {
    client: Client,
    endpoint: String,
}

impl HttpEvaluateManager {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| MlHubError::Configuration(format!("http client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl EvaluateManager for HttpEvaluateManager {
    async fn create(&self, req: &EvaluateCreateRequest) -> Result<()> {
        debug!(
            endpoint = %self.endpoint,
            evaluate_id = %req.evaluate.index.id,
            "requesting evaluate instance"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .json(req)
            .send()
            .await
            .map_err(|e| MlHubError::provisioning(format!("send: {e}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        error!(%status, body = %body, "evaluation backend rejected request");
        Err(MlHubError::provisioning(format!("HTTP {status}: {body}")))
    }
}
