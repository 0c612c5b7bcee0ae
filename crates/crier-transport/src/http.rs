//! Per-recipient HTTP delivery client.

use async_trait::async_trait;
use crier_core::{DeliveryError, DeliveryTransport};
use crier_model::AssetRef;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Delivery client configuration.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Base URL of the delivery collaborator, e.g. `http://127.0.0.1:8700`.
    pub base_url: String,
    /// Per-request timeout. Timeouts count as transient failures.
    pub timeout: Duration,
}

impl DeliveryConfig {
    /// Config with the default timeout.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Map a recipient-endpoint response status onto the delivery outcome.
pub(crate) fn check_status(status: StatusCode) -> Result<(), DeliveryError> {
    if status.is_success() {
        Ok(())
    } else if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
        Err(DeliveryError::Gone)
    } else {
        Err(DeliveryError::Transient(format!(
            "unexpected status {status}"
        )))
    }
}

pub(crate) fn request_err(e: reqwest::Error) -> DeliveryError {
    DeliveryError::Transient(e.to_string())
}

/// [`DeliveryTransport`] over the collaborator's per-recipient endpoints.
pub struct HttpDelivery {
    client: reqwest::Client,
    config: DeliveryConfig,
}

impl HttpDelivery {
    /// Create a delivery client.
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying HTTP client cannot be built.
    pub fn new(config: DeliveryConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self { client, config })
    }

    fn endpoint(&self, recipient: &str, action: &str) -> String {
        format!(
            "{}/bots/{recipient}/{action}",
            self.config.base_url.trim_end_matches('/')
        )
    }

    async fn post(
        &self,
        recipient: &str,
        action: &str,
        body: &serde_json::Value,
    ) -> Result<(), DeliveryError> {
        let url = self.endpoint(recipient, action);
        debug!(recipient = %recipient, action = %action, "delivery request");
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(request_err)?;
        check_status(response.status())
    }
}

#[async_trait]
impl DeliveryTransport for HttpDelivery {
    async fn send_text(&self, recipient: &str, text: &str) -> Result<(), DeliveryError> {
        self.post(recipient, "text", &serde_json::json!({ "text": text }))
            .await
    }

    async fn send_asset(&self, recipient: &str, asset: &AssetRef) -> Result<(), DeliveryError> {
        self.post(
            recipient,
            "asset",
            &serde_json::json!({
                "key": asset.key,
                "token": asset.token,
                "mime": asset.mime,
                "size": asset.size,
            }),
        )
        .await
    }

    async fn send_link_preview(
        &self,
        recipient: &str,
        url: &str,
        title: &str,
        image: Option<&AssetRef>,
    ) -> Result<(), DeliveryError> {
        self.post(
            recipient,
            "link",
            &serde_json::json!({
                "url": url,
                "title": title,
                "image": image,
            }),
        )
        .await
    }

    async fn delete_message(
        &self,
        recipient: &str,
        message_id: Uuid,
    ) -> Result<(), DeliveryError> {
        self.post(
            recipient,
            "delete",
            &serde_json::json!({ "message_id": message_id }),
        )
        .await
    }
}
