//! Link-preview resolution via the delivery collaborator.
//!
//! Scraping and preview-asset upload happen on the collaborator's side;
//! this client only asks for the result. Memoization lives in the engine's
//! content cache, not here.

use crate::http::request_err;
use async_trait::async_trait;
use crier_core::{DeliveryError, PreviewResolver};
use crier_model::LinkPreview;
use std::time::Duration;
use tracing::debug;

/// [`PreviewResolver`] over the collaborator's `/preview` endpoint.
pub struct HttpPreviewResolver {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPreviewResolver {
    /// Create a resolver client.
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl PreviewResolver for HttpPreviewResolver {
    async fn resolve(&self, url: &str) -> Result<LinkPreview, DeliveryError> {
        let endpoint = format!("{}/preview", self.base_url.trim_end_matches('/'));
        debug!(url = %url, "resolving link preview");

        let response = self
            .client
            .get(&endpoint)
            .query(&[("url", url)])
            .send()
            .await
            .map_err(request_err)?;
        // A failed resolution is never `Gone`; the URL stays retryable.
        if !response.status().is_success() {
            return Err(DeliveryError::Transient(format!(
                "preview resolution failed with status {}",
                response.status()
            )));
        }

        response
            .json::<LinkPreview>()
            .await
            .map_err(|e| DeliveryError::Transient(format!("bad preview response: {e}")))
    }
}
