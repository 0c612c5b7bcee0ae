//! Batch forwarding to sibling nodes.

use crate::http::{check_status, request_err};
use async_trait::async_trait;
use crier_core::{BatchForwarder, DeliveryError};
use crier_model::{BatchForward, BatchOutcome, Content};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

/// [`BatchForwarder`] that round-robins batches across sibling nodes'
/// `/internal/batch` endpoints.
pub struct HttpBatchForwarder {
    client: reqwest::Client,
    nodes: Vec<String>,
    next: AtomicUsize,
}

impl HttpBatchForwarder {
    /// Create a forwarder over the given sibling base URLs.
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying HTTP client cannot be built.
    pub fn new(nodes: Vec<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            nodes,
            next: AtomicUsize::new(0),
        })
    }

    fn next_node(&self) -> Option<&str> {
        if self.nodes.is_empty() {
            return None;
        }
        let i = self.next.fetch_add(1, Ordering::Relaxed) % self.nodes.len();
        Some(self.nodes[i].as_str())
    }
}

#[async_trait]
impl BatchForwarder for HttpBatchForwarder {
    async fn forward(
        &self,
        recipients: &[String],
        content: &Content,
    ) -> Result<BatchOutcome, DeliveryError> {
        let Some(node) = self.next_node() else {
            return Err(DeliveryError::Transient(
                "no sibling nodes configured".into(),
            ));
        };
        let url = format!("{}/internal/batch", node.trim_end_matches('/'));
        debug!(node = %node, batch = recipients.len(), "forwarding batch");

        let payload = BatchForward {
            recipients: recipients.to_vec(),
            content: content.clone(),
        };
        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(request_err)?;
        check_status(response.status())?;

        response
            .json::<BatchOutcome>()
            .await
            .map_err(|e| DeliveryError::Transient(format!("bad batch response: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_robin_rotates_nodes() {
        let forwarder = HttpBatchForwarder::new(
            vec![
                "http://node-a:8080".to_string(),
                "http://node-b:8080".to_string(),
            ],
            Duration::from_secs(5),
        )
        .unwrap();

        assert_eq!(forwarder.next_node(), Some("http://node-a:8080"));
        assert_eq!(forwarder.next_node(), Some("http://node-b:8080"));
        assert_eq!(forwarder.next_node(), Some("http://node-a:8080"));
    }

    #[test]
    fn test_no_nodes_yields_none() {
        let forwarder = HttpBatchForwarder::new(Vec::new(), Duration::from_secs(5)).unwrap();
        assert_eq!(forwarder.next_node(), None);
    }
}
