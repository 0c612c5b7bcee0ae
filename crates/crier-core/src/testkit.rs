//! Shared test doubles for engine tests.

use crate::traits::{DeliveryError, DeliveryTransport, PreviewResolver};
use async_trait::async_trait;
use crier_model::{now_secs, AssetRef, LinkPreview, Subscriber};
use std::collections::HashSet;
use std::sync::Mutex;
use uuid::Uuid;

/// What a transport was asked to deliver.
#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Text { to: String, body: String },
    Asset { to: String, key: String },
    Link { to: String, url: String, title: String },
    Delete { to: String, message_id: Uuid },
}

impl Sent {
    pub fn recipient(&self) -> &str {
        match self {
            Sent::Text { to, .. }
            | Sent::Asset { to, .. }
            | Sent::Link { to, .. }
            | Sent::Delete { to, .. } => to,
        }
    }
}

/// Transport double that records every send and can simulate failures.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Sent>>,
    gone: Mutex<HashSet<String>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// All deliveries to this recipient fail with `Gone`.
    pub fn mark_gone(&self, recipient: &str) {
        self.gone.lock().unwrap().insert(recipient.to_string());
    }

    /// All deliveries to this recipient fail transiently.
    pub fn mark_failing(&self, recipient: &str) {
        self.failing.lock().unwrap().insert(recipient.to_string());
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, recipient: &str) -> Vec<Sent> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.recipient() == recipient)
            .cloned()
            .collect()
    }

    pub fn texts_to(&self, recipient: &str) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|s| match s {
                Sent::Text { to, body } if to == recipient => Some(body.clone()),
                _ => None,
            })
            .collect()
    }

    fn check(&self, recipient: &str) -> Result<(), DeliveryError> {
        if self.gone.lock().unwrap().contains(recipient) {
            return Err(DeliveryError::Gone);
        }
        if self.failing.lock().unwrap().contains(recipient) {
            return Err(DeliveryError::Transient("simulated failure".into()));
        }
        Ok(())
    }

    fn record(&self, item: Sent) {
        self.sent.lock().unwrap().push(item);
    }
}

#[async_trait]
impl DeliveryTransport for RecordingTransport {
    async fn send_text(&self, recipient: &str, text: &str) -> Result<(), DeliveryError> {
        self.check(recipient)?;
        self.record(Sent::Text {
            to: recipient.to_string(),
            body: text.to_string(),
        });
        Ok(())
    }

    async fn send_asset(&self, recipient: &str, asset: &AssetRef) -> Result<(), DeliveryError> {
        self.check(recipient)?;
        self.record(Sent::Asset {
            to: recipient.to_string(),
            key: asset.key.clone(),
        });
        Ok(())
    }

    async fn send_link_preview(
        &self,
        recipient: &str,
        url: &str,
        title: &str,
        _image: Option<&AssetRef>,
    ) -> Result<(), DeliveryError> {
        self.check(recipient)?;
        self.record(Sent::Link {
            to: recipient.to_string(),
            url: url.to_string(),
            title: title.to_string(),
        });
        Ok(())
    }

    async fn delete_message(
        &self,
        recipient: &str,
        message_id: Uuid,
    ) -> Result<(), DeliveryError> {
        self.check(recipient)?;
        self.record(Sent::Delete {
            to: recipient.to_string(),
            message_id,
        });
        Ok(())
    }
}

/// Resolver double returning a fixed title, never failing.
pub struct StaticResolver;

#[async_trait]
impl PreviewResolver for StaticResolver {
    async fn resolve(&self, url: &str) -> Result<LinkPreview, DeliveryError> {
        Ok(LinkPreview {
            url: url.to_string(),
            title: "Example Domain".to_string(),
            image: None,
        })
    }
}

/// A plain, unmuted subscriber row.
pub fn subscriber(bot_id: &str, channel: &str) -> Subscriber {
    Subscriber {
        bot_id: bot_id.to_string(),
        channel: channel.to_string(),
        origin_id: format!("user-{bot_id}"),
        handle: bot_id.to_string(),
        display_name: bot_id.to_string(),
        muted: false,
        cursor: 0,
        created_at: now_secs(),
    }
}
