//! Benchmark support: a no-op transport and pre-seeded engines.

use async_trait::async_trait;
use crier_core::{
    Broadcaster, DeliveryError, DeliveryTransport, MemoryStore, PreviewResolver, Store,
};
use crier_model::{now_secs, AssetRef, Channel, LinkPreview, Subscriber};
use std::sync::Arc;
use uuid::Uuid;

/// Transport whose every send succeeds immediately.
pub struct NoopTransport;

#[async_trait]
impl DeliveryTransport for NoopTransport {
    async fn send_text(&self, _recipient: &str, _text: &str) -> Result<(), DeliveryError> {
        Ok(())
    }

    async fn send_asset(&self, _recipient: &str, _asset: &AssetRef) -> Result<(), DeliveryError> {
        Ok(())
    }

    async fn send_link_preview(
        &self,
        _recipient: &str,
        _url: &str,
        _title: &str,
        _image: Option<&AssetRef>,
    ) -> Result<(), DeliveryError> {
        Ok(())
    }

    async fn delete_message(
        &self,
        _recipient: &str,
        _message_id: Uuid,
    ) -> Result<(), DeliveryError> {
        Ok(())
    }
}

/// Resolver returning a fixed preview.
pub struct NoopResolver;

#[async_trait]
impl PreviewResolver for NoopResolver {
    async fn resolve(&self, url: &str) -> Result<LinkPreview, DeliveryError> {
        Ok(LinkPreview {
            url: url.to_string(),
            title: "bench".to_string(),
            image: None,
        })
    }
}

/// An activated in-memory channel with `subscribers` joined recipients.
pub async fn seeded_engine(subscribers: usize) -> Broadcaster {
    let store = Arc::new(MemoryStore::new());
    store
        .insert_channel(&Channel::new("bench", "token", "origin"))
        .await
        .unwrap();
    store.set_admin("bench", "admin-bot").await.unwrap();
    for i in 0..subscribers {
        store
            .insert_subscriber(&Subscriber {
                bot_id: format!("bot-{i}"),
                channel: "bench".to_string(),
                origin_id: format!("user-{i}"),
                handle: format!("user{i}"),
                display_name: format!("User {i}"),
                muted: false,
                cursor: 0,
                created_at: now_secs(),
            })
            .await
            .unwrap();
    }

    Broadcaster::new(store, Arc::new(NoopTransport), Arc::new(NoopResolver))
}
