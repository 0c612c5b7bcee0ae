//! In-memory store for tests and single-node development.
//!
//! Implements the full [`Store`] contract against process-local maps. State
//! dies with the process; production deployments use the SQLite store from
//! `crier-store`.

use crate::traits::{Store, StoreError};
use async_trait::async_trait;
use crier_model::{
    now_secs, Broadcast, Channel, Content, InboundMessage, ModerationEntry, Subscriber,
};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    channels: HashMap<String, Channel>,
    subscribers: HashMap<String, Subscriber>,
    moderation: Vec<ModerationEntry>,
    broadcasts: Vec<Broadcast>,
    inbound: Vec<InboundMessage>,
    next_broadcast_id: i64,
}

/// Process-local [`Store`] implementation.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_channel(&self, channel: &Channel) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        if inner.channels.contains_key(&channel.name) {
            return Ok(false);
        }
        inner.channels.insert(channel.name.clone(), channel.clone());
        Ok(true)
    }

    async fn channel(&self, name: &str) -> Result<Option<Channel>, StoreError> {
        Ok(self.inner.read().await.channels.get(name).cloned())
    }

    async fn delete_channel(&self, name: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.channels.remove(name);
        inner.subscribers.retain(|_, s| s.channel != name);
        inner.moderation.retain(|e| e.channel != name);
        inner.broadcasts.retain(|b| b.channel != name);
        inner.inbound.retain(|m| m.channel != name);
        Ok(())
    }

    async fn set_welcome_text(&self, name: &str, text: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if let Some(channel) = inner.channels.get_mut(name) {
            channel.welcome_text = Some(text.to_string());
        }
        Ok(())
    }

    async fn set_intro_media(&self, name: &str, url: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if let Some(channel) = inner.channels.get_mut(name) {
            channel.intro_media_url = Some(url.to_string());
        }
        Ok(())
    }

    async fn set_channel_muted(&self, name: &str, muted: bool) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if let Some(channel) = inner.channels.get_mut(name) {
            channel.muted = muted;
        }
        Ok(())
    }

    async fn set_admin(&self, name: &str, admin_id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if let Some(channel) = inner.channels.get_mut(name) {
            channel.admin_id = Some(admin_id.to_string());
        }
        Ok(())
    }

    async fn insert_subscriber(&self, subscriber: &Subscriber) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        if inner.subscribers.contains_key(&subscriber.bot_id) {
            return Ok(false);
        }
        inner
            .subscribers
            .insert(subscriber.bot_id.clone(), subscriber.clone());
        Ok(true)
    }

    async fn subscriber(&self, bot_id: &str) -> Result<Option<Subscriber>, StoreError> {
        Ok(self.inner.read().await.subscribers.get(bot_id).cloned())
    }

    async fn subscribers(&self, channel: &str) -> Result<Vec<Subscriber>, StoreError> {
        let mut subs: Vec<Subscriber> = self
            .inner
            .read()
            .await
            .subscribers
            .values()
            .filter(|s| s.channel == channel)
            .cloned()
            .collect();
        subs.sort_by(|a, b| a.bot_id.cmp(&b.bot_id));
        Ok(subs)
    }

    async fn remove_subscriber(&self, bot_id: &str) -> Result<bool, StoreError> {
        Ok(self.inner.write().await.subscribers.remove(bot_id).is_some())
    }

    async fn set_subscriber_muted(&self, bot_id: &str, muted: bool) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if let Some(subscriber) = inner.subscribers.get_mut(bot_id) {
            subscriber.muted = muted;
        }
        Ok(())
    }

    async fn set_cursor(&self, bot_id: &str, cursor: i64) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if let Some(subscriber) = inner.subscribers.get_mut(bot_id) {
            subscriber.cursor = cursor;
        }
        Ok(())
    }

    async fn count_subscribers(&self, channel: &str) -> Result<u64, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .subscribers
            .values()
            .filter(|s| s.channel == channel)
            .count() as u64)
    }

    async fn upsert_moderation(&self, entry: &ModerationEntry) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner
            .moderation
            .iter_mut()
            .find(|e| e.channel == entry.channel && e.handle == entry.handle)
        {
            existing.state = entry.state;
        } else {
            inner.moderation.push(entry.clone());
        }
        Ok(())
    }

    async fn moderation(&self, channel: &str) -> Result<Vec<ModerationEntry>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .moderation
            .iter()
            .filter(|e| e.channel == channel)
            .cloned()
            .collect())
    }

    async fn clear_moderation(&self, channel: &str) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .moderation
            .retain(|e| e.channel != channel);
        Ok(())
    }

    async fn insert_broadcast(
        &self,
        channel: &str,
        message_id: Uuid,
        content: &Content,
    ) -> Result<Broadcast, StoreError> {
        let mut inner = self.inner.write().await;
        inner.next_broadcast_id += 1;
        let broadcast = Broadcast {
            id: inner.next_broadcast_id,
            channel: channel.to_string(),
            message_id,
            content: content.clone(),
            tombstoned: false,
            created_at: now_secs(),
        };
        inner.broadcasts.push(broadcast.clone());
        Ok(broadcast)
    }

    async fn broadcasts_after(
        &self,
        channel: &str,
        after: i64,
        limit: u32,
    ) -> Result<Vec<Broadcast>, StoreError> {
        let inner = self.inner.read().await;
        let mut pending: Vec<Broadcast> = inner
            .broadcasts
            .iter()
            .filter(|b| b.channel == channel && !b.tombstoned && b.id > after)
            .cloned()
            .collect();
        pending.sort_by_key(|b| b.id);
        pending.truncate(limit as usize);
        Ok(pending)
    }

    async fn latest_broadcast_id(&self, channel: &str) -> Result<i64, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .broadcasts
            .iter()
            .filter(|b| b.channel == channel)
            .map(|b| b.id)
            .max()
            .unwrap_or(0))
    }

    async fn tombstone_broadcast(
        &self,
        channel: &str,
        message_id: Uuid,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        if let Some(broadcast) = inner
            .broadcasts
            .iter_mut()
            .find(|b| b.channel == channel && b.message_id == message_id)
        {
            broadcast.tombstoned = true;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn count_broadcasts(&self, channel: &str) -> Result<u64, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .broadcasts
            .iter()
            .filter(|b| b.channel == channel && !b.tombstoned)
            .count() as u64)
    }

    async fn append_inbound(&self, message: &InboundMessage) -> Result<(), StoreError> {
        self.inner.write().await.inbound.push(message.clone());
        Ok(())
    }

    async fn count_inbound(&self, channel: &str) -> Result<u64, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .inbound
            .iter()
            .filter(|m| m.channel == channel)
            .count() as u64)
    }
}
