//! Trait seams between the engine and its collaborators.
//!
//! The engine reaches the persistent store, the delivery transport, the
//! link-preview resolver, and sibling nodes only through these traits.
//! Production implementations live in `crier-store` (SQLite) and
//! `crier-transport` (HTTP); [`crate::memory`] provides an in-process store.

use async_trait::async_trait;
use crier_model::{
    AssetRef, BatchOutcome, Broadcast, Channel, Content, InboundMessage, LinkPreview,
    ModerationEntry, Subscriber,
};
use thiserror::Error;
use uuid::Uuid;

/// Persistent store failures.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The backing database failed.
    #[error("store backend error: {0}")]
    Backend(String),

    /// A stored record could not be decoded.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Durable state for channels, subscribers, moderation, and history.
///
/// The store is the single source of truth. Each operation is atomic and
/// independent; the engine never holds locks across calls. Channel updates
/// are a closed set of named operations, never dynamic column names.
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert a channel. Returns `false` when the name is already taken
    /// (the existing channel, including its token, is left untouched).
    async fn insert_channel(&self, channel: &Channel) -> Result<bool, StoreError>;

    /// Look up a channel by name.
    async fn channel(&self, name: &str) -> Result<Option<Channel>, StoreError>;

    /// Delete a channel and everything it owns: subscribers, moderation
    /// entries, broadcast history, inbound log.
    async fn delete_channel(&self, name: &str) -> Result<(), StoreError>;

    /// Set the welcome text shown to new subscribers.
    async fn set_welcome_text(&self, name: &str, text: &str) -> Result<(), StoreError>;

    /// Set the intro picture URL shown to new subscribers.
    async fn set_intro_media(&self, name: &str, url: &str) -> Result<(), StoreError>;

    /// Toggle admin activity notifications for a channel.
    async fn set_channel_muted(&self, name: &str, muted: bool) -> Result<(), StoreError>;

    /// Promote a bot identity to channel admin.
    async fn set_admin(&self, name: &str, admin_id: &str) -> Result<(), StoreError>;

    /// Insert a subscriber. Returns `false` when the bot id is already
    /// present (duplicate admission is a no-op, not an error).
    async fn insert_subscriber(&self, subscriber: &Subscriber) -> Result<bool, StoreError>;

    /// Look up a subscriber by bot id.
    async fn subscriber(&self, bot_id: &str) -> Result<Option<Subscriber>, StoreError>;

    /// All subscribers of a channel, muted included.
    async fn subscribers(&self, channel: &str) -> Result<Vec<Subscriber>, StoreError>;

    /// Remove a subscriber. Returns `false` when it was not present.
    async fn remove_subscriber(&self, bot_id: &str) -> Result<bool, StoreError>;

    /// Toggle a subscriber's personal broadcast opt-out.
    async fn set_subscriber_muted(&self, bot_id: &str, muted: bool) -> Result<(), StoreError>;

    /// Advance a subscriber's catch-up cursor.
    async fn set_cursor(&self, bot_id: &str, cursor: i64) -> Result<(), StoreError>;

    /// Number of subscribers of a channel.
    async fn count_subscribers(&self, channel: &str) -> Result<u64, StoreError>;

    /// Insert or update a moderation entry for `(channel, handle)`.
    async fn upsert_moderation(&self, entry: &ModerationEntry) -> Result<(), StoreError>;

    /// All moderation entries of a channel.
    async fn moderation(&self, channel: &str) -> Result<Vec<ModerationEntry>, StoreError>;

    /// Drop both moderation lists of a channel.
    async fn clear_moderation(&self, channel: &str) -> Result<(), StoreError>;

    /// Persist a new broadcast and return it with its assigned id.
    ///
    /// Id assignment is atomic in the store; concurrent publishes on one
    /// channel never race on ids or duplicate them.
    async fn insert_broadcast(
        &self,
        channel: &str,
        message_id: Uuid,
        content: &Content,
    ) -> Result<Broadcast, StoreError>;

    /// Non-tombstoned broadcasts with `id > after`, oldest first, capped at
    /// `limit`.
    async fn broadcasts_after(
        &self,
        channel: &str,
        after: i64,
        limit: u32,
    ) -> Result<Vec<Broadcast>, StoreError>;

    /// The newest broadcast id of a channel, or 0 when it has none.
    async fn latest_broadcast_id(&self, channel: &str) -> Result<i64, StoreError>;

    /// Tombstone the broadcast with this message id. Returns `false` when no
    /// such broadcast exists in the channel. Tombstoned rows stay in history
    /// but are skipped by catch-up.
    async fn tombstone_broadcast(&self, channel: &str, message_id: Uuid)
        -> Result<bool, StoreError>;

    /// Number of live (non-tombstoned) broadcasts of a channel.
    async fn count_broadcasts(&self, channel: &str) -> Result<u64, StoreError>;

    /// Append one subscriber-authored message to the audit log.
    async fn append_inbound(&self, message: &InboundMessage) -> Result<(), StoreError>;

    /// Number of logged inbound messages of a channel.
    async fn count_inbound(&self, channel: &str) -> Result<u64, StoreError>;
}

/// Per-recipient delivery failures.
#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    /// The recipient identity no longer exists. The engine removes the
    /// subscription when it sees this.
    #[error("recipient is gone")]
    Gone,

    /// Transient failure; the recipient may be reachable later. Timeouts
    /// land here too.
    #[error("delivery failed: {0}")]
    Transient(String),
}

/// Per-recipient send primitive owned by the secure-messaging collaborator.
///
/// Timeouts belong to the implementation; the engine treats them as ordinary
/// [`DeliveryError::Transient`] failures. Per-recipient FIFO is assumed from
/// the transport; the engine adds no ordering of its own across recipients.
#[async_trait]
pub trait DeliveryTransport: Send + Sync {
    /// Send plain text to a recipient.
    async fn send_text(&self, recipient: &str, text: &str) -> Result<(), DeliveryError>;

    /// Send an uploaded asset to a recipient.
    async fn send_asset(&self, recipient: &str, asset: &AssetRef) -> Result<(), DeliveryError>;

    /// Send a resolved link preview card to a recipient.
    async fn send_link_preview(
        &self,
        recipient: &str,
        url: &str,
        title: &str,
        image: Option<&AssetRef>,
    ) -> Result<(), DeliveryError>;

    /// Instruct a recipient to delete a previously delivered message.
    async fn delete_message(&self, recipient: &str, message_id: Uuid)
        -> Result<(), DeliveryError>;
}

/// Resolves a URL to its page title and uploaded preview image.
///
/// Scraping and asset upload happen behind this seam; the engine only
/// memoizes results through the content cache.
#[async_trait]
pub trait PreviewResolver: Send + Sync {
    /// Resolve one URL.
    async fn resolve(&self, url: &str) -> Result<LinkPreview, DeliveryError>;
}

/// Forwards one recipient batch to a sibling node for local delivery there.
#[async_trait]
pub trait BatchForwarder: Send + Sync {
    /// Deliver `content` to `recipients` on a sibling node.
    ///
    /// Returns the aggregate counts reported by that node.
    async fn forward(
        &self,
        recipients: &[String],
        content: &Content,
    ) -> Result<BatchOutcome, DeliveryError>;
}
