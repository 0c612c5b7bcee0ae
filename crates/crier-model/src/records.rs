//! Durable records owned by the persistent store.

use crate::content::Content;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Maximum channel name length.
pub const MAX_CHANNEL_NAME_LENGTH: usize = 64;

/// Identity of one joined bot instance.
pub type BotId = String;

/// Current time as Unix epoch seconds.
#[must_use]
pub fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}

/// Validate a channel name.
///
/// # Errors
///
/// Returns an error message if the channel name is invalid.
pub fn validate_channel_name(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("Channel name cannot be empty");
    }
    if name.len() > MAX_CHANNEL_NAME_LENGTH {
        return Err("Channel name too long");
    }
    if name.starts_with('$') {
        return Err("Channel names starting with '$' are reserved");
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err("Channel name contains invalid characters");
    }
    Ok(())
}

/// A broadcast channel: one publisher, many subscribers.
///
/// A freshly provisioned channel has no admin. The first joiner whose origin
/// matches `origin_id` is promoted to admin, which turns that conversation
/// into the channel's control surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    /// Unique channel name.
    pub name: String,
    /// Shared secret authorizing publishes. Immutable after provisioning.
    pub token: String,
    /// Identity of the channel's creator, used for admin promotion.
    pub origin_id: String,
    /// The promoted publisher identity, once the channel is claimed.
    pub admin_id: Option<BotId>,
    /// Welcome text shown to new subscribers.
    pub welcome_text: Option<String>,
    /// Intro picture URL shown to new subscribers.
    pub intro_media_url: Option<String>,
    /// Suppresses subscriber-activity notifications to the admin.
    pub muted: bool,
    /// Creation time, Unix epoch seconds.
    pub created_at: i64,
}

impl Channel {
    /// Create a new, unclaimed channel.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        token: impl Into<String>,
        origin_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            token: token.into(),
            origin_id: origin_id.into(),
            admin_id: None,
            welcome_text: None,
            intro_media_url: None,
            muted: false,
            created_at: now_secs(),
        }
    }

    /// Whether the channel has been claimed by an admin and may publish.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.admin_id.is_some()
    }
}

/// One joined bot identity subscribed to a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    /// Unique bot instance id.
    pub bot_id: BotId,
    /// Owning channel name.
    pub channel: String,
    /// Identity of the human user behind this bot instance.
    pub origin_id: String,
    /// The user's handle.
    pub handle: String,
    /// The user's display name.
    pub display_name: String,
    /// Personal opt-out of broadcasts.
    pub muted: bool,
    /// Id of the last broadcast delivered to this subscriber.
    pub cursor: i64,
    /// Join time, Unix epoch seconds.
    pub created_at: i64,
}

/// A candidate identity asking to join a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    /// Bot instance id assigned for this conversation.
    pub bot_id: BotId,
    /// Identity of the human user behind the request.
    pub origin_id: String,
    /// The user's handle.
    pub handle: String,
    /// The user's display name.
    pub display_name: String,
}

/// A member of the conversation a candidate is joining from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// User id of the member.
    pub user_id: String,
    /// Set when the member is another automated identity.
    pub service: Option<ServiceRef>,
}

/// An automated-service identity attached to a conversation member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRef {
    /// Provider id.
    pub provider: String,
    /// Service id.
    pub id: String,
}

/// Moderation list membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationState {
    /// Handle is on the allow list.
    Allow,
    /// Handle is on the block list.
    Block,
}

/// One moderation entry, unique per `(channel, handle)`.
///
/// An empty allow set leaves the channel open to everyone except blocked
/// handles. A non-empty allow set gates entry on its own; block entries are
/// ignored while it is non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModerationEntry {
    /// Owning channel name.
    pub channel: String,
    /// Moderated handle, lowercase, without the leading `@`.
    pub handle: String,
    /// Allow or block.
    pub state: ModerationState,
}

/// An immutable record of one published content item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Broadcast {
    /// Store-assigned id, monotonic per channel.
    pub id: i64,
    /// Owning channel name.
    pub channel: String,
    /// External correlation id, used for retraction.
    pub message_id: Uuid,
    /// The published content.
    pub content: Content,
    /// Set on retraction; tombstoned broadcasts are skipped by catch-up.
    pub tombstoned: bool,
    /// Publish time, Unix epoch seconds.
    pub created_at: i64,
}

/// Append-only log entry for subscriber-authored content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Owning channel name.
    pub channel: String,
    /// Authoring bot instance.
    pub bot_id: BotId,
    /// Identity of the human author.
    pub user_id: String,
    /// Text body, when the content was text.
    pub body: Option<String>,
    /// MIME type of the content.
    pub mime: String,
    /// Receipt time, Unix epoch seconds.
    pub created_at: i64,
}
