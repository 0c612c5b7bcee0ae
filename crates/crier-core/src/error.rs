//! Error taxonomy for engine operations.

use crate::traits::StoreError;
use thiserror::Error;
use uuid::Uuid;

/// Why an admission request was turned away.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    /// The channel does not exist.
    #[error("unknown channel: {0}")]
    UnknownChannel(String),

    /// The allow list is non-empty and does not contain the handle.
    #[error("@{0} is not on the allow list")]
    NotAllowed(String),

    /// The handle is on the block list.
    #[error("@{0} is blocked")]
    Blocked(String),

    /// Another automated identity already occupies the conversation.
    #[error("another automated identity is already in the conversation")]
    ForeignBot,
}

/// Engine operation errors.
///
/// Per-recipient delivery failures never surface here; they are contained,
/// logged, and counted inside the fan-out.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Channel does not exist.
    #[error("unknown channel: {0}")]
    ChannelNotFound(String),

    /// Subscriber does not exist.
    #[error("unknown subscriber: {0}")]
    SubscriberNotFound(String),

    /// No broadcast with this message id exists in the channel.
    #[error("unknown broadcast: {0}")]
    BroadcastNotFound(Uuid),

    /// Publish token did not match the channel's token.
    #[error("invalid authorization token")]
    Unauthorized,

    /// The channel has no admin yet, so nothing may be published.
    #[error("channel `{0}` is not yet activated")]
    NotActivated(String),

    /// Admission denied by moderation or co-occupancy rules.
    #[error("admission rejected: {0}")]
    Rejected(RejectReason),

    /// The persistent store failed; fatal to the operation at hand.
    #[error(transparent)]
    Store(#[from] StoreError),
}
