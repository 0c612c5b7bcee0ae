//! # crier-model
//!
//! Data model and payload types for the crier broadcast engine.
//!
//! This crate defines the records owned by the persistent store, the content
//! union carried by broadcasts, and the wire payloads used for batched
//! fan-out between nodes.
//!
//! ## Types
//!
//! - `Channel` / `Subscriber` / `ModerationEntry` - membership model
//! - `Broadcast` / `InboundMessage` - durable history
//! - `Content` - tagged union of publishable payloads
//! - `BatchForward` / `BatchOutcome` - sibling-node fan-out payloads

pub mod batch;
pub mod content;
pub mod records;

pub use batch::{BatchForward, BatchOutcome};
pub use content::{AssetRef, Content, LinkPreview};
pub use records::{
    now_secs, validate_channel_name, BotId, Broadcast, Candidate, Channel, InboundMessage, Member,
    ModerationEntry, ModerationState, ServiceRef, Subscriber,
};
