//! # crier-core
//!
//! The channel broadcast fan-out engine.
//!
//! One publisher ("admin") per channel posts content that the engine
//! delivers to every current subscriber, tolerating per-recipient failures,
//! replaying missed posts in order for late joiners, and enforcing moderated
//! membership.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌─────────────┐     ┌────────────────────┐
//! │  Admission   │────▶│ Broadcaster │────▶│ DeliveryTransport  │
//! └──────────────┘     └─────────────┘     └────────────────────┘
//!        │                    │
//!        ▼                    ▼
//! ┌──────────────┐     ┌─────────────┐
//! │    Store     │◀────│ PreviewCache│
//! └──────────────┘     └─────────────┘
//! ```
//!
//! Collaborators are injected through the traits in [`traits`]: the
//! persistent store, the per-recipient delivery transport, the link-preview
//! resolver, and the sibling-node batch forwarder. The engine itself keeps
//! no durable state.

pub mod admission;
pub mod broadcaster;
pub mod cache;
pub mod commands;
pub mod error;
pub mod memory;
pub mod traits;

#[cfg(test)]
pub(crate) mod testkit;

pub use admission::{Admitted, AdmissionController};
pub use broadcaster::{Broadcaster, BroadcasterConfig, DeliveryReport};
pub use cache::PreviewCache;
pub use commands::{AdminCommand, Commander, SubscriberCommand};
pub use error::{EngineError, RejectReason};
pub use memory::MemoryStore;
pub use traits::{
    BatchForwarder, DeliveryError, DeliveryTransport, PreviewResolver, Store, StoreError,
};
