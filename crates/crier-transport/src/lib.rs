//! # crier-transport
//!
//! HTTP implementations of the crier delivery seams.
//!
//! The secure-messaging system that actually reaches end devices is an
//! external collaborator; this crate talks to it over plain HTTP:
//!
//! - [`HttpDelivery`] - per-recipient send primitive
//! - [`HttpBatchForwarder`] - forwards recipient batches to sibling nodes
//! - [`HttpPreviewResolver`] - resolves link previews via the collaborator
//!
//! All three map transport-level failures onto
//! [`DeliveryError`](crier_core::DeliveryError): a 404/410 on a recipient
//! endpoint means the identity is gone; everything else is transient.

pub mod batch;
pub mod http;
pub mod preview;

pub use batch::HttpBatchForwarder;
pub use http::{DeliveryConfig, HttpDelivery};
pub use preview::HttpPreviewResolver;
