//! Wire payloads for batched fan-out across sibling nodes.
//!
//! Large recipient sets can be partitioned into fixed-size batches, each
//! forwarded to a sibling node that repeats the per-recipient delivery
//! locally. This is a horizontal-scaling optimization; direct per-recipient
//! dispatch stays correct on its own.

use crate::content::Content;
use crate::records::BotId;
use serde::{Deserialize, Serialize};

/// One batch of recipients plus the payload to deliver to each of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchForward {
    /// Recipient bot ids in this batch.
    pub recipients: Vec<BotId>,
    /// The content to deliver.
    pub content: Content,
}

/// Aggregate outcome of one batch delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BatchOutcome {
    /// Recipients delivered to.
    pub delivered: usize,
    /// Recipients that failed.
    pub failed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_forward_encoding() {
        let batch = BatchForward {
            recipients: vec!["bot-1".into(), "bot-2".into()],
            content: Content::text("hello"),
        };

        let json = serde_json::to_value(&batch).unwrap();
        assert_eq!(json["recipients"][1], "bot-2");
        assert_eq!(json["content"]["kind"], "text");

        let back: BatchForward = serde_json::from_value(json).unwrap();
        assert_eq!(back, batch);
    }
}
