//! Admission control for channel membership.
//!
//! Decides whether a joining bot identity may subscribe, applies the
//! moderation lists, enforces single-bot-per-conversation, and handles the
//! one-time bootstrap that promotes the channel creator's first conversation
//! to the admin role.

use crate::error::{EngineError, RejectReason};
use crate::traits::{DeliveryTransport, Store};
use crier_model::{now_secs, Candidate, Member, ModerationState, Subscriber};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of a successful admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admitted {
    /// The candidate was promoted to channel admin (bootstrap path).
    Admin,
    /// The candidate joined as a regular subscriber.
    Subscriber,
}

/// Gatekeeper for new channel memberships.
pub struct AdmissionController {
    store: Arc<dyn Store>,
    transport: Arc<dyn DeliveryTransport>,
}

impl AdmissionController {
    /// Create a controller over the given store and transport.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, transport: Arc<dyn DeliveryTransport>) -> Self {
        Self { store, transport }
    }

    /// Decide whether `candidate` may join `channel_name`.
    ///
    /// Safe to retry: admitting the same bot id twice leaves exactly one
    /// subscriber row.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Rejected`] when moderation or the co-occupancy
    /// rule turns the candidate away, [`EngineError::Store`] on persistence
    /// failures.
    pub async fn try_admit(
        &self,
        channel_name: &str,
        candidate: &Candidate,
        conversation_members: &[Member],
    ) -> Result<Admitted, EngineError> {
        let Some(channel) = self.store.channel(channel_name).await? else {
            warn!(channel = %channel_name, "admission to unknown channel");
            return Err(EngineError::Rejected(RejectReason::UnknownChannel(
                channel_name.to_string(),
            )));
        };

        let entries = self.store.moderation(channel_name).await?;
        let allow: Vec<&str> = entries
            .iter()
            .filter(|e| e.state == ModerationState::Allow)
            .map(|e| e.handle.as_str())
            .collect();

        // A non-empty allow list gates entry on its own; block entries are
        // consulted only while the allow list is empty.
        if !allow.is_empty() {
            if !allow.contains(&candidate.handle.as_str()) {
                debug!(channel = %channel_name, handle = %candidate.handle, "not on allow list");
                return Err(EngineError::Rejected(RejectReason::NotAllowed(
                    candidate.handle.clone(),
                )));
            }
        } else if entries
            .iter()
            .any(|e| e.state == ModerationState::Block && e.handle == candidate.handle)
        {
            debug!(channel = %channel_name, handle = %candidate.handle, "blocked");
            return Err(EngineError::Rejected(RejectReason::Blocked(
                candidate.handle.clone(),
            )));
        }

        // Channels are single-bot-per-conversation.
        if let Some(member) = conversation_members.iter().find(|m| m.service.is_some()) {
            warn!(
                channel = %channel_name,
                member = %member.user_id,
                "rejecting join, another automated identity is present"
            );
            return Err(EngineError::Rejected(RejectReason::ForeignBot));
        }

        // One-time bootstrap: the creator's first conversation becomes the
        // channel's control surface instead of a subscription.
        if channel.admin_id.is_none() && candidate.origin_id == channel.origin_id {
            self.store.set_admin(channel_name, &candidate.bot_id).await?;
            info!(channel = %channel_name, bot = %candidate.bot_id, "channel claimed by admin");
            return Ok(Admitted::Admin);
        }

        // A fresh joiner has seen everything up to the newest broadcast.
        let cursor = self.store.latest_broadcast_id(channel_name).await?;
        let subscriber = Subscriber {
            bot_id: candidate.bot_id.clone(),
            channel: channel_name.to_string(),
            origin_id: candidate.origin_id.clone(),
            handle: candidate.handle.clone(),
            display_name: candidate.display_name.clone(),
            muted: false,
            cursor,
            created_at: now_secs(),
        };
        let inserted = self.store.insert_subscriber(&subscriber).await?;

        if inserted {
            info!(
                channel = %channel_name,
                bot = %candidate.bot_id,
                handle = %candidate.handle,
                "new subscriber"
            );
            if !channel.muted {
                if let Some(admin_id) = &channel.admin_id {
                    // Best-effort ping; a failed notification never fails admission.
                    let ping = format!("**@{}** joined", candidate.handle);
                    if let Err(e) = self.transport.send_text(admin_id, &ping).await {
                        warn!(channel = %channel_name, error = %e, "join notification failed");
                    }
                }
            }
        }

        Ok(Admitted::Subscriber)
    }

    /// Drop the subscription of a departing identity.
    ///
    /// Returns `false` when the bot id was not subscribed.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] on persistence failures.
    pub async fn remove(&self, bot_id: &str) -> Result<bool, EngineError> {
        let removed = self.store.remove_subscriber(bot_id).await?;
        if removed {
            info!(bot = %bot_id, "subscriber removed");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::testkit::RecordingTransport;
    use crier_model::{Channel, Content, ModerationEntry, ServiceRef};
    use uuid::Uuid;

    fn candidate(bot_id: &str, origin_id: &str, handle: &str) -> Candidate {
        Candidate {
            bot_id: bot_id.to_string(),
            origin_id: origin_id.to_string(),
            handle: handle.to_string(),
            display_name: handle.to_string(),
        }
    }

    fn human(user_id: &str) -> Member {
        Member {
            user_id: user_id.to_string(),
            service: None,
        }
    }

    async fn setup() -> (Arc<MemoryStore>, Arc<RecordingTransport>, AdmissionController) {
        let store = Arc::new(MemoryStore::new());
        let transport = Arc::new(RecordingTransport::new());
        store
            .insert_channel(&Channel::new("news", "s3cret", "origin-1"))
            .await
            .unwrap();
        let controller = AdmissionController::new(store.clone(), transport.clone());
        (store, transport, controller)
    }

    async fn claim(store: &MemoryStore) {
        store.set_admin("news", "admin-bot").await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_channel_is_rejected() {
        let (_, _, controller) = setup().await;
        let result = controller
            .try_admit("nope", &candidate("bot-1", "user-1", "alice"), &[])
            .await;
        assert!(matches!(
            result,
            Err(EngineError::Rejected(RejectReason::UnknownChannel(_)))
        ));
    }

    #[tokio::test]
    async fn test_first_matching_origin_becomes_admin() {
        let (store, _, controller) = setup().await;

        let admitted = controller
            .try_admit("news", &candidate("bot-1", "origin-1", "owner"), &[])
            .await
            .unwrap();

        assert_eq!(admitted, Admitted::Admin);
        let channel = store.channel("news").await.unwrap().unwrap();
        assert_eq!(channel.admin_id.as_deref(), Some("bot-1"));
        // The admin is not a subscriber.
        assert_eq!(store.count_subscribers("news").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_admission_is_idempotent() {
        let (store, _, controller) = setup().await;
        claim(&store).await;

        let joiner = candidate("bot-2", "user-2", "alice");
        assert_eq!(
            controller.try_admit("news", &joiner, &[]).await.unwrap(),
            Admitted::Subscriber
        );
        assert_eq!(
            controller.try_admit("news", &joiner, &[]).await.unwrap(),
            Admitted::Subscriber
        );
        assert_eq!(store.count_subscribers("news").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_allow_list_wins_over_block_list() {
        let (store, _, controller) = setup().await;
        claim(&store).await;
        // `/block alice` then `/allow alice`: the entry is unique per
        // (channel, handle), so the allow wins the upsert.
        for state in [ModerationState::Block, ModerationState::Allow] {
            store
                .upsert_moderation(&ModerationEntry {
                    channel: "news".into(),
                    handle: "alice".into(),
                    state,
                })
                .await
                .unwrap();
        }
        // A blocked third party, irrelevant while the allow list is non-empty.
        store
            .upsert_moderation(&ModerationEntry {
                channel: "news".into(),
                handle: "carol".into(),
                state: ModerationState::Block,
            })
            .await
            .unwrap();

        assert!(controller
            .try_admit("news", &candidate("bot-2", "user-2", "alice"), &[])
            .await
            .is_ok());
        // Bob is not blocked, but the non-empty allow list gates entry.
        assert!(matches!(
            controller
                .try_admit("news", &candidate("bot-3", "user-3", "bob"), &[])
                .await,
            Err(EngineError::Rejected(RejectReason::NotAllowed(_)))
        ));
    }

    #[tokio::test]
    async fn test_block_list_applies_when_allow_list_empty() {
        let (store, _, controller) = setup().await;
        claim(&store).await;
        store
            .upsert_moderation(&ModerationEntry {
                channel: "news".into(),
                handle: "mallory".into(),
                state: ModerationState::Block,
            })
            .await
            .unwrap();

        assert!(matches!(
            controller
                .try_admit("news", &candidate("bot-2", "user-2", "mallory"), &[])
                .await,
            Err(EngineError::Rejected(RejectReason::Blocked(_)))
        ));
        assert!(controller
            .try_admit("news", &candidate("bot-3", "user-3", "bob"), &[])
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_foreign_bot_in_conversation_is_rejected() {
        let (store, _, controller) = setup().await;
        claim(&store).await;

        let members = [
            human("user-2"),
            Member {
                user_id: "user-9".into(),
                service: Some(ServiceRef {
                    provider: "prov-1".into(),
                    id: "svc-1".into(),
                }),
            },
        ];

        assert!(matches!(
            controller
                .try_admit("news", &candidate("bot-2", "user-2", "alice"), &members)
                .await,
            Err(EngineError::Rejected(RejectReason::ForeignBot))
        ));
    }

    #[tokio::test]
    async fn test_new_subscriber_cursor_starts_at_latest_broadcast() {
        let (store, _, controller) = setup().await;
        claim(&store).await;
        for i in 0..3 {
            store
                .insert_broadcast("news", Uuid::new_v4(), &Content::text(format!("{i}")))
                .await
                .unwrap();
        }

        controller
            .try_admit("news", &candidate("bot-2", "user-2", "alice"), &[])
            .await
            .unwrap();

        let sub = store.subscriber("bot-2").await.unwrap().unwrap();
        assert_eq!(sub.cursor, 3);
    }

    #[tokio::test]
    async fn test_join_ping_respects_channel_mute() {
        let (store, transport, controller) = setup().await;
        claim(&store).await;

        controller
            .try_admit("news", &candidate("bot-2", "user-2", "alice"), &[])
            .await
            .unwrap();
        assert_eq!(transport.texts_to("admin-bot"), vec!["**@alice** joined"]);

        store.set_channel_muted("news", true).await.unwrap();
        controller
            .try_admit("news", &candidate("bot-3", "user-3", "bob"), &[])
            .await
            .unwrap();
        assert_eq!(transport.texts_to("admin-bot").len(), 1);
    }

    #[tokio::test]
    async fn test_failed_join_ping_does_not_fail_admission() {
        let (store, transport, controller) = setup().await;
        claim(&store).await;
        transport.mark_failing("admin-bot");

        let admitted = controller
            .try_admit("news", &candidate("bot-2", "user-2", "alice"), &[])
            .await
            .unwrap();
        assert_eq!(admitted, Admitted::Subscriber);
        assert_eq!(store.count_subscribers("news").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_remove_drops_subscription() {
        let (store, _, controller) = setup().await;
        claim(&store).await;
        controller
            .try_admit("news", &candidate("bot-2", "user-2", "alice"), &[])
            .await
            .unwrap();

        assert!(controller.remove("bot-2").await.unwrap());
        assert!(!controller.remove("bot-2").await.unwrap());
        assert!(store.subscriber("bot-2").await.unwrap().is_none());
    }
}
