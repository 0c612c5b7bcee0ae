//! Integration tests for the SQLite store against an in-memory database.

use crier_core::Store;
use crier_model::{
    now_secs, Channel, Content, InboundMessage, ModerationEntry, ModerationState, Subscriber,
};
use crier_store::SqliteStore;
use sqlx::sqlite::SqlitePoolOptions;
use uuid::Uuid;

async fn store() -> SqliteStore {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    SqliteStore::init(&pool).await.unwrap();
    SqliteStore::new(pool)
}

fn subscriber(bot_id: &str, channel: &str) -> Subscriber {
    Subscriber {
        bot_id: bot_id.to_string(),
        channel: channel.to_string(),
        origin_id: format!("user-{bot_id}"),
        handle: bot_id.to_string(),
        display_name: bot_id.to_string(),
        muted: false,
        cursor: 0,
        created_at: now_secs(),
    }
}

#[tokio::test]
async fn test_channel_round_trip_and_updates() {
    let store = store().await;
    let channel = Channel::new("news", "s3cret", "origin-1");

    assert!(store.insert_channel(&channel).await.unwrap());
    // Re-provisioning does not overwrite the existing channel.
    assert!(!store
        .insert_channel(&Channel::new("news", "other-token", "origin-2"))
        .await
        .unwrap());

    store.set_welcome_text("news", "Welcome!").await.unwrap();
    store
        .set_intro_media("news", "https://example.com/x.png")
        .await
        .unwrap();
    store.set_channel_muted("news", true).await.unwrap();
    store.set_admin("news", "admin-bot").await.unwrap();

    let loaded = store.channel("news").await.unwrap().unwrap();
    assert_eq!(loaded.token, "s3cret");
    assert_eq!(loaded.welcome_text.as_deref(), Some("Welcome!"));
    assert_eq!(
        loaded.intro_media_url.as_deref(),
        Some("https://example.com/x.png")
    );
    assert!(loaded.muted);
    assert_eq!(loaded.admin_id.as_deref(), Some("admin-bot"));

    assert!(store.channel("other").await.unwrap().is_none());
}

#[tokio::test]
async fn test_subscriber_insert_is_idempotent() {
    let store = store().await;

    assert!(store
        .insert_subscriber(&subscriber("bot-1", "news"))
        .await
        .unwrap());
    assert!(!store
        .insert_subscriber(&subscriber("bot-1", "news"))
        .await
        .unwrap());
    assert_eq!(store.count_subscribers("news").await.unwrap(), 1);

    store.set_subscriber_muted("bot-1", true).await.unwrap();
    store.set_cursor("bot-1", 42).await.unwrap();
    let loaded = store.subscriber("bot-1").await.unwrap().unwrap();
    assert!(loaded.muted);
    assert_eq!(loaded.cursor, 42);

    assert!(store.remove_subscriber("bot-1").await.unwrap());
    assert!(!store.remove_subscriber("bot-1").await.unwrap());
}

#[tokio::test]
async fn test_subscribers_are_listed_per_channel() {
    let store = store().await;
    store
        .insert_subscriber(&subscriber("bot-2", "news"))
        .await
        .unwrap();
    store
        .insert_subscriber(&subscriber("bot-1", "news"))
        .await
        .unwrap();
    store
        .insert_subscriber(&subscriber("bot-3", "sports"))
        .await
        .unwrap();

    let subs = store.subscribers("news").await.unwrap();
    let ids: Vec<&str> = subs.iter().map(|s| s.bot_id.as_str()).collect();
    assert_eq!(ids, vec!["bot-1", "bot-2"]);
}

#[tokio::test]
async fn test_moderation_upsert_and_clear() {
    let store = store().await;

    store
        .upsert_moderation(&ModerationEntry {
            channel: "news".into(),
            handle: "alice".into(),
            state: ModerationState::Block,
        })
        .await
        .unwrap();
    // The upsert flips the state for the same (channel, handle).
    store
        .upsert_moderation(&ModerationEntry {
            channel: "news".into(),
            handle: "alice".into(),
            state: ModerationState::Allow,
        })
        .await
        .unwrap();

    let entries = store.moderation("news").await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].state, ModerationState::Allow);

    store.clear_moderation("news").await.unwrap();
    assert!(store.moderation("news").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_broadcast_ids_are_monotonic_per_channel() {
    let store = store().await;

    let a = store
        .insert_broadcast("news", Uuid::new_v4(), &Content::text("a"))
        .await
        .unwrap();
    let b = store
        .insert_broadcast("sports", Uuid::new_v4(), &Content::text("b"))
        .await
        .unwrap();
    let c = store
        .insert_broadcast("news", Uuid::new_v4(), &Content::text("c"))
        .await
        .unwrap();

    assert!(b.id > a.id);
    assert!(c.id > b.id);
    assert_eq!(store.latest_broadcast_id("news").await.unwrap(), c.id);
    assert_eq!(store.latest_broadcast_id("empty").await.unwrap(), 0);
}

#[tokio::test]
async fn test_broadcasts_after_pages_and_skips_tombstones() {
    let store = store().await;
    let mut ids = Vec::new();
    for i in 1..=5 {
        let b = store
            .insert_broadcast("news", Uuid::new_v4(), &Content::text(format!("post {i}")))
            .await
            .unwrap();
        ids.push((b.id, b.message_id));
    }

    // Retract post 4.
    assert!(store.tombstone_broadcast("news", ids[3].1).await.unwrap());
    assert!(!store
        .tombstone_broadcast("news", Uuid::new_v4())
        .await
        .unwrap());
    // A tombstone only applies within its own channel.
    assert!(!store.tombstone_broadcast("sports", ids[0].1).await.unwrap());

    let page = store.broadcasts_after("news", ids[1].0, 10).await.unwrap();
    let got: Vec<i64> = page.iter().map(|b| b.id).collect();
    assert_eq!(got, vec![ids[2].0, ids[4].0]);
    assert_eq!(page[0].content, Content::text("post 3"));

    assert_eq!(store.count_broadcasts("news").await.unwrap(), 4);
}

#[tokio::test]
async fn test_content_variants_round_trip() {
    let store = store().await;
    let content = Content::Image {
        asset: crier_model::AssetRef::new("key-1", "image/png", 2048).with_token("tok"),
        width: 640,
        height: 480,
    };

    let inserted = store
        .insert_broadcast("news", Uuid::new_v4(), &content)
        .await
        .unwrap();
    let page = store.broadcasts_after("news", 0, 1).await.unwrap();

    assert_eq!(page[0].content, content);
    assert_eq!(page[0].message_id, inserted.message_id);
}

#[tokio::test]
async fn test_inbound_log_appends_and_counts() {
    let store = store().await;

    for i in 0..3 {
        store
            .append_inbound(&InboundMessage {
                channel: "news".into(),
                bot_id: format!("bot-{i}"),
                user_id: format!("user-{i}"),
                body: Some("hello".into()),
                mime: "text/plain".into(),
                created_at: now_secs(),
            })
            .await
            .unwrap();
    }

    assert_eq!(store.count_inbound("news").await.unwrap(), 3);
    assert_eq!(store.count_inbound("sports").await.unwrap(), 0);
}

#[tokio::test]
async fn test_delete_channel_cascades() {
    let store = store().await;
    store
        .insert_channel(&Channel::new("news", "s3cret", "origin-1"))
        .await
        .unwrap();
    store
        .insert_subscriber(&subscriber("bot-1", "news"))
        .await
        .unwrap();
    store
        .upsert_moderation(&ModerationEntry {
            channel: "news".into(),
            handle: "alice".into(),
            state: ModerationState::Allow,
        })
        .await
        .unwrap();
    store
        .insert_broadcast("news", Uuid::new_v4(), &Content::text("post"))
        .await
        .unwrap();

    store.delete_channel("news").await.unwrap();

    assert!(store.channel("news").await.unwrap().is_none());
    assert!(store.subscriber("bot-1").await.unwrap().is_none());
    assert!(store.moderation("news").await.unwrap().is_empty());
    assert_eq!(store.count_broadcasts("news").await.unwrap(), 0);
}
