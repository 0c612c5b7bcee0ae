//! SQLite-backed store.

use async_trait::async_trait;
use crier_core::{Store, StoreError};
use crier_model::{
    Broadcast, Channel, Content, InboundMessage, ModerationEntry, ModerationState, Subscriber,
};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn state_to_str(state: ModerationState) -> &'static str {
    match state {
        ModerationState::Allow => "allow",
        ModerationState::Block => "block",
    }
}

fn state_from_str(value: &str) -> Result<ModerationState, StoreError> {
    match value {
        "allow" => Ok(ModerationState::Allow),
        "block" => Ok(ModerationState::Block),
        other => Err(StoreError::Corrupt(format!(
            "unknown moderation state: {other}"
        ))),
    }
}

fn encode_content(content: &Content) -> Result<String, StoreError> {
    serde_json::to_string(content).map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn decode_content(json: &str) -> Result<Content, StoreError> {
    serde_json::from_str(json).map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn decode_message_id(value: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(value).map_err(|e| StoreError::Corrupt(format!("bad message id: {e}")))
}

/// SQLite-backed [`Store`] implementation.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Wrap an existing connection pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the schema if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] when schema creation fails.
    pub async fn init(pool: &SqlitePool) -> Result<(), StoreError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS channels (
                name            TEXT    PRIMARY KEY,
                token           TEXT    NOT NULL,
                origin_id       TEXT    NOT NULL,
                admin_id        TEXT,
                welcome_text    TEXT,
                intro_media_url TEXT,
                muted           INTEGER NOT NULL DEFAULT 0,
                created_at      INTEGER NOT NULL
            )",
        )
        .execute(pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS subscribers (
                bot_id       TEXT    PRIMARY KEY,
                channel      TEXT    NOT NULL,
                origin_id    TEXT    NOT NULL,
                handle       TEXT    NOT NULL,
                display_name TEXT    NOT NULL,
                muted        INTEGER NOT NULL DEFAULT 0,
                cursor       INTEGER NOT NULL DEFAULT 0,
                created_at   INTEGER NOT NULL
            )",
        )
        .execute(pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_subscribers_channel
             ON subscribers (channel)",
        )
        .execute(pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS moderation (
                channel TEXT NOT NULL,
                handle  TEXT NOT NULL,
                state   TEXT NOT NULL,
                PRIMARY KEY (channel, handle)
            )",
        )
        .execute(pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS broadcasts (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                channel    TEXT    NOT NULL,
                message_id TEXT    NOT NULL,
                content    TEXT    NOT NULL,
                tombstoned INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            )",
        )
        .execute(pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_broadcasts_channel_id
             ON broadcasts (channel, id)",
        )
        .execute(pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS inbound_messages (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                channel    TEXT    NOT NULL,
                bot_id     TEXT    NOT NULL,
                user_id    TEXT    NOT NULL,
                body       TEXT,
                mime       TEXT    NOT NULL,
                created_at INTEGER NOT NULL
            )",
        )
        .execute(pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_inbound_channel
             ON inbound_messages (channel)",
        )
        .execute(pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert_channel(&self, channel: &Channel) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "INSERT INTO channels
             (name, token, origin_id, admin_id, welcome_text, intro_media_url, muted, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (name) DO NOTHING",
        )
        .bind(&channel.name)
        .bind(&channel.token)
        .bind(&channel.origin_id)
        .bind(&channel.admin_id)
        .bind(&channel.welcome_text)
        .bind(&channel.intro_media_url)
        .bind(channel.muted)
        .bind(channel.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() == 1)
    }

    async fn channel(&self, name: &str) -> Result<Option<Channel>, StoreError> {
        let row = sqlx::query(
            "SELECT name, token, origin_id, admin_id, welcome_text, intro_media_url,
                    muted, created_at
             FROM channels WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.map(|row| Channel {
            name: row.get("name"),
            token: row.get("token"),
            origin_id: row.get("origin_id"),
            admin_id: row.get("admin_id"),
            welcome_text: row.get("welcome_text"),
            intro_media_url: row.get("intro_media_url"),
            muted: row.get("muted"),
            created_at: row.get("created_at"),
        }))
    }

    async fn delete_channel(&self, name: &str) -> Result<(), StoreError> {
        // One transaction so a deprovision never leaves orphaned rows.
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        for table in [
            "DELETE FROM subscribers WHERE channel = ?",
            "DELETE FROM moderation WHERE channel = ?",
            "DELETE FROM broadcasts WHERE channel = ?",
            "DELETE FROM inbound_messages WHERE channel = ?",
            "DELETE FROM channels WHERE name = ?",
        ] {
            sqlx::query(table)
                .bind(name)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
        }
        tx.commit().await.map_err(db_err)
    }

    async fn set_welcome_text(&self, name: &str, text: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE channels SET welcome_text = ? WHERE name = ?")
            .bind(text)
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn set_intro_media(&self, name: &str, url: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE channels SET intro_media_url = ? WHERE name = ?")
            .bind(url)
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn set_channel_muted(&self, name: &str, muted: bool) -> Result<(), StoreError> {
        sqlx::query("UPDATE channels SET muted = ? WHERE name = ?")
            .bind(muted)
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn set_admin(&self, name: &str, admin_id: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE channels SET admin_id = ? WHERE name = ?")
            .bind(admin_id)
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn insert_subscriber(&self, subscriber: &Subscriber) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "INSERT INTO subscribers
             (bot_id, channel, origin_id, handle, display_name, muted, cursor, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (bot_id) DO NOTHING",
        )
        .bind(&subscriber.bot_id)
        .bind(&subscriber.channel)
        .bind(&subscriber.origin_id)
        .bind(&subscriber.handle)
        .bind(&subscriber.display_name)
        .bind(subscriber.muted)
        .bind(subscriber.cursor)
        .bind(subscriber.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() == 1)
    }

    async fn subscriber(&self, bot_id: &str) -> Result<Option<Subscriber>, StoreError> {
        let row = sqlx::query(
            "SELECT bot_id, channel, origin_id, handle, display_name, muted, cursor, created_at
             FROM subscribers WHERE bot_id = ?",
        )
        .bind(bot_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.map(|row| Subscriber {
            bot_id: row.get("bot_id"),
            channel: row.get("channel"),
            origin_id: row.get("origin_id"),
            handle: row.get("handle"),
            display_name: row.get("display_name"),
            muted: row.get("muted"),
            cursor: row.get("cursor"),
            created_at: row.get("created_at"),
        }))
    }

    async fn subscribers(&self, channel: &str) -> Result<Vec<Subscriber>, StoreError> {
        let rows = sqlx::query(
            "SELECT bot_id, channel, origin_id, handle, display_name, muted, cursor, created_at
             FROM subscribers WHERE channel = ? ORDER BY bot_id",
        )
        .bind(channel)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows
            .into_iter()
            .map(|row| Subscriber {
                bot_id: row.get("bot_id"),
                channel: row.get("channel"),
                origin_id: row.get("origin_id"),
                handle: row.get("handle"),
                display_name: row.get("display_name"),
                muted: row.get("muted"),
                cursor: row.get("cursor"),
                created_at: row.get("created_at"),
            })
            .collect())
    }

    async fn remove_subscriber(&self, bot_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM subscribers WHERE bot_id = ?")
            .bind(bot_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() == 1)
    }

    async fn set_subscriber_muted(&self, bot_id: &str, muted: bool) -> Result<(), StoreError> {
        sqlx::query("UPDATE subscribers SET muted = ? WHERE bot_id = ?")
            .bind(muted)
            .bind(bot_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn set_cursor(&self, bot_id: &str, cursor: i64) -> Result<(), StoreError> {
        sqlx::query("UPDATE subscribers SET cursor = ? WHERE bot_id = ?")
            .bind(cursor)
            .bind(bot_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn count_subscribers(&self, channel: &str) -> Result<u64, StoreError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM subscribers WHERE channel = ?")
                .bind(channel)
                .fetch_one(&self.pool)
                .await
                .map_err(db_err)?;
        Ok(count as u64)
    }

    async fn upsert_moderation(&self, entry: &ModerationEntry) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO moderation (channel, handle, state) VALUES (?, ?, ?)
             ON CONFLICT (channel, handle) DO UPDATE SET state = excluded.state",
        )
        .bind(&entry.channel)
        .bind(&entry.handle)
        .bind(state_to_str(entry.state))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn moderation(&self, channel: &str) -> Result<Vec<ModerationEntry>, StoreError> {
        let rows = sqlx::query(
            "SELECT channel, handle, state FROM moderation WHERE channel = ? ORDER BY handle",
        )
        .bind(channel)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter()
            .map(|row| {
                Ok(ModerationEntry {
                    channel: row.get("channel"),
                    handle: row.get("handle"),
                    state: state_from_str(row.get::<String, _>("state").as_str())?,
                })
            })
            .collect()
    }

    async fn clear_moderation(&self, channel: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM moderation WHERE channel = ?")
            .bind(channel)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn insert_broadcast(
        &self,
        channel: &str,
        message_id: Uuid,
        content: &Content,
    ) -> Result<Broadcast, StoreError> {
        let encoded = encode_content(content)?;
        let created_at = crier_model::now_secs();
        let result = sqlx::query(
            "INSERT INTO broadcasts (channel, message_id, content, tombstoned, created_at)
             VALUES (?, ?, ?, 0, ?)",
        )
        .bind(channel)
        .bind(message_id.to_string())
        .bind(&encoded)
        .bind(created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(Broadcast {
            id: result.last_insert_rowid(),
            channel: channel.to_string(),
            message_id,
            content: content.clone(),
            tombstoned: false,
            created_at,
        })
    }

    async fn broadcasts_after(
        &self,
        channel: &str,
        after: i64,
        limit: u32,
    ) -> Result<Vec<Broadcast>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, channel, message_id, content, tombstoned, created_at
             FROM broadcasts
             WHERE channel = ? AND id > ? AND tombstoned = 0
             ORDER BY id ASC LIMIT ?",
        )
        .bind(channel)
        .bind(after)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter()
            .map(|row| {
                Ok(Broadcast {
                    id: row.get("id"),
                    channel: row.get("channel"),
                    message_id: decode_message_id(row.get::<String, _>("message_id").as_str())?,
                    content: decode_content(row.get::<String, _>("content").as_str())?,
                    tombstoned: row.get("tombstoned"),
                    created_at: row.get("created_at"),
                })
            })
            .collect()
    }

    async fn latest_broadcast_id(&self, channel: &str) -> Result<i64, StoreError> {
        let id: i64 =
            sqlx::query_scalar("SELECT COALESCE(MAX(id), 0) FROM broadcasts WHERE channel = ?")
                .bind(channel)
                .fetch_one(&self.pool)
                .await
                .map_err(db_err)?;
        Ok(id)
    }

    async fn tombstone_broadcast(
        &self,
        channel: &str,
        message_id: Uuid,
    ) -> Result<bool, StoreError> {
        let result =
            sqlx::query("UPDATE broadcasts SET tombstoned = 1 WHERE channel = ? AND message_id = ?")
                .bind(channel)
                .bind(message_id.to_string())
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_broadcasts(&self, channel: &str) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM broadcasts WHERE channel = ? AND tombstoned = 0",
        )
        .bind(channel)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(count as u64)
    }

    async fn append_inbound(&self, message: &InboundMessage) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO inbound_messages (channel, bot_id, user_id, body, mime, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&message.channel)
        .bind(&message.bot_id)
        .bind(&message.user_id)
        .bind(&message.body)
        .bind(&message.mime)
        .bind(message.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn count_inbound(&self, channel: &str) -> Result<u64, StoreError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM inbound_messages WHERE channel = ?")
                .bind(channel)
                .fetch_one(&self.pool)
                .await
                .map_err(db_err)?;
        Ok(count as u64)
    }
}
